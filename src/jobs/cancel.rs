//! Cancellation registry — maps live jobs to their cancellation tokens.
//!
//! Tokens are registered when a job is accepted (so a still-pending job
//! can be cancelled) and dropped once it reaches a terminal state. The
//! signal is cooperative: the executing task and its agents observe the
//! token at safe points, nothing is force-killed.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Registry of cancellation tokens for live jobs.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a newly accepted job.
    pub async fn register(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.write().await.insert(job_id, token.clone());
        debug!(job_id = %job_id, "Cancellation token registered");
        token
    }

    /// Trip the signal for a job. Returns `false` when no token is
    /// registered (job unknown or already terminal). Signalling an
    /// already-signalled job is a no-op.
    pub async fn signal(&self, job_id: Uuid) -> bool {
        match self.tokens.read().await.get(&job_id) {
            Some(token) => {
                token.cancel();
                debug!(job_id = %job_id, "Cancellation signalled");
                true
            }
            None => false,
        }
    }

    /// Drop the token once the job is terminal, whatever the cause.
    pub async fn unregister(&self, job_id: Uuid) {
        if self.tokens.write().await.remove(&job_id).is_some() {
            debug!(job_id = %job_id, "Cancellation token unregistered");
        }
    }

    /// Whether a token is currently registered for this job.
    pub async fn is_registered(&self, job_id: Uuid) -> bool {
        self.tokens.read().await.contains_key(&job_id)
    }

    /// Number of live tokens.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_signal_observe() {
        let registry = CancelRegistry::new();
        let job_id = Uuid::new_v4();

        let token = registry.register(job_id).await;
        assert!(!token.is_cancelled());

        assert!(registry.signal(job_id).await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn signal_is_idempotent() {
        let registry = CancelRegistry::new();
        let job_id = Uuid::new_v4();
        let token = registry.register(job_id).await;

        assert!(registry.signal(job_id).await);
        assert!(registry.signal(job_id).await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn signal_unknown_job_is_false() {
        let registry = CancelRegistry::new();
        assert!(!registry.signal(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn unregister_drops_token() {
        let registry = CancelRegistry::new();
        let job_id = Uuid::new_v4();
        registry.register(job_id).await;
        assert!(registry.is_registered(job_id).await);

        registry.unregister(job_id).await;
        assert!(!registry.is_registered(job_id).await);
        assert!(!registry.signal(job_id).await);

        // Unregistering twice is harmless.
        registry.unregister(job_id).await;
    }

    #[tokio::test]
    async fn tokens_are_independent() {
        let registry = CancelRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let token_a = registry.register(a).await;
        let token_b = registry.register(b).await;

        registry.signal(a).await;
        assert!(token_a.is_cancelled());
        assert!(!token_b.is_cancelled());
    }
}
