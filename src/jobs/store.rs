//! Job store — in-memory, concurrency-safe repository of job records.
//!
//! Jobs are kept for the lifetime of the process so late pollers still
//! see terminal state. Mutations go through [`JobStore::update`], which
//! applies the whole change under the write lock: readers see the job
//! before or after a transition, never mid-mutation.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::model::{Job, JobStatus};
use crate::agents::AgentKind;
use crate::error::JobError;

/// In-memory job repository keyed by job id.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending job and return a snapshot of it.
    pub async fn create(&self, database_id: i64, agent: AgentKind) -> Job {
        let job = Job::new(database_id, agent);
        info!(job_id = %job.id, %agent, database_id, "Job created");

        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        job
    }

    /// Snapshot of a job by id.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Apply a mutation atomically and return the updated snapshot.
    ///
    /// Progress monotonicity is enforced here as a backstop: a mutation
    /// that would lower `progress` keeps the previous value.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound { id })?;

        let progress_before = job.progress;
        mutate(job)?;
        if job.progress < progress_before {
            job.progress = progress_before;
        }

        Ok(job.clone())
    }

    /// Jobs newest-first by creation time, optionally filtered, truncated
    /// to `limit`.
    pub async fn list(
        &self,
        database_id: Option<i64>,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| database_id.is_none_or(|db| j.database_id == db))
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        matching
    }

    /// Count of jobs that are pending or running.
    pub async fn count_running(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.status.is_active())
            .count()
    }

    /// Whether an active job already exists for this `(database, agent)`
    /// pair. Used by the optional duplicate-run policy.
    pub async fn has_active(&self, database_id: i64, agent: AgentKind) -> bool {
        self.jobs
            .read()
            .await
            .values()
            .any(|j| j.database_id == database_id && j.agent == agent && j.status.is_active())
    }

    /// Total number of jobs retained (all statuses).
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let store = JobStore::new();
        let job = store.create(7, AgentKind::Explorer).await;

        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.total_steps, 1);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let store = JobStore::new();
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn update_applies_atomically() {
        let store = JobStore::new();
        let job = store.create(7, AgentKind::Observer).await;

        let updated = store.update(job.id, |j| j.start()).await.unwrap();
        assert_eq!(updated.status, JobStatus::Running);
        assert!(updated.started_at.is_some());

        // Snapshot from get matches the returned one.
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn update_unknown_job_errors() {
        let store = JobStore::new();
        let err = store.update(Uuid::new_v4(), |j| j.start()).await;
        assert!(matches!(err, Err(JobError::NotFound { .. })));
    }

    #[tokio::test]
    async fn update_never_lowers_progress() {
        let store = JobStore::new();
        let job = store.create(7, AgentKind::All).await;
        store.update(job.id, |j| j.start()).await.unwrap();
        store
            .update(job.id, |j| {
                j.advance_progress(60);
                Ok(())
            })
            .await
            .unwrap();

        // A buggy mutator writing the field directly is still clamped.
        let updated = store
            .update(job.id, |j| {
                j.progress = 10;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.progress, 60);
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let store = JobStore::new();
        let a = store.create(1, AgentKind::Explorer).await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let b = store.create(1, AgentKind::Observer).await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let c = store.create(2, AgentKind::Explorer).await;

        store.update(b.id, |j| j.start()).await.unwrap();

        // Newest first, no filters.
        let all = store.list(None, None, 50).await;
        assert_eq!(
            all.iter().map(|j| j.id).collect::<Vec<_>>(),
            vec![c.id, b.id, a.id]
        );

        // Database filter.
        let db1 = store.list(Some(1), None, 50).await;
        assert_eq!(db1.len(), 2);

        // Status filter.
        let running = store.list(None, Some(JobStatus::Running), 50).await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, b.id);

        // Limit.
        let limited = store.list(None, None, 1).await;
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, c.id);
    }

    #[tokio::test]
    async fn count_running_tracks_active() {
        let store = JobStore::new();
        let a = store.create(1, AgentKind::Explorer).await;
        let b = store.create(1, AgentKind::Observer).await;
        assert_eq!(store.count_running().await, 2);

        store.update(a.id, |j| j.start()).await.unwrap();
        assert_eq!(store.count_running().await, 2);

        store
            .update(a.id, |j| j.complete(serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(store.count_running().await, 1);

        store.update(b.id, |j| j.cancel(None)).await.unwrap();
        assert_eq!(store.count_running().await, 0);
    }

    #[tokio::test]
    async fn has_active_pair() {
        let store = JobStore::new();
        let job = store.create(1, AgentKind::Gardener).await;
        assert!(store.has_active(1, AgentKind::Gardener).await);
        assert!(!store.has_active(1, AgentKind::Explorer).await);
        assert!(!store.has_active(2, AgentKind::Gardener).await);

        store.update(job.id, |j| j.cancel(None)).await.unwrap();
        assert!(!store.has_active(1, AgentKind::Gardener).await);
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let store = std::sync::Arc::new(JobStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(1, AgentKind::Explorer).await.id
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 32);
        assert_eq!(store.len().await, 32);
    }
}
