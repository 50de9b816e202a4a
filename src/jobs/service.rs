//! Status query service — the read/control surface external pollers use.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::cancel::CancelRegistry;
use super::model::{Job, JobStatus};
use super::store::JobStore;
use crate::error::JobError;

/// Thin facade over the job store and cancellation registry.
#[derive(Clone)]
pub struct JobService {
    store: Arc<JobStore>,
    cancels: Arc<CancelRegistry>,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, cancels: Arc<CancelRegistry>) -> Self {
        Self { store, cancels }
    }

    /// Full job record by id.
    pub async fn get_job(&self, id: Uuid) -> Result<Job, JobError> {
        self.store.get(id).await.ok_or(JobError::NotFound { id })
    }

    /// Jobs newest-first, optionally filtered by database and status.
    pub async fn list_jobs(
        &self,
        database_id: Option<i64>,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Vec<Job> {
        self.store.list(database_id, status, limit).await
    }

    /// Count of pending and running jobs.
    pub async fn count_running(&self) -> usize {
        self.store.count_running().await
    }

    /// Request cancellation of a job.
    ///
    /// Succeeds for any known job: cancelling one that already reached a
    /// terminal state is a no-op and leaves its record untouched. Fails
    /// only when the id is unknown. Cancellation itself is cooperative —
    /// the job resolves to `cancelled` when its task observes the signal.
    pub async fn cancel(&self, id: Uuid) -> Result<(), JobError> {
        let job = self.store.get(id).await.ok_or(JobError::NotFound { id })?;

        if job.status.is_terminal() {
            info!(job_id = %id, status = %job.status, "Cancel requested for terminal job, no-op");
            return Ok(());
        }

        // A missing token here means the job went terminal between the
        // snapshot above and now; that is the same no-op.
        self.cancels.signal(id).await;
        info!(job_id = %id, "Cancel requested");
        Ok(())
    }
}
