//! Job entity and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::error::JobError;

/// Error marker recorded on cancelled jobs, so clients can tell
/// "I was stopped" apart from "it broke".
pub const CANCEL_MESSAGE: &str = "Job was cancelled";

/// Status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, task not yet running.
    Pending,
    /// The task is executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped by a cancel request.
    Cancelled,
}

impl JobStatus {
    /// Check if this status allows transitioning to another.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Check if this is a terminal status — no transitions leave it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the job still counts against the running limit.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// One tracked invocation of a single agent or the full pipeline.
///
/// A job is mutated only by the task executing it; everyone else reads
/// snapshots out of the store. `result` is set on completion; `error` on
/// failure or cancellation. A cancelled pipeline additionally keeps the
/// per-step map of steps attempted before the cancel in `result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id.
    pub id: Uuid,
    /// Target database in the catalog.
    pub database_id: i64,
    /// Which analysis this job runs.
    pub agent: AgentKind,
    pub status: JobStatus,
    /// 0–100, never decreases within a job.
    pub progress: u8,
    /// Label of the sub-step in progress (pipeline steps, mostly).
    pub current_step: Option<String>,
    /// 5 for the pipeline, 1 otherwise.
    pub total_steps: u32,
    /// Agent report, present once completed.
    pub result: Option<serde_json::Value>,
    /// Error message, present once failed or cancelled.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a fresh pending job.
    pub fn new(database_id: i64, agent: AgentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            database_id,
            agent,
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            total_steps: agent.total_steps(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, target: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                state: self.status.to_string(),
                target: target.to_string(),
            });
        }
        self.status = target;
        match target {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// `pending → running`.
    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Running)
    }

    /// `running → completed` with the agent's report.
    pub fn complete(&mut self, result: serde_json::Value) -> Result<(), JobError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.current_step = Some("done".to_string());
        self.result = Some(result);
        Ok(())
    }

    /// `running → failed` with the error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// `pending|running → cancelled`. A pipeline passes the partial
    /// per-step map of steps attempted before the cancel.
    pub fn cancel(&mut self, partial: Option<serde_json::Value>) -> Result<(), JobError> {
        self.transition(JobStatus::Cancelled)?;
        self.error = Some(CANCEL_MESSAGE.to_string());
        self.result = partial;
        Ok(())
    }

    /// Advance progress; lower values are ignored, progress is monotone.
    pub fn advance_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    /// Record the step about to run and the progress at its boundary.
    pub fn begin_step(&mut self, name: &str, progress: u8) {
        self.current_step = Some(name.to_string());
        self.advance_progress(progress);
    }
}
