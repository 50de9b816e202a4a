//! Orchestrator — accepts run requests and executes them as background
//! tasks.
//!
//! The accept path (`run`) creates the job, registers its cancellation
//! token and spawns the task; it never waits on agent work. The spawned
//! task is the job's single writer: it moves the job to `running`,
//! invokes the agent (or the five-step pipeline) and resolves the job to
//! a terminal state. Everyone else observes through the store.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::cancel::CancelRegistry;
use super::model::Job;
use super::store::JobStore;
use crate::agents::{AgentContext, AgentKind, AgentRegistry};
use crate::config::OrchestratorConfig;
use crate::db::DatabaseCatalog;
use crate::error::{Error, JobError};
use crate::llm::LlmProvider;

/// Runs analysis agents as background jobs.
pub struct Orchestrator {
    store: Arc<JobStore>,
    cancels: Arc<CancelRegistry>,
    agents: Arc<AgentRegistry>,
    catalog: Arc<DatabaseCatalog>,
    llm: Option<Arc<dyn LlmProvider>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        cancels: Arc<CancelRegistry>,
        agents: Arc<AgentRegistry>,
        catalog: Arc<DatabaseCatalog>,
        llm: Option<Arc<dyn LlmProvider>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            cancels,
            agents,
            catalog,
            llm,
            config,
        }
    }

    /// Accept a run request: create the job, schedule its task and return
    /// the pending job snapshot immediately.
    pub async fn run(&self, database_id: i64, agent: AgentKind) -> Result<Job, Error> {
        let (db_config, db) = self.catalog.target(database_id)?;

        if self.store.count_running().await >= self.config.max_parallel_jobs {
            return Err(JobError::MaxJobsExceeded {
                max: self.config.max_parallel_jobs,
            }
            .into());
        }

        if self.config.reject_duplicate_runs && self.store.has_active(database_id, agent).await {
            return Err(JobError::DuplicateRun { database_id, agent }.into());
        }

        let job = self.store.create(database_id, agent).await;
        let token = self.cancels.register(job.id).await;

        let ctx = AgentContext {
            database_id,
            db,
            autonomy: db_config.autonomy,
            llm: self.llm.clone(),
            cancel: token,
        };

        tokio::spawn(Self::execute(
            self.store.clone(),
            self.cancels.clone(),
            self.agents.clone(),
            ctx,
            job.id,
            agent,
        ));

        Ok(job)
    }

    /// Task body — owns all writes to its job until terminal.
    async fn execute(
        store: Arc<JobStore>,
        cancels: Arc<CancelRegistry>,
        agents: Arc<AgentRegistry>,
        ctx: AgentContext,
        job_id: Uuid,
        kind: AgentKind,
    ) {
        // Cancelled before the task got to run: resolve without ever
        // entering `running`.
        if ctx.cancel.is_cancelled() {
            Self::resolve(&store, &cancels, job_id, |j| j.cancel(None)).await;
            return;
        }

        let started = store
            .update(job_id, |j| {
                j.start()?;
                if kind != AgentKind::All {
                    j.begin_step(kind.as_str(), 0);
                }
                Ok(())
            })
            .await;
        if let Err(e) = started {
            error!(job_id = %job_id, error = %e, "Failed to start job");
            cancels.unregister(job_id).await;
            return;
        }
        info!(job_id = %job_id, agent = %kind, database_id = ctx.database_id, "Job running");

        match kind {
            AgentKind::All => Self::run_pipeline(&store, &cancels, &agents, &ctx, job_id).await,
            single => Self::run_single(&store, &cancels, &agents, &ctx, job_id, single).await,
        }
    }

    async fn run_single(
        store: &JobStore,
        cancels: &CancelRegistry,
        agents: &AgentRegistry,
        ctx: &AgentContext,
        job_id: Uuid,
        kind: AgentKind,
    ) {
        let Some(agent) = agents.get(kind) else {
            // Not attributable to the agent run itself, fatal to the job.
            let err = JobError::UnknownAgent(kind);
            Self::resolve(store, cancels, job_id, |j| j.fail(err.to_string())).await;
            return;
        };

        match agent.run(ctx).await {
            Ok(report) => {
                Self::resolve(store, cancels, job_id, |j| j.complete(report)).await;
            }
            Err(e) if e.is_cancelled() => {
                Self::resolve(store, cancels, job_id, |j| j.cancel(None)).await;
            }
            Err(e) => {
                warn!(job_id = %job_id, agent = %kind, error = %e, "Agent failed");
                Self::resolve(store, cancels, job_id, |j| j.fail(e.to_string())).await;
            }
        }
    }

    /// Run the five agents in fixed order inside one job.
    ///
    /// A failing step is recorded under its key and the pipeline moves
    /// on; the job only fails on orchestration errors. Cancellation is
    /// checked at every step boundary and resolves the job with the
    /// partial per-step map.
    async fn run_pipeline(
        store: &JobStore,
        cancels: &CancelRegistry,
        agents: &AgentRegistry,
        ctx: &AgentContext,
        job_id: Uuid,
    ) {
        let total = AgentKind::PIPELINE.len();
        let mut steps = serde_json::Map::new();

        for (index, step) in AgentKind::PIPELINE.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                let partial = Self::partial_result(&steps);
                Self::resolve(store, cancels, job_id, |j| j.cancel(partial)).await;
                return;
            }

            let progress = (100 * index / total) as u8;
            let begun = store
                .update(job_id, |j| {
                    j.begin_step(step.as_str(), progress);
                    Ok(())
                })
                .await;
            if let Err(e) = begun {
                error!(job_id = %job_id, error = %e, "Failed to record pipeline step");
                cancels.unregister(job_id).await;
                return;
            }

            let Some(agent) = agents.get(*step) else {
                let err = JobError::UnknownAgent(*step);
                Self::resolve(store, cancels, job_id, |j| j.fail(err.to_string())).await;
                return;
            };

            match agent.run(ctx).await {
                Ok(report) => {
                    steps.insert(
                        step.to_string(),
                        serde_json::json!({ "result": report }),
                    );
                }
                Err(e) if e.is_cancelled() => {
                    let partial = Self::partial_result(&steps);
                    Self::resolve(store, cancels, job_id, |j| j.cancel(partial)).await;
                    return;
                }
                Err(e) => {
                    warn!(job_id = %job_id, step = %step, error = %e, "Pipeline step failed");
                    steps.insert(
                        step.to_string(),
                        serde_json::json!({ "error": e.to_string() }),
                    );
                }
            }
        }

        let result = serde_json::json!({ "steps": steps });
        Self::resolve(store, cancels, job_id, |j| j.complete(result)).await;
    }

    fn partial_result(steps: &serde_json::Map<String, serde_json::Value>) -> Option<serde_json::Value> {
        if steps.is_empty() {
            None
        } else {
            Some(serde_json::json!({ "steps": steps }))
        }
    }

    /// Apply the terminal transition and drop the cancellation token.
    async fn resolve<F>(store: &JobStore, cancels: &CancelRegistry, job_id: Uuid, mutate: F)
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        match store.update(job_id, mutate).await {
            Ok(job) => {
                info!(job_id = %job_id, status = %job.status, "Job resolved");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to resolve job");
            }
        }
        cancels.unregister(job_id).await;
    }
}
