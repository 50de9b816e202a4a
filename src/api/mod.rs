//! REST endpoints for the dashboard: run agents, poll jobs, cancel.
//!
//! Run requests return `202 Accepted` with a job id immediately; the
//! dashboard polls `GET /jobs/{id}` until the job reaches a terminal
//! state.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::error::{DatabaseError, Error, JobError};
use crate::jobs::{JobService, JobStatus, Orchestrator};

/// Default page size for job listings.
const DEFAULT_JOBS_LIMIT: usize = 50;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub service: JobService,
}

/// Build the Axum router for the job API.
pub fn api_routes(orchestrator: Arc<Orchestrator>, service: JobService) -> Router {
    let state = AppState {
        orchestrator,
        service,
    };

    Router::new()
        .route("/health", get(health))
        .route("/databases/{db_id}/analyze/{agent}", post(run_agent))
        .route("/jobs", get(list_jobs))
        .route("/jobs/running/count", get(running_count))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pg-agents"
    }))
}

// ── Run ─────────────────────────────────────────────────────────────────

async fn run_agent(
    State(state): State<AppState>,
    Path((db_id, agent)): Path<(i64, String)>,
) -> impl IntoResponse {
    let kind: AgentKind = match agent.parse() {
        Ok(kind) => kind,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("Unknown agent '{agent}'")})),
            );
        }
    };

    match state.orchestrator.run(db_id, kind).await {
        Ok(job) => {
            info!(job_id = %job.id, agent = %kind, db_id, "Run accepted");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": "started",
                    "job_id": job.id,
                    "message": format!("{kind} started in background"),
                })),
            )
        }
        Err(Error::Database(DatabaseError::UnknownDatabase(_))) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Database not found"})),
        ),
        Err(Error::Job(e @ JobError::MaxJobsExceeded { .. })) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(Error::Job(e @ JobError::DuplicateRun { .. })) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

// ── Jobs ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListJobsQuery {
    db_id: Option<i64>,
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<JobStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": e})),
                );
            }
        },
    };

    let jobs = state
        .service
        .list_jobs(query.db_id, status, query.limit.unwrap_or(DEFAULT_JOBS_LIMIT))
        .await;
    let summaries: Vec<serde_json::Value> = jobs.iter().map(job_summary).collect();
    (StatusCode::OK, Json(serde_json::json!(summaries)))
}

/// Listing entry: the full record minus the result payload, which can be
/// large and is only needed when polling a single job.
fn job_summary(job: &crate::jobs::Job) -> serde_json::Value {
    serde_json::json!({
        "id": job.id,
        "database_id": job.database_id,
        "agent": job.agent,
        "status": job.status,
        "progress": job.progress,
        "current_step": job.current_step,
        "total_steps": job.total_steps,
        "error": job.error,
        "created_at": job.created_at,
        "started_at": job.started_at,
        "completed_at": job.completed_at,
    })
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let job_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid job ID"})),
            );
        }
    };

    match state.service.get_job(job_id).await {
        Ok(job) => (StatusCode::OK, Json(serde_json::json!(job))),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Job not found"})),
        ),
    }
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let job_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid job ID"})),
            );
        }
    };

    match state.service.cancel(job_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "cancelled", "job_id": job_id})),
        ),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Job not found"})),
        ),
    }
}

async fn running_count(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.service.count_running().await;
    Json(serde_json::json!({"running_jobs": count}))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::agents::{AgentContext, AgentRegistry, AnalysisAgent, AutonomyLevel};
    use crate::config::OrchestratorConfig;
    use crate::db::{DatabaseCatalog, DatabaseConfig};
    use crate::error::AgentError;
    use crate::jobs::{CancelRegistry, JobStore};

    struct EchoAgent(AgentKind);

    #[async_trait]
    impl AnalysisAgent for EchoAgent {
        fn kind(&self) -> AgentKind {
            self.0
        }
        async fn run(&self, _ctx: &AgentContext) -> Result<serde_json::Value, AgentError> {
            Ok(serde_json::json!({"agent": self.0.as_str()}))
        }
    }

    fn test_app() -> (Router, JobService) {
        let store = Arc::new(JobStore::new());
        let cancels = Arc::new(CancelRegistry::new());
        let mut registry = AgentRegistry::new();
        for kind in AgentKind::PIPELINE {
            registry.register(Arc::new(EchoAgent(kind)));
        }
        let catalog = Arc::new(DatabaseCatalog::new([DatabaseConfig {
            id: 7,
            name: "target".into(),
            host: "localhost".into(),
            port: 5432,
            database: "app".into(),
            user: "reader".into(),
            password: "".into(),
            autonomy: AutonomyLevel::Assisted,
        }]));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            cancels.clone(),
            Arc::new(registry),
            catalog,
            None,
            OrchestratorConfig::default(),
        ));
        let service = JobService::new(store, cancels);
        (api_routes(orchestrator, service.clone()), service)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn run_agent_returns_accepted_with_job_id() {
        let (app, service) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/databases/7/analyze/explorer")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "started");
        let job_id: Uuid = serde_json::from_value(body["job_id"].clone()).unwrap();
        assert!(service.get_job(job_id).await.is_ok());
    }

    #[tokio::test]
    async fn run_agent_unknown_database_is_404() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/databases/99/analyze/explorer")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_agent_unknown_agent_is_400() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/databases/7/analyze/reaper")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_job_unknown_is_404_and_invalid_is_400() {
        let (app, _) = test_app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/jobs/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/jobs/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_jobs_rejects_bad_status() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/jobs?status=exploded")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_after_completion() {
        let (app, service) = test_app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/databases/7/analyze/observer")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let job_id: Uuid = serde_json::from_value(body["job_id"].clone()).unwrap();

        // Wait for the background task to finish.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if service.get_job(job_id).await.unwrap().status.is_terminal() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(format!("/jobs/{job_id}/cancel"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let job = service.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn running_count_endpoint() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/jobs/running/count")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["running_jobs"], 0);
    }
}
