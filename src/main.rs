use std::sync::Arc;

use pg_agents::agents::AgentRegistry;
use pg_agents::api::api_routes;
use pg_agents::config::ServiceConfig;
use pg_agents::db::DatabaseCatalog;
use pg_agents::jobs::{CancelRegistry, JobService, JobStore, Orchestrator};
use pg_agents::llm;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env();

    eprintln!("pg-agents v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}:{}", config.api_host, config.api_port);
    eprintln!("   Model: {}", config.llm.model);
    for db in &config.databases {
        eprintln!(
            "   Database {}: {} ({}:{}/{}, autonomy: {})",
            db.id, db.name, db.host, db.port, db.database, db.autonomy
        );
    }

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = llm::create_provider(&config.llm);
    if llm.is_none() {
        eprintln!("   LLM: disabled (set OPENROUTER_API_KEY to enable)");
    }

    // ── Job subsystem ───────────────────────────────────────────────────
    let store = Arc::new(JobStore::new());
    let cancels = Arc::new(CancelRegistry::new());
    let catalog = Arc::new(DatabaseCatalog::new(config.databases.clone()));
    let registry = Arc::new(AgentRegistry::with_defaults());

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        cancels.clone(),
        registry,
        catalog,
        llm,
        config.orchestrator.clone(),
    ));
    let service = JobService::new(store, cancels);

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = api_routes(orchestrator, service);
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.api_host, config.api_port)).await?;
    tracing::info!(host = %config.api_host, port = config.api_port, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
