//! Gardener agent — index health and maintenance planning.
//!
//! Estimates bloat from dead-tuple ratios, spots tables that have never
//! been analyzed, and produces a maintenance task list. Tasks are
//! advisory: each is marked with whether the database's autonomy level
//! would allow automatic execution, but nothing is executed here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use super::{AgentContext, AgentKind, AnalysisAgent, AutonomyLevel};
use crate::error::AgentError;

/// Dead tuple fraction treated as bloat needing a vacuum.
const BLOAT_THRESHOLD: f64 = 0.2;
/// Above this the table is degraded enough to reindex.
const SEVERE_BLOAT_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Serialize)]
struct TableHealth {
    table: String,
    live_tuples: i64,
    dead_tuples: i64,
    estimated_bloat_ratio: f64,
    last_analyze: Option<DateTime<Utc>>,
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct MaintenanceTask {
    table: String,
    task_type: &'static str,
    sql_command: String,
    reason: String,
    risk_level: &'static str,
    auto_executable: bool,
}

/// Health check and maintenance planning.
#[derive(Default)]
pub struct GardenerAgent;

impl GardenerAgent {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_health(&self, ctx: &AgentContext) -> Result<Vec<TableHealth>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT relname::text AS table_name,
                   n_live_tup,
                   n_dead_tup,
                   GREATEST(last_analyze, last_autoanalyze) AS analyzed_at
            FROM pg_stat_user_tables
            "#,
        )
        .fetch_all(ctx.db.pool())
        .await?;

        let mut health = Vec::with_capacity(rows.len());
        for row in rows {
            let live: i64 = row.try_get("n_live_tup")?;
            let dead: i64 = row.try_get("n_dead_tup")?;
            // Dead-tuple ratio is a coarse stand-in for real bloat
            // measurement (pgstattuple), which needs an extension.
            let ratio = if live + dead > 0 {
                dead as f64 / (live + dead) as f64
            } else {
                0.0
            };
            health.push(TableHealth {
                table: row.try_get("table_name")?,
                live_tuples: live,
                dead_tuples: dead,
                estimated_bloat_ratio: ratio,
                last_analyze: row.try_get("analyzed_at")?,
                status: health_status(ratio),
            });
        }
        Ok(health)
    }
}

#[async_trait]
impl AnalysisAgent for GardenerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Gardener
    }

    async fn run(&self, ctx: &AgentContext) -> Result<serde_json::Value, AgentError> {
        let health = self.fetch_health(ctx).await?;
        ctx.checkpoint()?;

        let tasks = plan_maintenance(&health, ctx.autonomy);
        let healthy = health.iter().filter(|h| h.status == "healthy").count();

        tracing::info!(
            database_id = ctx.database_id,
            tables = health.len(),
            tasks = tasks.len(),
            "Gardener analysis complete"
        );

        Ok(serde_json::json!({
            "status": "success",
            "autonomy_level": ctx.autonomy,
            "index_health": health,
            "healthy_count": healthy,
            "maintenance_tasks": tasks,
            "tasks_count": tasks.len(),
        }))
    }
}

fn health_status(bloat_ratio: f64) -> &'static str {
    if bloat_ratio > SEVERE_BLOAT_THRESHOLD {
        "degraded"
    } else if bloat_ratio > BLOAT_THRESHOLD {
        "bloated"
    } else {
        "healthy"
    }
}

fn plan_maintenance(health: &[TableHealth], autonomy: AutonomyLevel) -> Vec<MaintenanceTask> {
    let mut tasks = Vec::new();

    for table in health {
        if table.estimated_bloat_ratio > SEVERE_BLOAT_THRESHOLD {
            tasks.push(task(
                table,
                "reindex",
                format!("REINDEX TABLE CONCURRENTLY {}", table.table),
                format!(
                    "Severe bloat: {:.1}% dead tuples",
                    table.estimated_bloat_ratio * 100.0
                ),
                "medium",
                autonomy,
            ));
        } else if table.estimated_bloat_ratio > BLOAT_THRESHOLD {
            tasks.push(task(
                table,
                "vacuum",
                format!("VACUUM ANALYZE {}", table.table),
                format!(
                    "High bloat ratio: {:.1}%",
                    table.estimated_bloat_ratio * 100.0
                ),
                "low",
                autonomy,
            ));
        }

        if table.last_analyze.is_none() && table.live_tuples > 0 {
            tasks.push(task(
                table,
                "analyze",
                format!("ANALYZE {}", table.table),
                "Table has never been analyzed, planner statistics are missing".to_string(),
                "low",
                autonomy,
            ));
        }
    }

    tasks
}

fn task(
    table: &TableHealth,
    task_type: &'static str,
    sql_command: String,
    reason: String,
    risk_level: &'static str,
    autonomy: AutonomyLevel,
) -> MaintenanceTask {
    MaintenanceTask {
        table: table.table.clone(),
        task_type,
        sql_command,
        reason,
        risk_level,
        auto_executable: can_auto_execute(risk_level, autonomy),
    }
}

/// Whether the configured autonomy level would allow running this task
/// without approval. Observation and assisted modes never auto-execute;
/// trust allows low-risk commands only.
fn can_auto_execute(risk_level: &str, autonomy: AutonomyLevel) -> bool {
    match autonomy {
        AutonomyLevel::Observation | AutonomyLevel::Assisted => false,
        AutonomyLevel::Trust => risk_level == "low",
        AutonomyLevel::Autonomous => true,
    }
}
