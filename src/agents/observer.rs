//! Observer agent — activity metrics and signal detection.
//!
//! Samples the statistics collector (`pg_stat_user_tables`,
//! `pg_statio_user_tables`, optionally `pg_stat_statements`) and turns
//! the readings into monitoring signals: sequential-scan pressure, dead
//! tuple build-up, poor cache hit ratios and slow queries.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::Row;

use super::{AgentContext, AgentKind, AnalysisAgent};
use crate::error::AgentError;

/// Dead tuple fraction above which a table needs vacuuming attention.
const DEAD_TUPLE_THRESHOLD: f64 = 0.2;
/// Cache hit ratio below which the buffer cache is struggling.
const CACHE_HIT_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Serialize)]
struct TableMetrics {
    name: String,
    live_tuples: i64,
    dead_tuples: i64,
    seq_scans: i64,
    idx_scans: i64,
}

#[derive(Debug, Clone, Serialize)]
struct Signal {
    #[serde(rename = "type")]
    kind: &'static str,
    severity: &'static str,
    table: Option<String>,
    description: String,
}

/// Metric collection and signal detection.
#[derive(Default)]
pub struct ObserverAgent;

impl ObserverAgent {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_table_metrics(
        &self,
        ctx: &AgentContext,
    ) -> Result<Vec<TableMetrics>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT relname::text AS table_name,
                   n_live_tup,
                   n_dead_tup,
                   seq_scan,
                   COALESCE(idx_scan, 0) AS idx_scan
            FROM pg_stat_user_tables
            "#,
        )
        .fetch_all(ctx.db.pool())
        .await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            metrics.push(TableMetrics {
                name: row.try_get("table_name")?,
                live_tuples: row.try_get("n_live_tup")?,
                dead_tuples: row.try_get("n_dead_tup")?,
                seq_scans: row.try_get("seq_scan")?,
                idx_scans: row.try_get("idx_scan")?,
            });
        }
        Ok(metrics)
    }

    async fn fetch_cache_hit_ratio(&self, ctx: &AgentContext) -> Result<f64, AgentError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(
                       sum(heap_blks_hit)::float8
                       / NULLIF(sum(heap_blks_hit) + sum(heap_blks_read), 0),
                       1.0
                   ) AS ratio
            FROM pg_statio_user_tables
            "#,
        )
        .fetch_one(ctx.db.pool())
        .await?;
        Ok(row.try_get("ratio")?)
    }

    /// Top statements by mean execution time, when the
    /// `pg_stat_statements` extension is installed.
    async fn fetch_slow_queries(
        &self,
        ctx: &AgentContext,
    ) -> Result<Option<Vec<serde_json::Value>>, AgentError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements') AS available",
        )
        .fetch_one(ctx.db.pool())
        .await?;
        let available: bool = row.try_get("available")?;
        if !available {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT query, calls, mean_exec_time, rows
            FROM pg_stat_statements
            WHERE dbid = (SELECT oid FROM pg_database WHERE datname = current_database())
              AND query NOT LIKE '%pg_stat%'
            ORDER BY mean_exec_time DESC
            LIMIT 10
            "#,
        )
        .fetch_all(ctx.db.pool())
        .await?;

        let mut queries = Vec::with_capacity(rows.len());
        for row in rows {
            let query: String = row.try_get("query")?;
            let calls: i64 = row.try_get("calls")?;
            let mean_exec_time: f64 = row.try_get("mean_exec_time")?;
            let returned: i64 = row.try_get("rows")?;
            queries.push(serde_json::json!({
                "query": query,
                "calls": calls,
                "mean_exec_time_ms": mean_exec_time,
                "rows": returned,
            }));
        }
        Ok(Some(queries))
    }
}

#[async_trait]
impl AnalysisAgent for ObserverAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Observer
    }

    async fn run(&self, ctx: &AgentContext) -> Result<serde_json::Value, AgentError> {
        let tables = self.fetch_table_metrics(ctx).await?;
        ctx.checkpoint()?;
        let cache_hit_ratio = self.fetch_cache_hit_ratio(ctx).await?;
        ctx.checkpoint()?;
        let slow_queries = self.fetch_slow_queries(ctx).await?;
        ctx.checkpoint()?;

        let signals = detect_signals(&tables, cache_hit_ratio);

        tracing::info!(
            database_id = ctx.database_id,
            tables = tables.len(),
            signals = signals.len(),
            "Observer analysis complete"
        );

        Ok(serde_json::json!({
            "status": "success",
            "metrics": {
                "tables": tables.len(),
                "cache_hit_ratio": cache_hit_ratio,
            },
            "slow_queries": slow_queries,
            "signals": signals,
            "signals_count": signals.len(),
        }))
    }
}

fn detect_signals(tables: &[TableMetrics], cache_hit_ratio: f64) -> Vec<Signal> {
    let mut signals = Vec::new();

    for table in tables {
        // Sequential scans dominating on a table big enough to hurt.
        if table.live_tuples > 10_000 && table.seq_scans > table.idx_scans {
            signals.push(Signal {
                kind: "seq_scan_pressure",
                severity: "high",
                table: Some(table.name.clone()),
                description: format!(
                    "{} sequential scans vs {} index scans on {} rows",
                    table.seq_scans, table.idx_scans, table.live_tuples
                ),
            });
        }

        let total = table.live_tuples + table.dead_tuples;
        if total > 0 {
            let dead_ratio = table.dead_tuples as f64 / total as f64;
            if dead_ratio > DEAD_TUPLE_THRESHOLD {
                signals.push(Signal {
                    kind: "dead_tuple_buildup",
                    severity: "medium",
                    table: Some(table.name.clone()),
                    description: format!("{:.1}% dead tuples", dead_ratio * 100.0),
                });
            }
        }
    }

    if cache_hit_ratio < CACHE_HIT_THRESHOLD {
        signals.push(Signal {
            kind: "low_cache_hit_ratio",
            severity: "medium",
            table: None,
            description: format!("Cache hit ratio at {:.1}%", cache_hit_ratio * 100.0),
        });
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(name: &str, live: i64, dead: i64, seq: i64, idx: i64) -> TableMetrics {
        TableMetrics {
            name: name.into(),
            live_tuples: live,
            dead_tuples: dead,
            seq_scans: seq,
            idx_scans: idx,
        }
    }

    #[test]
    fn seq_scan_pressure_needs_size_and_dominance() {
        let signals = detect_signals(&[metrics("posts", 50_000, 0, 900, 100)], 0.99);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, "seq_scan_pressure");

        // Small table: sequential scans are fine.
        assert!(detect_signals(&[metrics("tags", 50, 0, 900, 0)], 0.99).is_empty());

        // Index scans dominate: no signal.
        assert!(detect_signals(&[metrics("posts", 50_000, 0, 10, 900)], 0.99).is_empty());
    }

    #[test]
    fn dead_tuple_buildup() {
        let signals = detect_signals(&[metrics("events", 1_000, 400, 0, 10)], 0.99);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, "dead_tuple_buildup");
        assert_eq!(signals[0].table.as_deref(), Some("events"));
    }

    #[test]
    fn low_cache_hit_ratio_is_database_wide() {
        let signals = detect_signals(&[], 0.5);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, "low_cache_hit_ratio");
        assert!(signals[0].table.is_none());
    }

    #[test]
    fn healthy_database_is_quiet() {
        let signals = detect_signals(&[metrics("posts", 50_000, 100, 10, 900)], 0.99);
        assert!(signals.is_empty());
    }
}
