//! Partitioner agent — partitioning advisory for large tables.
//!
//! Read-only: finds tables past the size threshold, looks for usable
//! partition keys (timestamp columns for range partitioning, integer
//! keys for hash) and writes recommendations. It never proposes
//! executable DDL, since repartitioning an existing table is a manual
//! migration.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::Row;

use super::{AgentContext, AgentKind, AnalysisAgent};
use crate::error::AgentError;

/// Tables above this size are worth partitioning analysis.
const LARGE_TABLE_BYTES: i64 = 1 << 30;

#[derive(Debug, Clone, Serialize)]
struct LargeTable {
    name: String,
    total_bytes: i64,
    row_count: i64,
}

#[derive(Debug, Clone, Serialize)]
struct PartitionCandidate {
    table: String,
    column: String,
    strategy: &'static str,
    reason: String,
}

/// Partitioning analysis.
#[derive(Default)]
pub struct PartitionerAgent;

impl PartitionerAgent {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_large_tables(&self, ctx: &AgentContext) -> Result<Vec<LargeTable>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT c.relname::text AS table_name,
                   pg_total_relation_size(c.oid) AS total_bytes,
                   COALESCE(s.n_live_tup, 0) AS n_live_tup
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_stat_user_tables s ON s.relid = c.oid
            WHERE c.relkind = 'r'
              AND n.nspname NOT IN ('pg_catalog', 'information_schema')
              AND pg_total_relation_size(c.oid) > $1
            ORDER BY pg_total_relation_size(c.oid) DESC
            "#,
        )
        .bind(LARGE_TABLE_BYTES)
        .fetch_all(ctx.db.pool())
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            tables.push(LargeTable {
                name: row.try_get("table_name")?,
                total_bytes: row.try_get("total_bytes")?,
                row_count: row.try_get("n_live_tup")?,
            });
        }
        Ok(tables)
    }

    /// Column name and data type for one table.
    async fn fetch_columns(
        &self,
        ctx: &AgentContext,
        table: &str,
    ) -> Result<Vec<(String, String)>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name, data_type::text AS data_type
            FROM information_schema.columns
            WHERE table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(ctx.db.pool())
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push((row.try_get("column_name")?, row.try_get("data_type")?));
        }
        Ok(columns)
    }

    async fn count_partitioned_tables(&self, ctx: &AgentContext) -> Result<i64, AgentError> {
        let row = sqlx::query("SELECT count(*) AS n FROM pg_partitioned_table")
            .fetch_one(ctx.db.pool())
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[async_trait]
impl AnalysisAgent for PartitionerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Partitioner
    }

    async fn run(&self, ctx: &AgentContext) -> Result<serde_json::Value, AgentError> {
        let large_tables = self.fetch_large_tables(ctx).await?;
        ctx.checkpoint()?;

        let mut candidates = Vec::new();
        for table in &large_tables {
            ctx.checkpoint()?;
            let columns = self.fetch_columns(ctx, &table.name).await?;
            candidates.extend(pick_candidates(&table.name, &columns));
        }

        let existing_partitions = self.count_partitioned_tables(ctx).await?;
        let recommendations = build_recommendations(&large_tables, &candidates);

        tracing::info!(
            database_id = ctx.database_id,
            large_tables = large_tables.len(),
            candidates = candidates.len(),
            "Partitioner analysis complete"
        );

        Ok(serde_json::json!({
            "status": "success",
            "large_tables_analyzed": large_tables.len(),
            "large_tables": large_tables,
            "partition_candidates": candidates,
            "existing_partitions": existing_partitions,
            "recommendations": recommendations,
            "recommendations_count": recommendations.len(),
        }))
    }
}

/// Prefer range partitioning on time columns; fall back to hash on an
/// integer key column.
fn pick_candidates(table: &str, columns: &[(String, String)]) -> Vec<PartitionCandidate> {
    let mut candidates = Vec::new();

    for (name, data_type) in columns {
        if data_type.starts_with("timestamp") || data_type == "date" {
            candidates.push(PartitionCandidate {
                table: table.to_string(),
                column: name.clone(),
                strategy: "range",
                reason: format!("'{name}' is a {data_type} column, suitable for time-based ranges"),
            });
        }
    }

    if candidates.is_empty() {
        for (name, data_type) in columns {
            let lower = name.to_lowercase();
            if (data_type == "integer" || data_type == "bigint")
                && (lower.ends_with("_id") || lower == "id")
            {
                candidates.push(PartitionCandidate {
                    table: table.to_string(),
                    column: name.clone(),
                    strategy: "hash",
                    reason: format!("'{name}' distributes rows evenly across hash partitions"),
                });
                break;
            }
        }
    }

    candidates
}

fn build_recommendations(tables: &[LargeTable], candidates: &[PartitionCandidate]) -> Vec<String> {
    let mut recommendations = Vec::new();

    for table in tables {
        let table_candidates: Vec<&PartitionCandidate> =
            candidates.iter().filter(|c| c.table == table.name).collect();
        match table_candidates.first() {
            Some(best) => recommendations.push(format!(
                "Partition '{}' ({} bytes) by {} on '{}'; migrate with a parallel \
                 partitioned table and batched INSERT ... SELECT",
                table.name, table.total_bytes, best.strategy, best.column
            )),
            None => recommendations.push(format!(
                "'{}' is large ({} bytes) but has no obvious partition key; review access \
                 patterns before partitioning",
                table.name, table.total_bytes
            )),
        }
    }

    recommendations
}
