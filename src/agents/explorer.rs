//! Explorer agent — schema and index structure analysis.
//!
//! Reads table and index metadata from the statistics catalog,
//! classifies tables by activity and flags structural anomalies:
//! large tables without secondary indexes, unused indexes, and
//! redundant index prefixes.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::Row;

use super::{AgentContext, AgentKind, AnalysisAgent};
use crate::error::AgentError;

/// Row-count threshold above which a table is expected to carry
/// secondary indexes.
const LARGE_TABLE_ROWS: i64 = 10_000;

#[derive(Debug, Clone, Serialize)]
struct TableInfo {
    name: String,
    row_count: i64,
    total_bytes: i64,
    seq_scans: i64,
    idx_scans: i64,
}

#[derive(Debug, Clone, Serialize)]
struct IndexInfo {
    table: String,
    name: String,
    is_primary: bool,
    is_unique: bool,
    scans: i64,
    columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Anomaly {
    #[serde(rename = "type")]
    kind: &'static str,
    severity: &'static str,
    table: String,
    description: String,
    recommendation: String,
}

/// Schema exploration and anomaly detection.
#[derive(Default)]
pub struct ExplorerAgent;

impl ExplorerAgent {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_tables(&self, ctx: &AgentContext) -> Result<Vec<TableInfo>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT relname::text AS table_name,
                   n_live_tup,
                   pg_total_relation_size(relid) AS total_bytes,
                   seq_scan,
                   COALESCE(idx_scan, 0) AS idx_scan
            FROM pg_stat_user_tables
            ORDER BY n_live_tup DESC
            "#,
        )
        .fetch_all(ctx.db.pool())
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            tables.push(TableInfo {
                name: row.try_get("table_name")?,
                row_count: row.try_get("n_live_tup")?,
                total_bytes: row.try_get("total_bytes")?,
                seq_scans: row.try_get("seq_scan")?,
                idx_scans: row.try_get("idx_scan")?,
            });
        }
        Ok(tables)
    }

    async fn fetch_indexes(&self, ctx: &AgentContext) -> Result<Vec<IndexInfo>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT s.relname::text AS table_name,
                   s.indexrelname::text AS index_name,
                   x.indisprimary AS is_primary,
                   x.indisunique AS is_unique,
                   COALESCE(s.idx_scan, 0) AS scans,
                   pg_get_indexdef(s.indexrelid) AS definition
            FROM pg_stat_user_indexes s
            JOIN pg_index x ON x.indexrelid = s.indexrelid
            "#,
        )
        .fetch_all(ctx.db.pool())
        .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let definition: String = row.try_get("definition")?;
            indexes.push(IndexInfo {
                table: row.try_get("table_name")?,
                name: row.try_get("index_name")?,
                is_primary: row.try_get("is_primary")?,
                is_unique: row.try_get("is_unique")?,
                scans: row.try_get("scans")?,
                columns: index_columns(&definition),
            });
        }
        Ok(indexes)
    }
}

#[async_trait]
impl AnalysisAgent for ExplorerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Explorer
    }

    async fn run(&self, ctx: &AgentContext) -> Result<serde_json::Value, AgentError> {
        let tables = self.fetch_tables(ctx).await?;
        ctx.checkpoint()?;
        let indexes = self.fetch_indexes(ctx).await?;
        ctx.checkpoint()?;

        let classifications: serde_json::Map<String, serde_json::Value> = tables
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    serde_json::json!({
                        "tier": classify(t),
                        "row_count": t.row_count,
                        "total_bytes": t.total_bytes,
                    }),
                )
            })
            .collect();

        let anomalies = detect_anomalies(&tables, &indexes);
        let high_severity = anomalies.iter().filter(|a| a.severity == "high").count();

        tracing::info!(
            database_id = ctx.database_id,
            tables = tables.len(),
            anomalies = anomalies.len(),
            "Explorer analysis complete"
        );

        Ok(serde_json::json!({
            "status": "success",
            "tables_analyzed": tables.len(),
            "indexes_analyzed": indexes.len(),
            "classifications": classifications,
            "anomalies": anomalies,
            "anomalies_count": anomalies.len(),
            "high_severity_count": high_severity,
        }))
    }
}

/// Activity tier for a table: hot tables see heavy scanning, cold ones
/// are small and rarely touched.
fn classify(table: &TableInfo) -> &'static str {
    let scans = table.seq_scans + table.idx_scans;
    if scans > 100_000 || table.row_count > 1_000_000 {
        "hot"
    } else if scans > 1_000 || table.row_count > LARGE_TABLE_ROWS {
        "warm"
    } else {
        "cold"
    }
}

/// Pull the column list out of a `pg_get_indexdef` definition:
/// `CREATE INDEX idx ON t USING btree (a, b)` → `["a", "b"]`.
fn index_columns(definition: &str) -> Vec<String> {
    let Some(start) = definition.find('(') else {
        return Vec::new();
    };
    let Some(end) = definition.rfind(')') else {
        return Vec::new();
    };
    definition[start + 1..end]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn detect_anomalies(tables: &[TableInfo], indexes: &[IndexInfo]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    for table in tables {
        let table_indexes: Vec<&IndexInfo> =
            indexes.iter().filter(|i| i.table == table.name).collect();

        // Large table with nothing beyond its primary key.
        let secondary = table_indexes.iter().filter(|i| !i.is_primary).count();
        if table.row_count > LARGE_TABLE_ROWS && secondary == 0 {
            anomalies.push(Anomaly {
                kind: "missing_secondary_index",
                severity: "high",
                table: table.name.clone(),
                description: format!(
                    "Large table ({} rows) has no secondary indexes",
                    table.row_count
                ),
                recommendation: "Consider adding indexes on frequently queried columns".into(),
            });
        }

        // Indexes that are never scanned on a table that is.
        for index in &table_indexes {
            if index.scans == 0 && !index.is_primary && !index.is_unique && table.idx_scans > 0 {
                anomalies.push(Anomaly {
                    kind: "unused_index",
                    severity: "medium",
                    table: table.name.clone(),
                    description: format!("Index '{}' has never been scanned", index.name),
                    recommendation: format!("Consider DROP INDEX CONCURRENTLY {}", index.name),
                });
            }
        }

        // One index's column list is a prefix of another's.
        for (i, a) in table_indexes.iter().enumerate() {
            for b in table_indexes.iter().skip(i + 1) {
                let (longer, shorter) = if a.columns.len() >= b.columns.len() {
                    (a, b)
                } else {
                    (b, a)
                };
                if !shorter.columns.is_empty()
                    && longer.columns.starts_with(&shorter.columns)
                    && longer.columns.len() > shorter.columns.len()
                    && !shorter.is_primary
                    && !shorter.is_unique
                {
                    anomalies.push(Anomaly {
                        kind: "redundant_index",
                        severity: "low",
                        table: table.name.clone(),
                        description: format!(
                            "Index '{}' is a prefix of '{}'",
                            shorter.name, longer.name
                        ),
                        recommendation: format!(
                            "Consider DROP INDEX CONCURRENTLY {}",
                            shorter.name
                        ),
                    });
                }
            }
        }
    }

    anomalies
}
