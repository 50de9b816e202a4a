//! Architect agent — index proposals from observed scan pressure.
//!
//! Finds tables where sequential scans dominate, picks candidate filter
//! columns by naming convention, and emits `CREATE INDEX CONCURRENTLY`
//! proposals. When an LLM provider is configured it is asked to vet the
//! proposal set and supply a rationale; without one the heuristics stand
//! alone.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::Row;

use super::{AgentContext, AgentKind, AnalysisAgent};
use crate::error::AgentError;
use crate::llm::CompletionRequest;

/// Column name fragments that commonly appear in WHERE clauses.
const FILTER_PATTERNS: [&str; 9] = [
    "status", "type", "state", "created_at", "updated_at", "user_id", "owner_id", "parent_id",
    "category",
];

#[derive(Debug, Clone, Serialize)]
struct Proposal {
    table: String,
    column: String,
    proposal_type: &'static str,
    sql_command: String,
    risk_level: &'static str,
    rationale: String,
}

/// Index proposal generation.
#[derive(Default)]
pub struct ArchitectAgent;

impl ArchitectAgent {
    pub fn new() -> Self {
        Self
    }

    /// Tables under sequential-scan pressure with their unindexed
    /// filter-pattern columns.
    async fn fetch_candidates(
        &self,
        ctx: &AgentContext,
    ) -> Result<Vec<(String, Vec<String>)>, AgentError> {
        let rows = sqlx::query(
            r#"
            SELECT s.relname::text AS table_name,
                   c.column_name::text AS column_name
            FROM pg_stat_user_tables s
            JOIN information_schema.columns c
              ON c.table_schema = s.schemaname AND c.table_name = s.relname
            WHERE s.n_live_tup > 10000
              AND s.seq_scan > COALESCE(s.idx_scan, 0)
              AND NOT EXISTS (
                  SELECT 1
                  FROM pg_stat_user_indexes i
                  WHERE i.relid = s.relid
                    AND pg_get_indexdef(i.indexrelid) LIKE '%(' || c.column_name || '%'
              )
            ORDER BY s.relname, c.ordinal_position
            "#,
        )
        .fetch_all(ctx.db.pool())
        .await?;

        // Rows arrive ordered by table, so grouping only needs the tail.
        let mut candidates: Vec<(String, Vec<String>)> = Vec::new();
        for row in rows {
            let table: String = row.try_get("table_name")?;
            let column: String = row.try_get("column_name")?;
            if !matches_filter_pattern(&column) {
                continue;
            }
            if let Some((last, columns)) = candidates.last_mut()
                && *last == table
            {
                columns.push(column);
                continue;
            }
            candidates.push((table, vec![column]));
        }
        Ok(candidates)
    }

    async fn llm_rationale(
        &self,
        ctx: &AgentContext,
        proposals: &[Proposal],
    ) -> Result<Option<String>, AgentError> {
        let Some(llm) = &ctx.llm else {
            return Ok(None);
        };

        let listing = proposals
            .iter()
            .map(|p| format!("- {}", p.sql_command))
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest::for_proposals(format!(
            "You are reviewing PostgreSQL index proposals generated from \
             sequential-scan statistics. For each proposal, state in one \
             sentence whether it is worth applying and why.\n\n{listing}"
        ));

        let response = llm.complete(request).await?;
        Ok(Some(response.content))
    }
}

#[async_trait]
impl AnalysisAgent for ArchitectAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Architect
    }

    async fn run(&self, ctx: &AgentContext) -> Result<serde_json::Value, AgentError> {
        let candidates = self.fetch_candidates(ctx).await?;
        ctx.checkpoint()?;

        let proposals: Vec<Proposal> = candidates
            .iter()
            .flat_map(|(table, columns)| columns.iter().map(|c| build_proposal(table, c)))
            .collect();

        let llm_analysis = if proposals.is_empty() {
            None
        } else {
            self.llm_rationale(ctx, &proposals).await?
        };

        tracing::info!(
            database_id = ctx.database_id,
            proposals = proposals.len(),
            autonomy = %ctx.autonomy,
            "Architect analysis complete"
        );

        Ok(serde_json::json!({
            "status": "success",
            "autonomy_level": ctx.autonomy,
            "proposals": proposals,
            "proposals_count": proposals.len(),
            "llm_analysis": llm_analysis,
        }))
    }
}

fn matches_filter_pattern(column: &str) -> bool {
    let lower = column.to_lowercase();
    FILTER_PATTERNS.iter().any(|p| lower.contains(p))
}

fn build_proposal(table: &str, column: &str) -> Proposal {
    Proposal {
        table: table.to_string(),
        column: column.to_string(),
        proposal_type: "create_index",
        // CONCURRENTLY keeps the table writable while the index builds.
        sql_command: format!(
            "CREATE INDEX CONCURRENTLY idx_{table}_{column} ON {table} ({column})"
        ),
        risk_level: "low",
        rationale: format!(
            "Sequential scans dominate on '{table}' and '{column}' matches a common filter pattern"
        ),
    }
}
