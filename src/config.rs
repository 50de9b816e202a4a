//! Configuration types.

use crate::agents::AutonomyLevel;
use crate::db::DatabaseConfig;
use crate::llm::LlmConfig;

/// Orchestrator limits and policies.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of jobs that may be pending or running at once.
    pub max_parallel_jobs: usize,
    /// Reject a run request while a job for the same `(database, agent)`
    /// pair is still active. Off by default: unrelated analyses may
    /// overlap, and the dashboard gates re-runs itself.
    pub reject_duplicate_runs: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 10,
            reject_duplicate_runs: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_parallel_jobs: env_parse("PG_AGENTS_MAX_PARALLEL_JOBS")
                .unwrap_or(defaults.max_parallel_jobs),
            reject_duplicate_runs: env_parse("PG_AGENTS_REJECT_DUPLICATE_RUNS")
                .unwrap_or(defaults.reject_duplicate_runs),
        }
    }
}

/// Top-level service configuration, loaded from environment variables.
#[derive(Clone)]
pub struct ServiceConfig {
    pub api_host: String,
    pub api_port: u16,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorConfig,
    pub databases: Vec<DatabaseConfig>,
}

impl ServiceConfig {
    /// Build config from environment variables.
    ///
    /// One target database is configured from `PG_TARGET_*` (catalog id 1),
    /// matching the upstream single-target deployment. Missing values fall
    /// back to local-development defaults.
    pub fn from_env() -> Self {
        let llm = LlmConfig {
            api_key: secrecy::SecretString::from(
                std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            ),
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "moonshotai/kimi-k2".to_string()),
        };

        let autonomy = std::env::var("PG_TARGET_AUTONOMY")
            .ok()
            .and_then(|s| match s.as_str() {
                "observation" => Some(AutonomyLevel::Observation),
                "assisted" => Some(AutonomyLevel::Assisted),
                "trust" => Some(AutonomyLevel::Trust),
                "autonomous" => Some(AutonomyLevel::Autonomous),
                _ => None,
            })
            .unwrap_or_default();

        let database = DatabaseConfig {
            id: 1,
            name: std::env::var("PG_TARGET_NAME").unwrap_or_else(|_| "target".to_string()),
            host: std::env::var("PG_TARGET_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("PG_TARGET_PORT").unwrap_or(5432),
            database: std::env::var("PG_TARGET_DATABASE")
                .unwrap_or_else(|_| "postgres".to_string()),
            user: std::env::var("PG_TARGET_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("PG_TARGET_PASSWORD").unwrap_or_default(),
            autonomy,
        };

        Self {
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env_parse("API_PORT").unwrap_or(8000),
            llm,
            orchestrator: OrchestratorConfig::from_env(),
            databases: vec![database],
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
