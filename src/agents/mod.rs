//! Analysis agents — the five database analyses and their shared contract.
//!
//! Each agent takes a read-only handle to a target PostgreSQL database and
//! produces a JSON report. The orchestrator treats agents as opaque: it
//! stores whatever they return and never interprets report contents.

pub mod architect;
pub mod explorer;
pub mod gardener;
pub mod observer;
pub mod partitioner;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::db::TargetDb;
use crate::error::AgentError;
use crate::llm::LlmProvider;

pub use architect::ArchitectAgent;
pub use explorer::ExplorerAgent;
pub use gardener::GardenerAgent;
pub use observer::ObserverAgent;
pub use partitioner::PartitionerAgent;

/// Which analysis to run. `All` is the five-step pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Schema and index structure analysis.
    Explorer,
    /// Activity metrics and signal detection.
    Observer,
    /// Index proposals from detected signals.
    Architect,
    /// Index health and maintenance planning.
    Gardener,
    /// Partitioning advisory for large tables.
    Partitioner,
    /// All five agents in fixed order, as one job.
    All,
}

impl AgentKind {
    /// Pipeline execution order for `All`.
    pub const PIPELINE: [AgentKind; 5] = [
        AgentKind::Explorer,
        AgentKind::Observer,
        AgentKind::Architect,
        AgentKind::Gardener,
        AgentKind::Partitioner,
    ];

    /// Number of steps a job of this kind reports against.
    pub fn total_steps(&self) -> u32 {
        match self {
            AgentKind::All => Self::PIPELINE.len() as u32,
            _ => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explorer => "explorer",
            Self::Observer => "observer",
            Self::Architect => "architect",
            Self::Gardener => "gardener",
            Self::Partitioner => "partitioner",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explorer" => Ok(Self::Explorer),
            "observer" => Ok(Self::Observer),
            "architect" => Ok(Self::Architect),
            "gardener" => Ok(Self::Gardener),
            "partitioner" => Ok(Self::Partitioner),
            "all" => Ok(Self::All),
            _ => Err(format!("Unknown agent: {}", s)),
        }
    }
}

/// How much latitude the system has against a database.
///
/// Carried into agent reports so the dashboard can show what would have
/// been auto-applied; executing proposals is outside this service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Analyze only, propose nothing for execution.
    Observation,
    /// Propose, every action requires manual approval.
    #[default]
    Assisted,
    /// Low-risk actions may be auto-applied.
    Trust,
    /// Any valid action may be auto-applied.
    Autonomous,
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Observation => "observation",
            Self::Assisted => "assisted",
            Self::Trust => "trust",
            Self::Autonomous => "autonomous",
        };
        write!(f, "{s}")
    }
}

/// Everything an agent run gets to see.
///
/// The cancellation token is the job's token: long-running agents are
/// expected to check it at safe points and bail with
/// [`AgentError::Cancelled`].
#[derive(Clone)]
pub struct AgentContext {
    /// Id of the target database in the catalog.
    pub database_id: i64,
    /// Read-only handle to the target database.
    pub db: TargetDb,
    /// Autonomy level configured for this database.
    pub autonomy: AutonomyLevel,
    /// LLM provider, if one is configured.
    pub llm: Option<Arc<dyn LlmProvider>>,
    /// The owning job's cancellation token.
    pub cancel: CancellationToken,
}

impl AgentContext {
    /// Bail out with [`AgentError::Cancelled`] if the job was cancelled.
    /// Agents call this between expensive phases.
    pub fn checkpoint(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Contract every analysis agent implements.
///
/// A run either produces a JSON report or fails with a typed error; the
/// orchestrator converts the outcome into job state and never looks
/// inside the report.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Which analysis this agent performs.
    fn kind(&self) -> AgentKind;

    /// Run the analysis against the context's target database.
    async fn run(&self, ctx: &AgentContext) -> Result<serde_json::Value, AgentError>;
}

/// Maps an [`AgentKind`] to its implementation.
///
/// The orchestrator resolves agents only through the registry, so tests
/// can substitute stubs.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn AnalysisAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the five production agents.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExplorerAgent::new()));
        registry.register(Arc::new(ObserverAgent::new()));
        registry.register(Arc::new(ArchitectAgent::new()));
        registry.register(Arc::new(GardenerAgent::new()));
        registry.register(Arc::new(PartitionerAgent::new()));
        registry
    }

    /// Register an agent under its own kind, replacing any previous one.
    pub fn register(&mut self, agent: Arc<dyn AnalysisAgent>) {
        self.agents.insert(agent.kind(), agent);
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AnalysisAgent>> {
        self.agents.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
