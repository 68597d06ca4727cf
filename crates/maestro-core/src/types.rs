use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{RunLimits, WorkflowConfig};
use crate::traits::MemoryWriter;

/// Reserved name of the fixed entry-point agent.
pub const ORCHESTRATOR: &str = "orchestrator";

/// Reserved routing marker that ends a workflow.
///
/// An orchestrator ends the run by requesting no next agent (or this marker);
/// a worker must use this marker explicitly, since an empty `next` from a
/// worker means "return to the orchestrator".
pub const END: &str = "end";

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input handed to an agent for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    /// The original task text driving the run.
    pub task: String,
    /// Message carried over from the previous hop, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload adopted from the previous hop's output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AgentInput {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: None,
            payload: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Output returned by an agent for one attempt.
///
/// Wire shape: `{ok, message, payload?, next?, cost?}`. Business failures are
/// signalled with `ok = false`; the engine treats them like `Err` returns for
/// retry purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Whether the attempt succeeded.
    pub ok: bool,
    /// Human-readable result (or failure) message.
    pub message: String,
    /// Structured result data, shallow-merged into the agent's write
    /// namespace on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
    /// Requested next agent. Only honored for orchestrator outputs; see
    /// [`END`] for the termination marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Cost incurred by this attempt, in whatever unit the deployment
    /// meters (tokens, dollars, credits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl AgentOutput {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            payload: None,
            next: None,
            cost: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            payload: None,
            next: None,
            cost: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Map<String, serde_json::Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Terminal status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The workflow completed.
    Ok,
    /// A ceiling or guardrail halted the run. An expected operating
    /// boundary, not a bug.
    Stopped,
    /// An agent exhausted its retries with no fallback, or the engine hit a
    /// fatal condition (unknown agent, disallowed route).
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Final outcome of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub task_id: TaskId,
    /// Original run this result replays, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_of: Option<TaskId>,
    pub status: RunStatus,
    /// Why the run stopped or errored. `None` for `ok`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The task text the run was started with.
    pub input: String,
    /// The final agent message, when the run completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Cumulative cost across all attempts of all agents.
    pub total_cost: f64,
}

/// Full contents of a memory store: namespace -> key -> value.
///
/// BTreeMaps keep snapshot serialization and iteration deterministic, which
/// replay comparisons rely on.
pub type MemorySnapshot = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Read-only, flattened view over the namespaces an agent may read.
///
/// Keys are `"namespace.key"`; an agent cannot discover namespaces it was
/// not granted.
#[derive(Debug, Clone, Default)]
pub struct MemoryView {
    entries: BTreeMap<String, serde_json::Value>,
}

impl MemoryView {
    pub fn new(entries: BTreeMap<String, serde_json::Value>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a value by flattened key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The underlying flattened map.
    pub fn entries(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.entries
    }
}

/// Context passed to agents during invocation.
#[derive(Clone)]
pub struct AgentContext {
    pub task_id: TaskId,
    /// Name the agent is running under in this workflow.
    pub agent: String,
    /// Filtered view over the agent's `read_from` namespaces.
    pub memory: MemoryView,
    /// Write handle bound to the agent's `write_to` namespace, if granted.
    pub writer: Option<Arc<dyn MemoryWriter>>,
    /// The workflow configuration the run executes against (read-only).
    pub config: Arc<WorkflowConfig>,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("task_id", &self.task_id)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

/// Kind of a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEntryKind {
    /// A regular agent attempt, successful or not.
    Attempt,
    /// A per-attempt guardrail breach. Always followed by run termination.
    GuardrailViolation,
}

/// One recorded agent attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub kind: TraceEntryKind,
    pub agent: String,
    /// How many times this agent had been entered when the attempt ran
    /// (1-based).
    pub loop_index: u32,
    /// Attempt number within the step's retry loop (1-based).
    pub attempt: u32,
    pub input: AgentInput,
    pub output: AgentOutput,
}

/// Complete record of one run, sufficient to replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEnvelope {
    pub task_id: TaskId,
    /// Original run this envelope replays, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_of: Option<TaskId>,
    /// The task text the run started from.
    pub task: String,
    /// Ceilings that were in force.
    pub limits: RunLimits,
    /// Namespaces present in the store when the run began.
    pub initial_namespaces: Vec<String>,
    /// Snapshot of the workflow configuration the run executed against.
    pub config: WorkflowConfig,
    /// Memory contents when the run began.
    pub initial_memory: MemorySnapshot,
    pub entries: Vec<TraceEntry>,
    pub status: RunStatus,
    /// Reason for a stopped or errored terminal. `None` for `ok`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}
