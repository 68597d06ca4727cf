//! Core types, traits, and errors shared across the Maestro workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    AgentDeclaration, AgentKind, AgentPolicy, Guardrails, MemoryPolicy, RetryPolicy, RunLimits,
    WorkflowConfig,
};
pub use error::{MaestroError, Result};
pub use traits::{Agent, MemoryWriter, TraceSink};
pub use types::{
    AgentContext, AgentInput, AgentOutput, MemorySnapshot, MemoryView, RunResult, RunStatus,
    TaskId, TraceEntry, TraceEntryKind, TraceEnvelope, END, ORCHESTRATOR,
};
