//! Maestro is a workflow execution engine for agent graphs with a fixed
//! entry point: an orchestrator decides what happens next, workers do
//! bounded work and hand control back.
//!
//! A workflow is described by a [`WorkflowConfig`] (agents, routing
//! whitelist, ceilings, seeded memory) and executed by an
//! [`ExecutionEngine`] against an [`AgentRegistry`] of implementations.
//! Every run terminates with one of three statuses: `ok`, `stopped` (a
//! ceiling or guardrail fired), or `error`. The full history of a run is
//! captured in a [`TraceEnvelope`], which is enough to replay it later,
//! optionally under a different config.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::future::BoxFuture;
//! use maestro::{
//!     Agent, AgentContext, AgentDeclaration, AgentInput, AgentOutput, AgentRegistry,
//!     ExecutionEngine, Result, WorkflowConfig, ORCHESTRATOR,
//! };
//!
//! struct Greeter;
//!
//! impl Agent for Greeter {
//!     fn invoke(
//!         &self,
//!         input: AgentInput,
//!         _ctx: AgentContext,
//!     ) -> BoxFuture<'_, Result<AgentOutput>> {
//!         Box::pin(async move { Ok(AgentOutput::success(format!("hello, {}", input.task))) })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = WorkflowConfig::new(vec![AgentDeclaration::orchestrator()]);
//!     let mut registry = AgentRegistry::new();
//!     registry.register(ORCHESTRATOR, Arc::new(Greeter));
//!
//!     let engine = ExecutionEngine::new(config, registry)?;
//!     let result = engine.run("world").await;
//!     println!("{}: {:?}", result.status, result.output);
//!     Ok(())
//! }
//! ```

pub use maestro_core::{
    Agent, AgentContext, AgentDeclaration, AgentInput, AgentKind, AgentOutput, AgentPolicy,
    Guardrails, MaestroError, MemoryPolicy, MemorySnapshot, MemoryView, MemoryWriter, Result,
    RetryPolicy, RunLimits, RunResult, RunStatus, TaskId, TraceEntry, TraceEntryKind,
    TraceEnvelope, TraceSink, WorkflowConfig, END, ORCHESTRATOR,
};
pub use maestro_engine::{
    read_trace_file, AgentRegistry, Breach, ExecutionEngine, JsonlTraceSink, TRACE_FILE,
};
pub use maestro_memory::{MemoryStore, NamespaceWriter, SharedMemory};
