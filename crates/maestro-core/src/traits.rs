use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{AgentContext, AgentInput, AgentOutput, TraceEnvelope};

/// A unit of work in the workflow graph.
///
/// Implementations are registered by name and resolved when a workflow
/// declaration references them.
pub trait Agent: Send + Sync {
    /// Run one attempt against the given input.
    ///
    /// Failure is reported two equivalent ways: returning `Err`, or returning
    /// `Ok` with [`AgentOutput::ok`] set to `false`. The engine treats both
    /// identically when deciding on retries and fallback.
    fn invoke(&self, input: AgentInput, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>>;
}

/// Write access to a single memory namespace.
///
/// Declared here so agent contexts can carry a writer without depending on a
/// concrete store implementation.
pub trait MemoryWriter: Send + Sync {
    /// The namespace all writes land in.
    fn namespace(&self) -> &str;

    /// Store one key. A later write to the same key wins.
    fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Receives the trace envelope of a finished run.
///
/// Delivery is best effort: the engine logs and swallows sink errors so a
/// misbehaving sink can never change a run's outcome.
pub trait TraceSink: Send + Sync {
    fn deliver(&self, envelope: &TraceEnvelope) -> BoxFuture<'_, Result<()>>;
}
