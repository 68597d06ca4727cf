//! Workflow execution engine: the run loop, policy enforcement, trace
//! recording, and agent registry.

pub mod engine;
pub mod policy;
pub mod registry;
pub mod sink;
pub mod trace;

pub use engine::ExecutionEngine;
pub use policy::{Breach, PolicyEnforcer};
pub use registry::AgentRegistry;
pub use sink::{read_trace_file, JsonlTraceSink, TRACE_FILE};
pub use trace::TraceRecorder;
