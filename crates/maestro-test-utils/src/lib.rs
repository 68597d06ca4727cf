//! Test doubles and fixtures shared by Maestro crates.
//!
//! The agents here are deterministic stand-ins for real implementations:
//! fixed outputs, scripted sequences, failure modes, and recorders that
//! capture what the engine handed them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use maestro_core::error::{MaestroError, Result};
use maestro_core::traits::{Agent, TraceSink};
use maestro_core::types::{AgentContext, AgentInput, AgentOutput, MemoryView, TraceEnvelope};

/// Initialize test logging once. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Build an output payload from key/value pairs.
pub fn payload(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Agent that returns the same output on every call and counts invocations.
pub struct StaticAgent {
    output: AgentOutput,
    calls: AtomicU32,
}

impl StaticAgent {
    pub fn ok(output: AgentOutput) -> Self {
        Self {
            output,
            calls: AtomicU32::new(0),
        }
    }

    /// An agent that always fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::ok(AgentOutput::failure(message))
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for StaticAgent {
    fn invoke(&self, _input: AgentInput, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        })
    }
}

/// Agent that plays a fixed sequence of outputs, one per call.
///
/// Calls past the end of the script fail, which makes an over-long run show
/// up as a test failure instead of hanging.
pub struct ScriptedAgent {
    script: Mutex<VecDeque<AgentOutput>>,
    calls: AtomicU32,
}

impl ScriptedAgent {
    pub fn new(outputs: Vec<AgentOutput>) -> Self {
        Self {
            script: Mutex::new(outputs.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, _input: AgentInput, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| AgentOutput::failure("script exhausted")))
        })
    }
}

/// Agent that records every `(input, memory view)` pair it was invoked with.
pub struct RecordingAgent {
    output: AgentOutput,
    seen: Mutex<Vec<(AgentInput, MemoryView)>>,
}

impl RecordingAgent {
    pub fn new(output: AgentOutput) -> Self {
        Self {
            output,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<(AgentInput, MemoryView)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Agent for RecordingAgent {
    fn invoke(&self, input: AgentInput, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push((input, ctx.memory.clone()));
            Ok(self.output.clone())
        })
    }
}

/// Agent that writes fixed entries through its context writer, then returns
/// the given output. Fails if the engine granted no write handle.
pub struct WriterAgent {
    entries: Vec<(String, serde_json::Value)>,
    output: AgentOutput,
}

impl WriterAgent {
    pub fn new(entries: Vec<(String, serde_json::Value)>, output: AgentOutput) -> Self {
        Self { entries, output }
    }
}

impl Agent for WriterAgent {
    fn invoke(&self, _input: AgentInput, ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let Some(writer) = ctx.writer.as_ref() else {
                return Ok(AgentOutput::failure("no write access"));
            };
            for (key, value) in &self.entries {
                writer.put(key, value.clone())?;
            }
            Ok(self.output.clone())
        })
    }
}

/// Agent that sleeps before answering, for duration-ceiling tests.
pub struct SlowAgent {
    delay_ms: u64,
    output: AgentOutput,
}

impl SlowAgent {
    pub fn new(delay_ms: u64, output: AgentOutput) -> Self {
        Self { delay_ms, output }
    }
}

impl Agent for SlowAgent {
    fn invoke(&self, _input: AgentInput, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
            Ok(self.output.clone())
        })
    }
}

/// Agent that returns `Err` instead of an `ok: false` output.
pub struct ErrAgent {
    message: String,
    calls: AtomicU32,
}

impl ErrAgent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for ErrAgent {
    fn invoke(&self, _input: AgentInput, _ctx: AgentContext) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MaestroError::AgentExecution(self.message.clone()))
        })
    }
}

/// Trace sink that captures delivered envelopes, or fails on demand.
pub struct RecordingSink {
    envelopes: Mutex<Vec<TraceEnvelope>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A sink whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn envelopes(&self) -> Vec<TraceEnvelope> {
        self.envelopes.lock().unwrap().clone()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for RecordingSink {
    fn deliver(&self, envelope: &TraceEnvelope) -> BoxFuture<'_, Result<()>> {
        let envelope = envelope.clone();
        Box::pin(async move {
            if self.fail {
                return Err(MaestroError::Sink("sink offline".into()));
            }
            self.envelopes.lock().unwrap().push(envelope);
            Ok(())
        })
    }
}
