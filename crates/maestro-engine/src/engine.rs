use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use maestro_core::config::{AgentDeclaration, AgentKind, WorkflowConfig};
use maestro_core::error::{MaestroError, Result};
use maestro_core::traits::{MemoryWriter, TraceSink};
use maestro_core::types::{
    AgentContext, AgentInput, AgentOutput, MemorySnapshot, RunResult, RunStatus, TaskId,
    TraceEnvelope, END, ORCHESTRATOR,
};
use maestro_memory::{NamespaceWriter, SharedMemory};

use crate::policy::PolicyEnforcer;
use crate::registry::AgentRegistry;
use crate::trace::TraceRecorder;

/// Where the run loop stands after a step.
enum EngineState {
    /// Hand the input to the named agent next.
    Running { agent: String, input: AgentInput },
    /// The workflow completed; `message` is the final result.
    Done { message: String },
    /// A ceiling or guardrail halted the run.
    Stopped { reason: String },
    /// A fatal condition ended the run.
    Errored { reason: String },
}

/// Mutable state of one run in flight.
struct RunFrame {
    task_id: TaskId,
    task: String,
    config: Arc<WorkflowConfig>,
    memory: SharedMemory,
    policy: PolicyEnforcer,
    trace: TraceRecorder,
}

/// Drives a workflow: hands inputs to agents, enforces policies, records the
/// trace, and resolves routing between hops.
///
/// Every run starts at the orchestrator and terminates with one of three
/// statuses (`ok`, `stopped`, `error`); no failure escapes a run unhandled.
pub struct ExecutionEngine {
    config: Arc<WorkflowConfig>,
    registry: Arc<AgentRegistry>,
    sink: Option<Arc<dyn TraceSink>>,
}

impl ExecutionEngine {
    /// Build an engine over a workflow and its agent implementations.
    ///
    /// The config's naming invariants are checked here so no run can start
    /// against a malformed workflow. Registry completeness is not checked:
    /// an unregistered agent surfaces as an `error` run when first reached.
    pub fn new(config: WorkflowConfig, registry: AgentRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            sink: None,
        })
    }

    /// Attach a trace sink. Delivery is best effort and never changes a
    /// run's outcome.
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run a task through the workflow.
    pub async fn run(&self, task: impl Into<String>) -> RunResult {
        let (result, _) = self.run_traced(task).await;
        result
    }

    /// Run a task and also return the full trace envelope.
    pub async fn run_traced(&self, task: impl Into<String>) -> (RunResult, TraceEnvelope) {
        self.execute(Arc::clone(&self.config), task.into(), None, None)
            .await
    }

    /// Run a task under a different config (ceilings, routes, seeds) with the
    /// same registered agents.
    pub async fn run_with_config(
        &self,
        config: WorkflowConfig,
        task: impl Into<String>,
    ) -> Result<(RunResult, TraceEnvelope)> {
        config.validate()?;
        Ok(self.execute(Arc::new(config), task.into(), None, None).await)
    }

    /// Re-run a recorded task. The task text and initial memory come from
    /// the envelope; the config to run under is an explicit parameter, so a
    /// replay can probe how the same task behaves under adjusted policies.
    ///
    /// The replay gets a fresh task id and is tagged with the original's.
    pub async fn replay(
        &self,
        envelope: &TraceEnvelope,
        config: WorkflowConfig,
    ) -> Result<(RunResult, TraceEnvelope)> {
        config.validate()?;
        Ok(self
            .execute(
                Arc::new(config),
                envelope.task.clone(),
                Some(envelope.task_id.clone()),
                Some(envelope.initial_memory.clone()),
            )
            .await)
    }

    async fn execute(
        &self,
        config: Arc<WorkflowConfig>,
        task: String,
        replay_of: Option<TaskId>,
        seed_override: Option<MemorySnapshot>,
    ) -> (RunResult, TraceEnvelope) {
        let task_id = TaskId::new();
        info!(
            task_id = %task_id,
            replay = replay_of.is_some(),
            "Run started"
        );

        let initial_memory = seed_override.unwrap_or_else(|| config.memory.clone());
        let mut frame = RunFrame {
            task_id: task_id.clone(),
            task: task.clone(),
            config: Arc::clone(&config),
            memory: maestro_memory::shared(initial_memory.clone()),
            policy: PolicyEnforcer::new(config.limits.clone()),
            trace: TraceRecorder::new(
                task_id,
                replay_of.clone(),
                &task,
                &config,
                initial_memory,
            ),
        };

        let mut state = EngineState::Running {
            agent: ORCHESTRATOR.to_string(),
            input: AgentInput::new(&task),
        };

        let (status, reason, output) = loop {
            state = match state {
                EngineState::Running { agent, input } => {
                    self.step(&mut frame, agent, input).await
                }
                EngineState::Done { message } => break (RunStatus::Ok, None, Some(message)),
                EngineState::Stopped { reason } => break (RunStatus::Stopped, Some(reason), None),
                EngineState::Errored { reason } => break (RunStatus::Error, Some(reason), None),
            };
        };

        let RunFrame {
            task_id,
            task,
            policy,
            trace,
            ..
        } = frame;

        let envelope = trace.finalize(status, reason.clone());
        let result = RunResult {
            task_id,
            replay_of,
            status,
            reason,
            input: task,
            output,
            total_cost: policy.total_cost(),
        };

        match status {
            RunStatus::Ok => info!(
                task_id = %result.task_id,
                cost = result.total_cost,
                "Run finished"
            ),
            RunStatus::Stopped => warn!(
                task_id = %result.task_id,
                reason = result.reason.as_deref().unwrap_or(""),
                "Run stopped by policy"
            ),
            RunStatus::Error => error!(
                task_id = %result.task_id,
                reason = result.reason.as_deref().unwrap_or(""),
                "Run failed"
            ),
        }

        self.deliver_trace(&envelope).await;
        (result, envelope)
    }

    /// Execute one step: resolve the agent, enforce policies, run the retry
    /// loop, and decide where control goes next.
    async fn step(
        &self,
        frame: &mut RunFrame,
        agent_name: String,
        input: AgentInput,
    ) -> EngineState {
        // Resolve declaration and implementation. A name with neither is a
        // wiring mistake, not a policy stop.
        let decl = match frame.config.agent(&agent_name) {
            Some(decl) => decl.clone(),
            None => {
                return EngineState::Errored {
                    reason: MaestroError::AgentNotFound(agent_name).to_string(),
                }
            }
        };
        let agent_impl = match self.registry.resolve(&agent_name) {
            Some(agent) => agent,
            None => {
                return EngineState::Errored {
                    reason: MaestroError::AgentNotFound(agent_name).to_string(),
                }
            }
        };

        // Loop budget: count this entry before running it.
        let max_loops = frame.config.effective_max_loops(&decl);
        if let Some(breach) = frame.policy.enter_loop(&agent_name, max_loops) {
            return EngineState::Stopped {
                reason: breach.to_string(),
            };
        }
        let loop_index = frame.policy.loop_count(&agent_name);

        // Run-wide ceilings before any attempt.
        if let Some(breach) = frame.policy.check_ceilings() {
            return EngineState::Stopped {
                reason: breach.to_string(),
            };
        }

        info!(
            agent = %agent_name,
            loop_index,
            "Executing agent"
        );

        let ctx = match self.agent_context(frame, &decl) {
            Ok(ctx) => ctx,
            Err(e) => {
                return EngineState::Errored {
                    reason: e.to_string(),
                }
            }
        };

        let retries = decl.policy.retries.clone();
        let guardrail = decl.policy.guardrails.max_cost_per_invocation;
        let mut last_failure = String::new();

        for attempt in 1..=retries.count {
            if attempt > 1 && retries.backoff_ms > 0 {
                sleep(Duration::from_millis(retries.backoff_ms)).await;
            }

            let outcome = agent_impl.invoke(input.clone(), ctx.clone()).await;

            // An Err return and `ok: false` are the same failure, shaped
            // differently. Err carries no cost.
            let output = match outcome {
                Ok(output) => output,
                Err(e) => AgentOutput::failure(e.to_string()),
            };

            let attempt_cost = output.cost.unwrap_or(0.0);
            frame.policy.charge(attempt_cost);
            frame
                .trace
                .record_attempt(&agent_name, loop_index, attempt, &input, &output);

            // Per-attempt guardrail: breach ends the run immediately, no
            // retries, no fallback.
            if let Some(breach) =
                frame
                    .policy
                    .check_guardrail(&agent_name, attempt_cost, guardrail)
            {
                let reason = breach.to_string();
                warn!(agent = %agent_name, attempt, cost = attempt_cost, "Guardrail violation");
                frame
                    .trace
                    .record_guardrail(&agent_name, loop_index, attempt, &input, &reason);
                return EngineState::Stopped { reason };
            }

            // Re-check run ceilings with this attempt's cost counted.
            if let Some(breach) = frame.policy.check_ceilings() {
                return EngineState::Stopped {
                    reason: breach.to_string(),
                };
            }

            if output.ok {
                return self.advance(frame, &decl, input, output);
            }

            last_failure = output.message.clone();
            debug!(
                agent = %agent_name,
                attempt,
                total = retries.count,
                "Attempt failed"
            );
        }

        // Retries exhausted. A fallback substitutes another agent for this
        // hop and is exempt from the routing whitelist.
        if let Some(fallback) = &decl.policy.fallback {
            warn!(
                agent = %agent_name,
                fallback = %fallback,
                "Retries exhausted, invoking fallback"
            );
            return EngineState::Running {
                agent: fallback.clone(),
                input,
            };
        }

        EngineState::Errored {
            reason: MaestroError::AgentFailed {
                agent: agent_name,
                attempts: retries.count,
                message: last_failure,
            }
            .to_string(),
        }
    }

    /// Build the context an agent sees: the filtered memory view, a write
    /// handle when its policy grants one, and the workflow config.
    fn agent_context(&self, frame: &RunFrame, decl: &AgentDeclaration) -> Result<AgentContext> {
        let view = {
            let store = frame
                .memory
                .lock()
                .map_err(|e| MaestroError::Memory(e.to_string()))?;
            store.view(&decl.policy.memory.read_from)
        };

        let writer = decl.policy.memory.write_to.as_ref().map(|namespace| {
            Arc::new(NamespaceWriter::new(
                Arc::clone(&frame.memory),
                namespace.clone(),
            )) as Arc<dyn MemoryWriter>
        });

        Ok(AgentContext {
            task_id: frame.task_id.clone(),
            agent: decl.name.clone(),
            memory: view,
            writer,
            config: Arc::clone(&frame.config),
        })
    }

    /// Handle a successful attempt: merge its payload into memory, then
    /// resolve the next hop.
    fn advance(
        &self,
        frame: &RunFrame,
        decl: &AgentDeclaration,
        input: AgentInput,
        output: AgentOutput,
    ) -> EngineState {
        if let (Some(namespace), Some(payload)) = (&decl.policy.memory.write_to, &output.payload) {
            let mut store = match frame.memory.lock() {
                Ok(store) => store,
                Err(e) => {
                    return EngineState::Errored {
                        reason: MaestroError::Memory(e.to_string()).to_string(),
                    }
                }
            };
            store.merge_payload(namespace, payload);
        }

        match decl.kind {
            AgentKind::Orchestrator => self.hop_from_orchestrator(frame, input, output),
            AgentKind::Worker => self.hop_from_worker(frame, decl, output),
        }
    }

    /// Orchestrator routing: no `next` ends the run, a whitelisted `next`
    /// hands off, anything else is a route violation.
    fn hop_from_orchestrator(
        &self,
        frame: &RunFrame,
        input: AgentInput,
        output: AgentOutput,
    ) -> EngineState {
        let next = output.next.as_deref().unwrap_or(END);
        if next.is_empty() || next == END {
            return EngineState::Done {
                message: output.message,
            };
        }

        let allowed = frame.config.routes_for(ORCHESTRATOR);
        if !allowed.iter().any(|target| target == next) {
            return EngineState::Errored {
                reason: MaestroError::RouteViolation {
                    from: ORCHESTRATOR.to_string(),
                    to: next.to_string(),
                }
                .to_string(),
            };
        }

        debug!(next = %next, "Orchestrator routed");

        // The next hop keeps the original task and adopts the orchestrator's
        // message and payload as its working input.
        let mut next_input = AgentInput::new(input.task).with_message(output.message);
        if let Some(payload) = output.payload {
            next_input = next_input.with_payload(payload);
        }
        EngineState::Running {
            agent: next.to_string(),
            input: next_input,
        }
    }

    /// Worker completion: control defaults back to the orchestrator. An
    /// explicit [`END`] ends the run; any other `next` request is ignored,
    /// since only the orchestrator picks routing targets.
    fn hop_from_worker(
        &self,
        frame: &RunFrame,
        decl: &AgentDeclaration,
        output: AgentOutput,
    ) -> EngineState {
        match output.next.as_deref() {
            Some(END) => {
                return EngineState::Done {
                    message: output.message,
                }
            }
            Some(other) if !other.is_empty() => {
                warn!(
                    agent = %decl.name,
                    requested = %other,
                    "Ignoring next-hop request from worker"
                );
            }
            _ => {}
        }

        let orch = match frame.config.agent(ORCHESTRATOR) {
            Some(orch) => orch,
            // Unreachable on a validated config.
            None => {
                return EngineState::Errored {
                    reason: MaestroError::AgentNotFound(ORCHESTRATOR.to_string()).to_string(),
                }
            }
        };

        // Without budget for another orchestrator pass, the worker's message
        // is the run's result.
        let max_loops = frame.config.effective_max_loops(orch);
        if !frame.policy.has_loop_budget(ORCHESTRATOR, max_loops) {
            debug!(agent = %decl.name, "Orchestrator budget exhausted, ending with worker result");
            return EngineState::Done {
                message: output.message,
            };
        }

        let synthesized = AgentInput::new(&frame.task).with_message(output.message);
        EngineState::Running {
            agent: ORCHESTRATOR.to_string(),
            input: synthesized,
        }
    }

    async fn deliver_trace(&self, envelope: &TraceEnvelope) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.deliver(envelope).await {
                warn!(error = %e, "Trace sink delivery failed");
            }
        }
    }
}
