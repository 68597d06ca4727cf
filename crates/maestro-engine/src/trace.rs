use chrono::{DateTime, Utc};

use maestro_core::config::WorkflowConfig;
use maestro_core::types::{
    AgentInput, AgentOutput, MemorySnapshot, RunStatus, TaskId, TraceEntry, TraceEntryKind,
    TraceEnvelope,
};

/// Collects one entry per agent attempt during a run and seals them into a
/// [`TraceEnvelope`] when the run terminates.
pub struct TraceRecorder {
    task_id: TaskId,
    replay_of: Option<TaskId>,
    task: String,
    config: WorkflowConfig,
    initial_memory: MemorySnapshot,
    entries: Vec<TraceEntry>,
    started_at: DateTime<Utc>,
}

impl TraceRecorder {
    pub fn new(
        task_id: TaskId,
        replay_of: Option<TaskId>,
        task: impl Into<String>,
        config: &WorkflowConfig,
        initial_memory: MemorySnapshot,
    ) -> Self {
        Self {
            task_id,
            replay_of,
            task: task.into(),
            config: config.clone(),
            initial_memory,
            entries: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Record one agent attempt, successful or not.
    pub fn record_attempt(
        &mut self,
        agent: &str,
        loop_index: u32,
        attempt: u32,
        input: &AgentInput,
        output: &AgentOutput,
    ) {
        self.entries.push(TraceEntry {
            at: Utc::now(),
            kind: TraceEntryKind::Attempt,
            agent: agent.to_string(),
            loop_index,
            attempt,
            input: input.clone(),
            output: output.clone(),
        });
    }

    /// Record a guardrail breach as its own distinguished entry, alongside
    /// the attempt that caused it.
    pub fn record_guardrail(
        &mut self,
        agent: &str,
        loop_index: u32,
        attempt: u32,
        input: &AgentInput,
        reason: &str,
    ) {
        self.entries.push(TraceEntry {
            at: Utc::now(),
            kind: TraceEntryKind::GuardrailViolation,
            agent: agent.to_string(),
            loop_index,
            attempt,
            input: input.clone(),
            output: AgentOutput::failure(reason),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Seal the recorder into an envelope with the run's terminal status.
    pub fn finalize(self, status: RunStatus, error: Option<String>) -> TraceEnvelope {
        TraceEnvelope {
            task_id: self.task_id,
            replay_of: self.replay_of,
            task: self.task,
            limits: self.config.limits.clone(),
            initial_namespaces: self.initial_memory.keys().cloned().collect(),
            config: self.config,
            initial_memory: self.initial_memory,
            entries: self.entries,
            status,
            error,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use maestro_core::config::AgentDeclaration;

    fn recorder() -> TraceRecorder {
        let config = WorkflowConfig::new(vec![AgentDeclaration::orchestrator()])
            .with_seed("research", "topic", serde_json::json!("rust"));
        TraceRecorder::new(
            TaskId::from_string("t-1"),
            None,
            "summarize rust news",
            &config,
            config.memory.clone(),
        )
    }

    #[test]
    fn test_attempts_recorded_in_order() {
        let mut rec = recorder();
        let input = AgentInput::new("summarize rust news");

        rec.record_attempt("orchestrator", 1, 1, &input, &AgentOutput::failure("flaky"));
        rec.record_attempt("orchestrator", 1, 2, &input, &AgentOutput::success("done"));

        assert_eq!(rec.entries().len(), 2);
        assert_eq!(rec.entries()[0].attempt, 1);
        assert!(!rec.entries()[0].output.ok);
        assert_eq!(rec.entries()[1].attempt, 2);
        assert_eq!(rec.entries()[1].kind, TraceEntryKind::Attempt);
    }

    #[test]
    fn test_guardrail_entry_is_distinguished() {
        let mut rec = recorder();
        let input = AgentInput::new("summarize rust news");

        rec.record_guardrail("search", 1, 1, &input, "cost 5.0 over limit 2.0");

        let entry = &rec.entries()[0];
        assert_eq!(entry.kind, TraceEntryKind::GuardrailViolation);
        assert!(!entry.output.ok);
        assert!(entry.output.message.contains("over limit"));
    }

    #[test]
    fn test_finalize_seals_envelope() {
        let mut rec = recorder();
        rec.record_attempt(
            "orchestrator",
            1,
            1,
            &AgentInput::new("summarize rust news"),
            &AgentOutput::success("done"),
        );

        let envelope = rec.finalize(RunStatus::Stopped, Some("cost ceiling reached".into()));
        assert_eq!(envelope.task_id, TaskId::from_string("t-1"));
        assert!(envelope.replay_of.is_none());
        assert_eq!(envelope.task, "summarize rust news");
        assert_eq!(envelope.initial_namespaces, vec!["research".to_string()]);
        assert_eq!(envelope.initial_memory["research"]["topic"], "rust");
        assert_eq!(envelope.entries.len(), 1);
        assert_eq!(envelope.status, RunStatus::Stopped);
        assert!(envelope.error.as_ref().unwrap().contains("ceiling"));
        assert!(envelope.started_at <= envelope.ended_at);
    }
}
