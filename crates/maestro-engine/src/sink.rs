use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use maestro_core::error::Result;
use maestro_core::traits::TraceSink;
use maestro_core::types::TraceEnvelope;

/// File name envelopes are appended to inside the sink directory.
pub const TRACE_FILE: &str = "traces.jsonl";

/// JSONL trace sink.
///
/// Appends one JSON object per finished run to `{dir}/traces.jsonl`. The
/// format is append-only and crash-resilient: even if the process dies
/// mid-write, all previously written lines are intact and parseable.
pub struct JsonlTraceSink {
    dir: PathBuf,
}

impl JsonlTraceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the trace file this sink appends to.
    pub fn path(&self) -> PathBuf {
        self.dir.join(TRACE_FILE)
    }
}

impl TraceSink for JsonlTraceSink {
    fn deliver(&self, envelope: &TraceEnvelope) -> BoxFuture<'_, Result<()>> {
        let serialized = serde_json::to_string(envelope);
        Box::pin(async move {
            let mut line = serialized?;
            line.push('\n');

            tokio::fs::create_dir_all(&self.dir).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path())
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;

            debug!(path = %self.path().display(), "Trace envelope appended");
            Ok(())
        })
    }
}

/// Read every envelope from a JSONL trace file, oldest first.
pub async fn read_trace_file(path: &Path) -> Result<Vec<TraceEnvelope>> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut envelopes = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        envelopes.push(serde_json::from_str(line)?);
    }
    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    use maestro_core::config::{AgentDeclaration, WorkflowConfig};
    use maestro_core::types::{RunStatus, TaskId};

    use crate::trace::TraceRecorder;

    fn envelope(id: &str, status: RunStatus) -> TraceEnvelope {
        let config = WorkflowConfig::new(vec![AgentDeclaration::orchestrator()]);
        TraceRecorder::new(
            TaskId::from_string(id),
            None,
            "trace me",
            &config,
            config.memory.clone(),
        )
        .finalize(status, None)
    }

    #[tokio::test]
    async fn test_deliver_appends_one_line_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTraceSink::new(dir.path());

        sink.deliver(&envelope("t-1", RunStatus::Ok)).await.unwrap();
        sink.deliver(&envelope("t-2", RunStatus::Stopped))
            .await
            .unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TraceEnvelope = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.task_id, TaskId::from_string("t-1"));
        assert_eq!(first.status, RunStatus::Ok);
    }

    #[tokio::test]
    async fn test_deliver_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("traces").join("today");
        let sink = JsonlTraceSink::new(&nested);

        sink.deliver(&envelope("t-1", RunStatus::Ok)).await.unwrap();
        assert!(sink.path().exists());
    }

    #[tokio::test]
    async fn test_read_trace_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTraceSink::new(dir.path());

        sink.deliver(&envelope("t-1", RunStatus::Ok)).await.unwrap();
        sink.deliver(&envelope("t-2", RunStatus::Error))
            .await
            .unwrap();

        let envelopes = read_trace_file(&sink.path()).await.unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[1].task_id, TaskId::from_string("t-2"));
        assert_eq!(envelopes[1].status, RunStatus::Error);
    }
}
