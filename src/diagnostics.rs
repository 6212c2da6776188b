//! Diagnostics side-channel.
//!
//! After each processed turn the session hands its patch batches and the
//! accumulated run state to a sink. Writes are strictly best-effort: a
//! failing sink is logged and never fails the turn. The port exists so the
//! relay core stays testable without filesystem access.

use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::engine::PatchBatch;

/// Sink for per-turn diagnostic snapshots.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    /// Record one completed turn: the raw patch batches and the run state
    /// they accumulated into.
    async fn record_turn(&self, conversation_id: &str, batches: &[PatchBatch], run_state: &Value);
}

/// File-backed sink: appends a JSON line per turn to `patch_log.jsonl` and
/// rewrites `latest_run_state.json`.
pub struct FileDiagnostics {
    dir: PathBuf,
}

impl FileDiagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn append_patch_log(
        &self,
        conversation_id: &str,
        batches: &[PatchBatch],
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let record = json!({
            "ts": Utc::now().to_rfc3339(),
            "conversation_id": conversation_id,
            "batches": batches,
        });
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("patch_log.jsonl"))
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn write_run_state(&self, run_state: &Value) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_string_pretty(run_state)?;
        tokio::fs::write(self.dir.join("latest_run_state.json"), body).await?;
        Ok(())
    }
}

#[async_trait]
impl DiagnosticsSink for FileDiagnostics {
    async fn record_turn(&self, conversation_id: &str, batches: &[PatchBatch], run_state: &Value) {
        if let Err(e) = self.append_patch_log(conversation_id, batches).await {
            warn!("Failed to append patch log: {e:?}");
        }
        if let Err(e) = self.write_run_state(run_state).await {
            warn!("Failed to write run-state dump: {e:?}");
        }
    }
}

/// Sink that drops everything.
pub struct NullDiagnostics;

#[async_trait]
impl DiagnosticsSink for NullDiagnostics {
    async fn record_turn(
        &self,
        _conversation_id: &str,
        _batches: &[PatchBatch],
        _run_state: &Value,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PatchOp;

    #[tokio::test]
    async fn test_file_sink_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileDiagnostics::new(dir.path());

        let batches = vec![PatchBatch::new(vec![PatchOp::add(
            "/logs/agent",
            json!({"x": 1}),
        )])];
        let run_state = json!({"logs": {"agent": {"x": 1}}});

        sink.record_turn("conv-1", &batches, &run_state).await;
        sink.record_turn("conv-1", &batches, &run_state).await;

        let log = std::fs::read_to_string(dir.path().join("patch_log.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 2);
        let first: Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(first["conversation_id"], "conv-1");
        assert_eq!(first["batches"][0]["ops"][0]["op"], "add");

        let dumped: Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("latest_run_state.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(dumped, run_state);
    }

    #[tokio::test]
    async fn test_file_sink_failure_is_swallowed() {
        // A path that cannot be a directory: regular file in the way.
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = FileDiagnostics::new(file.path());
        // Must not panic or error out.
        sink.record_turn("conv-1", &[], &json!({})).await;
    }
}
