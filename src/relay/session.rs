//! Per-connection orchestration.
//!
//! A `ConnectionSession` owns everything one client connection mutates: the
//! conversation id, the tool-call tracker, the streaming classifier and the
//! accumulated run state. One inbound message is fully drained (its entire
//! patch stream consumed and all resulting events sent) before the next is
//! read; the socket loop in `ws::handler` guarantees that by calling
//! `handle` sequentially.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::diagnostics::DiagnosticsSink;
use crate::engine::{AgentEngine, PatchBatch, PatchOp, PatchOpKind};
use crate::ws::{ClientMessage, EventPhase, ServerEvent, ToolMessageData};

use super::classifier::{StreamClassifier, StreamSignal, is_streamed_output_path};
use super::lifecycle::{ToolCallOutcome, ToolCallRecord, ToolCallTracker};
use super::{accumulator, graph};

pub struct ConnectionSession {
    engine: Arc<dyn AgentEngine>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    events: mpsc::Sender<ServerEvent>,
    conversation_id: String,
    tracker: ToolCallTracker,
    classifier: StreamClassifier,
    run_state: Value,
}

impl ConnectionSession {
    pub fn new(
        engine: Arc<dyn AgentEngine>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        events: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            engine,
            diagnostics,
            events,
            conversation_id: Uuid::new_v4().to_string(),
            tracker: ToolCallTracker::new(),
            classifier: StreamClassifier::new(),
            run_state: Value::Object(Map::new()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Process one inbound message to completion.
    pub async fn handle(&mut self, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::Resync { session_id } => self.resync(session_id).await,
            ClientMessage::Chat { message } => {
                let span = tracing::info_span!(
                    "process_message",
                    conversation_id = %self.conversation_id
                );
                self.process_turn(&message).instrument(span).await
            }
        }
    }

    /// Re-attach to a prior conversation. Unknown session ids produce no
    /// history event and are not an error.
    async fn resync(&mut self, session_id: Option<String>) -> Result<()> {
        let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
            return Ok(());
        };
        self.conversation_id = session_id;

        if let Some(history) = self
            .engine
            .fetch_state(&self.conversation_id)
            .await
            .context("fetching conversation history")?
        {
            self.send(ServerEvent::History { history }).await?;
        }
        Ok(())
    }

    /// Drive one chat turn: stream the engine's patch log, classify every
    /// operation, emit events, then the terminal end-of-turn marker.
    async fn process_turn(&mut self, message: &str) -> Result<()> {
        self.run_state = Value::Object(Map::new());

        let mut stream = self
            .engine
            .stream_patch_log(&self.conversation_id, message)
            .await
            .context("starting patch-log stream")?;

        let mut turn_batches: Vec<PatchBatch> = Vec::new();
        while let Some(batch) = stream.next().await {
            let batch = batch?;
            self.run_state = accumulator::apply(&self.run_state, &batch.ops);
            debug!("Applied patch batch with {} op(s)", batch.ops.len());

            for op in &batch.ops {
                self.process_op(op).await?;
            }
            turn_batches.push(batch);
        }

        self.send(ServerEvent::AiMessage {
            data: String::new(),
            state: EventPhase::Finished,
        })
        .await?;

        self.diagnostics
            .record_turn(&self.conversation_id, &turn_batches, &self.run_state)
            .await;
        Ok(())
    }

    async fn process_op(&mut self, op: &PatchOp) -> Result<()> {
        if op.kind != PatchOpKind::Add {
            return Ok(());
        }

        if is_streamed_output_path(&op.path) {
            match self.classifier.classify(&op.value) {
                StreamSignal::Started { id, name } => {
                    self.send(ServerEvent::ToolMessage {
                        data: ToolMessageData {
                            tool_call_id: id,
                            name: Some(name),
                            args: None,
                            partial_json: Some(String::new()),
                            output: None,
                        },
                        state: EventPhase::Streaming,
                    })
                    .await?;
                    return Ok(());
                }
                StreamSignal::Fragment { id, fragment } => {
                    self.send(ServerEvent::ToolMessage {
                        data: ToolMessageData {
                            tool_call_id: id,
                            name: None,
                            args: None,
                            partial_json: Some(fragment),
                            output: None,
                        },
                        state: EventPhase::Streaming,
                    })
                    .await?;
                    return Ok(());
                }
                StreamSignal::Ended => return Ok(()),
                StreamSignal::Text(text) => match graph::detect(&text) {
                    Some(payload) => {
                        self.send(ServerEvent::GraphMessage {
                            data: payload,
                            tool_call_id: None,
                            name: None,
                            state: EventPhase::Running,
                        })
                        .await?;
                    }
                    None => {
                        self.send(ServerEvent::AiMessage {
                            data: text,
                            state: EventPhase::Running,
                        })
                        .await?;
                    }
                },
                StreamSignal::Ignored => {}
            }
        }

        // Tool-call lifecycle extraction runs independently of the streaming
        // path shape.
        match &op.value {
            Value::Array(items) => {
                for item in items {
                    if item.is_object()
                        && let Some(record) = self.tracker.observe_invocation(item, None)
                    {
                        self.emit_tool_record(record).await?;
                    }
                }
            }
            Value::Object(_) => {
                if let Some(record) = self.tracker.observe_invocation(&op.value, Some(&op.value)) {
                    self.emit_tool_record(record).await?;
                }
            }
            _ => {}
        }

        if op.value.is_object()
            && let Some(record) = self.tracker.observe_result(&op.value)
        {
            self.emit_tool_record(record).await?;
        }

        Ok(())
    }

    async fn emit_tool_record(&mut self, record: ToolCallRecord) -> Result<()> {
        let ToolCallRecord { id, name, outcome } = record;
        let event = match outcome {
            ToolCallOutcome::Started => ServerEvent::ToolMessage {
                data: ToolMessageData {
                    tool_call_id: id,
                    name: Some(name),
                    args: Some(Value::Object(Map::new())),
                    partial_json: None,
                    output: None,
                },
                state: EventPhase::Running,
            },
            ToolCallOutcome::Finished { output } => match graph::detect(&output) {
                Some(payload) => ServerEvent::GraphMessage {
                    data: payload,
                    tool_call_id: Some(id),
                    name: Some(name),
                    state: EventPhase::Finished,
                },
                None => ServerEvent::ToolMessage {
                    data: ToolMessageData {
                        tool_call_id: id,
                        name: Some(name),
                        args: None,
                        partial_json: None,
                        output: Some(output),
                    },
                    state: EventPhase::Finished,
                },
            },
            ToolCallOutcome::Failed { error } => ServerEvent::ToolMessage {
                data: ToolMessageData {
                    tool_call_id: id,
                    name: Some(name),
                    args: None,
                    partial_json: None,
                    output: Some(error),
                },
                state: EventPhase::Error,
            },
        };
        self.send(event).await
    }

    async fn send(&self, event: ServerEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("client connection closed"))
    }
}
