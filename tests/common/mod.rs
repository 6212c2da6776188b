//! Test utilities and common setup.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use vizbridge::engine::{AgentEngine, PatchBatch, PatchLogStream};

/// Scripted engine stub: yields a fixed sequence of patch batches, serves
/// canned conversation history, and returns a fixed one-shot reply.
pub struct StubEngine {
    pub batches: Vec<PatchBatch>,
    pub history: HashMap<String, Vec<Value>>,
    pub reply: String,
    /// When set, the patch stream ends with this error after the batches.
    pub stream_error: Option<String>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
            history: HashMap::new(),
            reply: String::new(),
            stream_error: None,
        }
    }
}

impl StubEngine {
    pub fn with_batches(batches: Vec<PatchBatch>) -> Self {
        Self {
            batches,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AgentEngine for StubEngine {
    async fn stream_patch_log(
        &self,
        _conversation_id: &str,
        _message: &str,
    ) -> Result<PatchLogStream> {
        let mut items: Vec<Result<PatchBatch>> = self.batches.iter().cloned().map(Ok).collect();
        if let Some(ref message) = self.stream_error {
            items.push(Err(anyhow::anyhow!("{message}")));
        }
        Ok(Box::pin(tokio_stream::iter(items)))
    }

    async fn fetch_state(&self, conversation_id: &str) -> Result<Option<Vec<Value>>> {
        Ok(self.history.get(conversation_id).cloned())
    }

    async fn invoke(&self, _conversation_id: &str, _message: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}
