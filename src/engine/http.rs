//! HTTP/SSE implementation of the agent engine port.
//!
//! Speaks the upstream engine's streaming surface: `POST {base}/stream_log`
//! returns Server-Sent Events where each `data` event carries one patch
//! batch, `GET {base}/threads/{id}/state` returns persisted conversation
//! state, and `POST {base}/invoke` runs a message to completion.
//!
//! This client deliberately does not reconnect or retry; resilience policy
//! belongs to the engine deployment, not the relay.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{AgentEngine, PatchBatch, PatchLogStream};

/// Buffer between the SSE reader task and the session consuming the stream.
const PATCH_CHANNEL_SIZE: usize = 64;

/// HTTP client for the upstream agent engine.
pub struct HttpEngine {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn turn_body(conversation_id: &str, message: &str) -> Value {
        json!({
            "input": {"message": message},
            "config": {"configurable": {"thread_id": conversation_id}},
        })
    }
}

#[derive(Debug, Deserialize)]
struct ThreadState {
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    output: String,
}

#[async_trait]
impl AgentEngine for HttpEngine {
    async fn stream_patch_log(
        &self,
        conversation_id: &str,
        message: &str,
    ) -> Result<PatchLogStream> {
        let url = format!("{}/stream_log", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&Self::turn_body(conversation_id, message));

        let mut source =
            EventSource::new(request).context("connecting to agent engine patch-log stream")?;
        let (tx, rx) = mpsc::channel(PATCH_CHANNEL_SIZE);

        tokio::spawn(async move {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {
                        debug!("Patch-log stream opened");
                    }
                    Ok(Event::Message(message)) => {
                        if message.event == "end" {
                            break;
                        }
                        if message.event != "data" {
                            continue;
                        }
                        match serde_json::from_str::<PatchBatch>(&message.data) {
                            Ok(batch) => {
                                if tx.send(Ok(batch)).await.is_err() {
                                    // Consumer went away (client disconnect).
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Skipping malformed patch batch from engine: {e}");
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        let _ = tx
                            .send(Err(
                                anyhow::Error::new(e).context("agent engine stream failed")
                            ))
                            .await;
                        break;
                    }
                }
            }
            source.close();
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn fetch_state(&self, conversation_id: &str) -> Result<Option<Vec<Value>>> {
        let url = format!("{}/threads/{}/state", self.base_url, conversation_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("fetching conversation state")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("conversation state fetch failed: {}", response.status());
        }

        let state: ThreadState = response
            .json()
            .await
            .context("decoding conversation state")?;
        Ok(Some(state.messages))
    }

    async fn invoke(&self, conversation_id: &str, message: &str) -> Result<String> {
        let url = format!("{}/invoke", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&Self::turn_body(conversation_id, message))
            .send()
            .await
            .context("invoking agent engine")?;

        if !response.status().is_success() {
            bail!("agent invocation failed: {}", response.status());
        }

        let reply: InvokeResponse = response.json().await.context("decoding agent reply")?;
        Ok(reply.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_stripped() {
        let engine = HttpEngine::new("http://localhost:8001/");
        assert_eq!(engine.base_url, "http://localhost:8001");
    }

    #[test]
    fn test_turn_body_shape() {
        let body = HttpEngine::turn_body("conv-1", "hello");
        assert_eq!(body["input"]["message"], "hello");
        assert_eq!(body["config"]["configurable"]["thread_id"], "conv-1");
    }
}
