//! Agent engine port.
//!
//! This module defines the `AgentEngine` trait that abstracts the upstream
//! agent execution engine: a patch-log streaming call, a state-fetch call by
//! conversation id, and a one-shot invoke for the non-streaming chat
//! endpoint. The relay only ever talks to the engine through this trait, so
//! sessions can be tested against a stub and the HTTP implementation can be
//! swapped without touching the relay.

pub mod http;
mod types;

pub use http::HttpEngine;
pub use types::{PatchBatch, PatchOp, PatchOpKind};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::pin::Pin;
use tokio_stream::Stream;

/// Stream of patch batches for one turn.
pub type PatchLogStream = Pin<Box<dyn Stream<Item = Result<PatchBatch>> + Send>>;

/// Unified interface to the upstream agent execution engine.
///
/// Implementations must be safe for concurrent invocation by multiple
/// independent conversation ids; per-conversation isolation is the engine's
/// responsibility.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// Run one chat message under the given conversation id, yielding the
    /// engine's run-log as ordered batches of patch operations.
    async fn stream_patch_log(&self, conversation_id: &str, message: &str)
    -> Result<PatchLogStream>;

    /// Fetch the engine's persisted state for a conversation.
    ///
    /// Returns the prior message sequence, or `None` when the engine has no
    /// state for the id.
    async fn fetch_state(&self, conversation_id: &str) -> Result<Option<Vec<Value>>>;

    /// Run one chat message to completion without streaming and return the
    /// final assistant text.
    async fn invoke(&self, conversation_id: &str, message: &str) -> Result<String>;
}
