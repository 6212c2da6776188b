//! WebSocket message types for the chat protocol.
//!
//! These types define the protocol between frontend and backend over one
//! WebSocket connection: inbound client messages and the outbound typed
//! event envelope `{"type": ..., "data": ..., "state"?: ...}`.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Messages (Client -> Server)
// ============================================================================

/// Inbound messages. A chat turn is the default shape when `type` is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Re-attach to a prior conversation.
    Resync { session_id: Option<String> },
    /// One chat turn.
    Chat { message: String },
}

#[derive(Debug, Deserialize)]
struct RawClientMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    session_id: Option<String>,
    message: Option<String>,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawClientMessage = serde_json::from_str(text)?;
        match raw.kind.as_deref() {
            Some("resync") => Ok(ClientMessage::Resync {
                session_id: raw.session_id,
            }),
            Some(kind) => bail!("unknown message type: {kind}"),
            None => match raw.message {
                Some(message) => Ok(ClientMessage::Chat { message }),
                None => bail!("chat message missing 'message' field"),
            },
        }
    }
}

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Lifecycle phase attached to outbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Running,
    Streaming,
    Finished,
    Error,
}

/// Payload of a `tool_message` event. Exactly one of `args`, `partial_json`
/// and `output` is populated, depending on the lifecycle phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolMessageData {
    pub tool_call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Events sent from backend to frontend over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Prior messages of a resynced conversation.
    History { history: Vec<Value> },

    /// Assistant text; empty data with `finished` marks end-of-turn.
    AiMessage { data: String, state: EventPhase },

    /// Tool-call lifecycle transition.
    ToolMessage {
        data: ToolMessageData,
        state: EventPhase,
    },

    /// Structured visualization payload, replacing prose for its text unit.
    /// Carries the tool-call identity when sourced from a tool result.
    GraphMessage {
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        state: EventPhase,
    },

    /// Human-readable error; the connection closes after a fatal one.
    Error { data: String },
}
