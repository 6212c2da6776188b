//! Tool-call lifecycle tracking.
//!
//! The tracker owns the per-connection id sets for the three lifecycle
//! outcomes. It lives for the whole connection, so a tool call announced in
//! one turn is never announced again by a later turn. At any instant an id
//! belongs to at most one of {running, finished, errored}, and once an id
//! reaches finished or errored it produces no further lifecycle events.

use log::{error, info};
use serde_json::Value;
use std::collections::HashSet;

/// Id prefixes the upstream engine uses for tool-call identifiers. Imposed
/// by the engine's event schema.
pub const TOOL_CALL_ID_PREFIXES: [&str; 2] = ["tool_", "toolu_"];

/// Whether a string is a recognizable tool-call id.
pub fn is_tool_call_id(id: &str) -> bool {
    !id.is_empty() && TOOL_CALL_ID_PREFIXES.iter().any(|p| id.starts_with(p))
}

/// A lifecycle transition extracted from the patch stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub outcome: ToolCallOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    /// Invocation observed; the call is now running with empty arguments.
    Started,
    /// Completed with non-empty output. The caller must still run the output
    /// through graph detection before choosing the outbound event shape.
    Finished { output: String },
    /// Completed with an error.
    Failed { error: String },
}

#[derive(Debug, Default)]
pub struct ToolCallTracker {
    running: HashSet<String>,
    finished: HashSet<String>,
    errored: HashSet<String>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a candidate object for a new tool invocation.
    ///
    /// When the candidate itself carries no valid id, the parent context's
    /// nested `tool_calls` lists are searched as a fallback. Returns `None`
    /// for already-announced ids or when no valid id is found; neither is an
    /// error.
    pub fn observe_invocation(
        &mut self,
        candidate: &Value,
        parent: Option<&Value>,
    ) -> Option<ToolCallRecord> {
        let mut id = text_field(candidate, "id").unwrap_or_default();
        let mut name = text_field(candidate, "name").unwrap_or_default();

        if !is_tool_call_id(&id)
            && let Some((fallback_id, fallback_name)) = parent.and_then(find_nested_tool_call)
        {
            id = fallback_id;
            if let Some(fallback_name) = fallback_name {
                name = fallback_name;
            }
        }

        if !is_tool_call_id(&id)
            || self.running.contains(&id)
            || self.finished.contains(&id)
            || self.errored.contains(&id)
        {
            return None;
        }

        info!("Starting new tool call {id} ({name})");
        self.running.insert(id.clone());
        Some(ToolCallRecord {
            id,
            name,
            outcome: ToolCallOutcome::Started,
        })
    }

    /// Inspect a patch value for a tool-call result.
    ///
    /// Handles both result shapes the engine emits: a `messages` list whose
    /// first element describes the completed call, and a direct object with
    /// an `error` field keyed by the call id.
    pub fn observe_result(&mut self, value: &Value) -> Option<ToolCallRecord> {
        if let Some(messages) = value.get("messages").and_then(Value::as_array) {
            let message = messages.first()?;
            return self.observe_message_result(message);
        }

        if value.get("error").is_some() {
            return self.observe_direct_error(value);
        }

        None
    }

    fn observe_message_result(&mut self, message: &Value) -> Option<ToolCallRecord> {
        let id = text_field(message, "tool_call_id")?;
        if !self.is_unreported(&id) {
            return None;
        }
        let name = text_field(message, "name").unwrap_or_default();

        let record = match text_field(message, "error").filter(|e| !e.is_empty()) {
            Some(error) => {
                error!("Tool call {id} failed: {error}");
                self.errored.insert(id.clone());
                Some(ToolCallRecord {
                    id: id.clone(),
                    name,
                    outcome: ToolCallOutcome::Failed { error },
                })
            }
            None => {
                let output = text_field(message, "content")
                    .map(|content| content.trim().to_string())
                    .unwrap_or_default();
                if output.is_empty() {
                    None
                } else {
                    info!("Tool call {id} completed successfully");
                    self.finished.insert(id.clone());
                    Some(ToolCallRecord {
                        id: id.clone(),
                        name,
                        outcome: ToolCallOutcome::Finished { output },
                    })
                }
            }
        };

        self.running.remove(&id);
        record
    }

    fn observe_direct_error(&mut self, value: &Value) -> Option<ToolCallRecord> {
        let id = text_field(value, "id")?;
        if !self.is_unreported(&id) {
            return None;
        }
        let name = text_field(value, "name").unwrap_or_default();
        let error = text_field(value, "error").unwrap_or_else(|| "Unknown error".to_string());

        error!("Tool call {id} reported an error: {error}");
        self.errored.insert(id.clone());
        self.running.remove(&id);
        Some(ToolCallRecord {
            id,
            name,
            outcome: ToolCallOutcome::Failed { error },
        })
    }

    fn is_unreported(&self, id: &str) -> bool {
        is_tool_call_id(id) && !self.finished.contains(id) && !self.errored.contains(id)
    }
}

/// String form of a field, coercing non-string scalars; `None` for absent or
/// null fields.
fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Search a parent object's `tool_calls` list, then its
/// `additional_kwargs.tool_calls` list, for the first valid id/name pair.
fn find_nested_tool_call(parent: &Value) -> Option<(String, Option<String>)> {
    for list in [
        parent.get("tool_calls"),
        parent
            .get("additional_kwargs")
            .and_then(|kwargs| kwargs.get("tool_calls")),
    ]
    .into_iter()
    .flatten()
    {
        let Some(entries) = list.as_array() else {
            continue;
        };
        for entry in entries {
            if let Some(id) = text_field(entry, "id").filter(|id| is_tool_call_id(id)) {
                return Some((id, text_field(entry, "name")));
            }
        }
    }
    None
}
