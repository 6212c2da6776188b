//! Classification of streamed-output patch values.
//!
//! Streaming tool-argument tokens and ordinary assistant prose arrive
//! through the same patch path shape, with no discriminant field. The
//! classifier disambiguates on structural shape alone, with a fixed
//! priority: stream start > continuation > termination > plain text, and an
//! exhaustive fallback to `Ignored`.

use log::{debug, info};
use serde_json::Value;

use super::lifecycle::is_tool_call_id;

/// Path segment the engine uses for token-stream updates.
pub const STREAMED_OUTPUT_SEGMENT: &str = "streamed_output_str";

/// Name used when a stream start carries no tool name.
pub const UNKNOWN_TOOL_NAME: &str = "Unknown Tool";

/// Whether a patch path is a streamed-output location: a
/// `streamed_output_str` segment nested under a `logs` root, at least three
/// levels deep. The depth/shape constraint separates genuine token-stream
/// updates from unrelated tree mutations.
pub fn is_streamed_output_path(path: &str) -> bool {
    if !path.contains(STREAMED_OUTPUT_SEGMENT) {
        return false;
    }
    let parts: Vec<&str> = path.split('/').collect();
    parts.len() > 3 && parts.get(1).copied() == Some("logs")
}

/// Outcome of classifying one streamed-output value.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// A new argument stream began; any previous one is replaced.
    Started { id: String, name: String },
    /// A continuation chunk for the active stream. Carries only its own
    /// fragment; the client concatenates.
    Fragment { id: String, fragment: String },
    /// The active stream terminated. Nothing is emitted.
    Ended,
    /// Plain assistant text (only produced while no stream is active).
    Text(String),
    /// Nothing recognizable; skip.
    Ignored,
}

/// Per-connection streaming state: at most one active stream at a time.
#[derive(Debug, Default)]
pub struct StreamClassifier {
    active_stream_id: Option<String>,
    chunks: Vec<String>,
}

impl StreamClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the currently active stream, if any.
    pub fn active_stream(&self) -> Option<&str> {
        self.active_stream_id.as_deref()
    }

    /// Fragments accumulated for the active stream, in arrival order.
    pub fn accumulated(&self) -> &[String] {
        &self.chunks
    }

    pub fn classify(&mut self, value: &Value) -> StreamSignal {
        if let Some(first) = value
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_object)
        {
            if let Some(id) = first.get("id").map(stringify)
                && is_tool_call_id(&id)
            {
                let name = first
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_TOOL_NAME)
                    .to_string();
                info!("Started argument stream for tool {id} ({name})");
                self.active_stream_id = Some(id.clone());
                self.chunks.clear();
                return StreamSignal::Started { id, name };
            }

            if let Some(id) = self.active_stream_id.clone()
                && let Some(fragment) = first.get("partial_json").and_then(Value::as_str)
            {
                debug!("Stream {id} fragment: {fragment}");
                self.chunks.push(fragment.to_string());
                return StreamSignal::Fragment {
                    id,
                    fragment: fragment.to_string(),
                };
            }
        }

        if self.active_stream_id.is_some() && value.as_str() == Some("") {
            if let Some(id) = self.active_stream_id.take() {
                info!("Finished argument stream for tool {id}");
            }
            self.chunks.clear();
            return StreamSignal::Ended;
        }

        // While a stream is active, everything text-shaped belongs to it;
        // plain-text classification is suppressed.
        if self.active_stream_id.is_none()
            && let Some(text) = extract_text(value)
            && !text.trim().is_empty()
        {
            return StreamSignal::Text(text);
        }

        StreamSignal::Ignored
    }
}

/// Extract assistant text from the shapes the engine emits: a list of
/// objects with `text` fields (concatenated), a single such object, or a raw
/// string.
fn extract_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let text: String = items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|item| item.get("text"))
                .map(stringify)
                .collect();
            Some(text)
        }
        Value::Object(map) => map.get("text").map(stringify),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
