//! Detection of structured visualization payloads inside completed text.
//!
//! Both assistant prose and tool-call output may carry a graph descriptor
//! (a Tableau view reference or a Plotly figure spec) as JSON text, often
//! wrapped in a markdown code fence. Detection must never fail: anything
//! that does not parse as a recognized payload is plain text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Recognized `type` values for graph payloads.
pub const GRAPH_KINDS: [&str; 2] = ["tableau", "plotly"];

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]+?)\s*```").expect("fence regex"));

/// Return the parsed graph payload if `text` is one, `None` otherwise.
pub fn detect(text: &str) -> Option<Value> {
    let inner = CODE_FENCE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let parsed: Value = serde_json::from_str(inner.trim()).ok()?;
    let kind = parsed.get("type")?.as_str()?;
    if GRAPH_KINDS.contains(&kind) {
        Some(parsed)
    } else {
        None
    }
}
