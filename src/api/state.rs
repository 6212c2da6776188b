//! Application state shared across handlers.

use std::sync::Arc;

use crate::diagnostics::DiagnosticsSink;
use crate::engine::AgentEngine;

/// Application state shared across all handlers.
///
/// The engine handle is constructed once at startup and injected here; a
/// `None` engine means the upstream agent is not configured and connections
/// are rejected with a terminal error event.
#[derive(Clone)]
pub struct AppState {
    /// Upstream agent engine, shared by all connections.
    pub engine: Option<Arc<dyn AgentEngine>>,
    /// Per-turn diagnostics sink.
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

impl AppState {
    pub fn new(engine: Option<Arc<dyn AgentEngine>>, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            engine,
            diagnostics,
        }
    }
}
