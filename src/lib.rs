//! Vizbridge backend library.
//!
//! Bridges an agent execution engine's JSON-patch run-log stream to browser
//! chat clients over a WebSocket, reconstructing typed events (assistant
//! text, tool-call lifecycle transitions, graph payloads) from the generic
//! patch stream.

pub mod api;
pub mod diagnostics;
pub mod engine;
pub mod relay;
pub mod ws;
