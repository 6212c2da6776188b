//! The streaming relay core.
//!
//! Reconstructs typed chat events from the agent engine's generic patch
//! stream. The pipeline per operation: fold into the run-state snapshot
//! (`accumulator`), classify streamed-output values (`classifier`), extract
//! tool-call lifecycle transitions (`lifecycle`), and check completed text
//! for visualization payloads (`graph`). `session` drives the whole thing
//! for one connection.

pub mod accumulator;
pub mod classifier;
pub mod graph;
pub mod lifecycle;
pub mod session;

pub use classifier::{StreamClassifier, StreamSignal};
pub use lifecycle::{ToolCallOutcome, ToolCallRecord, ToolCallTracker};
pub use session::ConnectionSession;
