//! WebSocket transport for the relay.
//!
//! One persistent connection per client; inbound chat/resync messages,
//! outbound typed events. Sessions are fully independent: no hub, no
//! cross-connection state.

mod handler;
mod types;

pub use handler::ws_handler;
pub use types::{ClientMessage, EventPhase, ServerEvent, ToolMessageData};
