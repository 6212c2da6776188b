//! HTTP API module.
//!
//! Provides the health and one-shot chat endpoints and mounts the WebSocket
//! upgrade route.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{ChatRequest, ChatResponse};
pub use routes::create_router;
pub use state::AppState;
