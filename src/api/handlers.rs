//! API request handlers.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// One-shot chat endpoint: runs a single message to completion without
/// streaming, under a fresh conversation id.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let Some(engine) = state.engine.as_ref() else {
        return Err(ApiError::service_unavailable(
            "Agent not initialized. Please restart the server.",
        ));
    };

    let conversation_id = Uuid::new_v4().to_string();
    info!(%conversation_id, "Handling one-shot chat request");

    let response = engine
        .invoke(&conversation_id, &request.message)
        .await
        .map_err(|e| ApiError::internal(format!("Error processing request: {e}")))?;

    Ok(Json(ChatResponse { response }))
}
