use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let llm_available = state.llm.health_check().await.unwrap_or(false);
    let session_count = state.memory.list_sessions().await.map(|s| s.len()).unwrap_or(0);

    Ok(Json(json!({
        "status": "ok",
        "llm_backend": state.llm.name(),
        "llm_available": llm_available,
        "model": state.settings.llm.model,
        "sessions": session_count,
        "started_at": state.started_at.to_rfc3339()
    })))
}
