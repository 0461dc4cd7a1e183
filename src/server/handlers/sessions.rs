use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.memory.list_sessions().await?;
    let result: Vec<Value> = sessions
        .into_iter()
        .map(|session| {
            json!({
                "id": session.id,
                "created_at": session.created_at,
                "updated_at": session.updated_at,
                "turn_count": session.turn_count
            })
        })
        .collect();
    Ok(Json(json!({"sessions": result})))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let turns = state.memory.history(&session_id).await?;
    if turns.is_empty() {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    let formatted: Vec<Value> = turns
        .into_iter()
        .map(|turn| {
            json!({
                "role": turn.role.as_str(),
                "content": turn.content,
                "created_at": turn.created_at
            })
        })
        .collect();
    Ok(Json(json!({"session_id": session_id, "turns": formatted})))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.memory.delete_session(&session_id).await?;
    Ok(Json(json!({"success": true})))
}
