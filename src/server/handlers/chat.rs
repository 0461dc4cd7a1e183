//! The chat endpoint: one question in, a chunked stream of answer text out.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::state::AppState;
use crate::stream::StreamEvent;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub question: String,
    pub session_id: Option<String>,
}

/// POST /api/chat
///
/// Streams the answer as a chunked plain-text body. The session id (minted
/// when the client did not supply one) is echoed in `x-session-id` so
/// follow-up questions can join the same conversation.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequestBody>,
) -> Result<Response, ApiError> {
    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let rx = state.agent.submit(question, session_id.clone());

    // body ends at Done; whatever arrives before it is answer text
    let body_stream = futures_util::stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Some(StreamEvent::Token(token)) => {
                Some((Ok::<_, Infallible>(Bytes::from(token)), rx))
            }
            Some(StreamEvent::Done) | None => None,
        }
    });

    let mut response = Response::new(Body::from_stream(body_stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        "x-session-id",
        HeaderValue::from_str(&session_id).map_err(ApiError::internal)?,
    );
    Ok(response)
}
