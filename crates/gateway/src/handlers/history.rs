//! Chat history handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::session::SessionId;
use crate::AppState;
use navalqa_common::{errors::Result, history::ChatTurn};

#[derive(Serialize)]
pub struct ClearChatResponse {
    pub message: String,
}

/// Conversation of the caller's session, oldest turn first
pub async fn chat_history(State(state): State<AppState>, session: SessionId) -> Result<Json<Vec<ChatTurn>>> {
    let turns = state.pipeline.history(session.as_str()).await?;
    Ok(Json(turns))
}

/// Forget the caller's conversation
pub async fn clear_chat(State(state): State<AppState>, session: SessionId) -> Result<Json<ClearChatResponse>> {
    state.pipeline.clear_history(session.as_str()).await?;
    tracing::info!(session = %session.as_str(), "Chat history cleared");

    Ok(Json(ClearChatResponse {
        message: "Chat history cleared successfully.".to_string(),
    }))
}
