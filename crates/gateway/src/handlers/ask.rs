//! Question answering handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::session::SessionId;
use crate::AppState;
use navalqa_common::{
    errors::{AppError, Result},
    AnswerPayload,
};

/// Ask request. An absent or null question is treated as empty.
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub question: Option<String>,
}

/// Answer a question and record it in the session's chat history
pub async fn ask(
    State(state): State<AppState>,
    session: SessionId,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AnswerPayload>> {
    let start = Instant::now();

    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    let question = request.question.ok_or_else(AppError::no_question)?;
    let answer = state.pipeline.ask(session.as_str(), &question).await?;

    tracing::info!(
        session = %session.as_str(),
        ambiguous = answer.is_ambiguous(),
        cited = answer.citation().is_some(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Question answered"
    );

    Ok(Json(answer))
}
