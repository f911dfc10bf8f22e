//! Citation lookup handler

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use navalqa_common::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct CitationQuery {
    pub subject: Option<String>,
}

#[derive(Serialize)]
pub struct CitationResponse {
    pub subject: String,
    pub citation: Option<String>,
}

/// First reachable reference page for a subject
pub async fn citation(
    State(state): State<AppState>,
    Query(query): Query<CitationQuery>,
) -> Result<Json<CitationResponse>> {
    let text = query.subject.ok_or_else(|| AppError::MissingField {
        field: "subject".to_string(),
    })?;

    let (subject, citation) = state.pipeline.find_citation(&text).await?;

    Ok(Json(CitationResponse {
        subject: subject.into_string(),
        citation,
    }))
}
