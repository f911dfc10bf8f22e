//! Chat session identity

use axum::{extract::FromRequestParts, http::request::Parts};
use navalqa_common::errors::AppError;

/// Header carrying the caller's session id
pub const SESSION_HEADER: &str = "x-session-id";

/// Session used when the caller sends none
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// Longest accepted session id
const MAX_SESSION_LEN: usize = 128;

/// Session id extracted from the `X-Session-ID` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(SESSION_HEADER) else {
            return Ok(SessionId(ANONYMOUS_SESSION.to_string()));
        };

        let id = value
            .to_str()
            .map(str::trim)
            .map_err(|_| AppError::InvalidFormat {
                message: "X-Session-ID must be visible ASCII".to_string(),
            })?;

        if id.is_empty() {
            return Ok(SessionId(ANONYMOUS_SESSION.to_string()));
        }
        if id.len() > MAX_SESSION_LEN {
            return Err(AppError::Validation {
                message: format!("X-Session-ID must be at most {} characters", MAX_SESSION_LEN),
                field: Some("X-Session-ID".to_string()),
            });
        }

        Ok(SessionId(id.to_string()))
    }
}
