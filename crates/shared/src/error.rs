//! Shared error types.

use serde::Deserialize;
use thiserror::Error;

/// Failures at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not JSON, or missing `event`/`data`.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// A known event whose payload does not match its schema.
    #[error("invalid payload for `{event}`: {reason}")]
    InvalidPayload { event: String, reason: String },
    #[error("failed to encode command: {0}")]
    Encode(String),
}

/// Error body returned by the REST endpoints: `{"error": ...}` on most
/// failures, `{"what": ...}` when the server reports an exception.
#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    what: Option<String>,
}

/// Pull a user-facing message out of an error response body.
/// Prefers `error`, falls back to `what`.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    [parsed.error, parsed.what]
        .into_iter()
        .flatten()
        .find(|detail| !detail.trim().is_empty())
}

/// API error type for the REST collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, .. } => try_error_detail(body).unwrap_or_else(|| self.to_string()),
            other => other.to_string(),
        }
    }
}
