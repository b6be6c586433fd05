//! Client-level error type.

use bubble_shared::{ApiError, ProtocolError};
use thiserror::Error;

/// Errors surfaced to callers of the sync client.
///
/// Data-level inconsistencies (unknown message ids, events for another room)
/// are not represented here: they are absorbed where they occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The connection is not open. Nothing was sent.
    #[error("not connected, try again")]
    NotReady,
    /// No session token is stored.
    #[error("not logged in")]
    NotAuthenticated,
    /// The command needs an active room.
    #[error("no room is active")]
    NoActiveRoom,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SyncError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}
