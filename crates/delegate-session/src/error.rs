//! Error types for the session layer.

use delegate_protocol::SessionId;

/// Errors that can occur during authentication and session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The presented secret did not match.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No live session has this id.
    ///
    /// Returned for a REESTAB with an id that was never issued, or whose
    /// session was already torn down.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// An insert collided with a live session of the same id.
    ///
    /// The generator never reuses ids, so this means an invariant was
    /// broken somewhere. The insert is a no-op and the existing record
    /// is left as it was.
    #[error("duplicate session id {0}; existing session kept")]
    DuplicateId(SessionId),
}
