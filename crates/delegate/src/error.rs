//! Unified error type for the TCP delegate.

use delegate_protocol::{ProtocolError, Tag};
use delegate_session::SessionError;
use delegate_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed or truncated packet).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, unknown id, duplicate id).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configuration cannot be used to start a server.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The peer did not answer within the configured bound.
    #[error("timed out waiting for {0}")]
    TimedOut(&'static str),

    /// The peer answered with a packet that makes no sense here.
    #[error("unexpected {0} packet")]
    UnexpectedPacket(Tag),
}
