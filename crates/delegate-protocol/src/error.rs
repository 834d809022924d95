//! Error types for the protocol layer.
//!
//! A `ProtocolError` means the bytes on the wire did not form a valid
//! packet. The handshake treats every one of these the same way it
//! treats a failed authentication: one rejection notice, then close.

use delegate_transport::TransportError;

use crate::Tag;

/// Errors that can occur while reading or decoding a packet.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The first byte is not an assigned tag.
    #[error("unknown packet tag {0:#04x}")]
    UnknownTag(u8),

    /// The stream ended (or the buffer ran out) before the tag-implied
    /// layout was complete.
    #[error("truncated {tag} packet: expected {expected} more bytes")]
    Truncated { tag: Tag, expected: usize },

    /// An INIT secret ran past the maximum length without a NUL.
    #[error("secret exceeds {limit} bytes without a terminator")]
    SecretTooLong { limit: usize },

    /// An INIT secret to be encoded contains the NUL terminator.
    #[error("secret contains a NUL byte")]
    SecretContainsNul,

    /// Bytes were left over after a complete packet in a slice decode.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),

    /// The buffer was empty.
    #[error("empty packet")]
    Empty,

    /// The underlying connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Returns `true` if the peer hung up before sending a tag byte.
    ///
    /// This is a clean disconnect, not a malformed packet.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_closed())
    }
}
