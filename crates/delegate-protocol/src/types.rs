//! Core protocol types for the delegate's wire format.
//!
//! Every packet starts with a one-byte [`Tag`]. There is no length
//! prefix: the tag alone decides how many bytes follow, so a reader must
//! keep reading until the tag-implied layout is complete.
//!
//! ```text
//! INIT       [0x01][secret bytes ...][0x00]     client → server
//! REESTAB    [0x02][session id: u64 LE]          client → server
//! SESSIONID  [0x03][session id: u64 LE]          server → client
//! REJECT     [0x04][attempts remaining: u8]      server → client
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// The opaque identifier the server hands out after a successful INIT.
///
/// Clients present it again in a REESTAB packet to resume the session
/// on a fresh TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Encodes the id as it appears on the wire (little-endian).
    pub fn to_wire(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decodes an id from its wire representation.
    pub fn from_wire(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// The first byte of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Init = 1,
    Reestab = 2,
    SessionId = 3,
    Reject = 4,
}

impl Tag {
    /// Maps a raw byte to a tag, or `None` for anything unassigned.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Init),
            2 => Some(Self::Reestab),
            3 => Some(Self::SessionId),
            4 => Some(Self::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Reestab => "REESTAB",
            Self::SessionId => "SESSIONID",
            Self::Reject => "REJECT",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A complete, decoded packet.
#[derive(Clone, PartialEq, Eq)]
pub enum Packet {
    /// Open a new session by presenting the shared secret.
    ///
    /// The secret travels in cleartext. This is inherited from the
    /// protocol and is not something to build on.
    Init { secret: Vec<u8> },

    /// Resume a previously issued session on this connection.
    Reestab { session_id: SessionId },

    /// Server confirmation: the session this connection is now bound to.
    SessionId { session_id: SessionId },

    /// Server failure notice. `remaining == 0` means the server is
    /// closing the connection.
    Reject { remaining: u8 },
}

impl Packet {
    /// Returns the tag this packet is written with.
    pub fn tag(&self) -> Tag {
        match self {
            Self::Init { .. } => Tag::Init,
            Self::Reestab { .. } => Tag::Reestab,
            Self::SessionId { .. } => Tag::SessionId,
            Self::Reject { .. } => Tag::Reject,
        }
    }
}

// Hand-written so the secret never ends up in a log line.
impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init { secret } => f
                .debug_struct("Init")
                .field("secret", &format_args!("<{} bytes>", secret.len()))
                .finish(),
            Self::Reestab { session_id } => f
                .debug_struct("Reestab")
                .field("session_id", session_id)
                .finish(),
            Self::SessionId { session_id } => f
                .debug_struct("SessionId")
                .field("session_id", session_id)
                .finish(),
            Self::Reject { remaining } => f
                .debug_struct("Reject")
                .field("remaining", remaining)
                .finish(),
        }
    }
}
