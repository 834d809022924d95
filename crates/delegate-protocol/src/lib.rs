//! Wire protocol for the TCP delegate.
//!
//! This crate defines the handshake "language" clients and the server
//! speak:
//!
//! - **Types** ([`Packet`], [`Tag`], [`SessionId`]) — the packets that
//!   travel on the wire.
//! - **Codec** ([`PacketCodec`]) — the fixed binary layout, from byte
//!   slices or straight off a [`Connection`](delegate_transport::Connection).
//! - **Errors** ([`ProtocolError`]) — what can go wrong while decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Session (registry, auth)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{DEFAULT_MAX_SECRET_LEN, MAX_SECRET_LEN_LIMIT, PacketCodec};
pub use error::ProtocolError;
pub use types::{Packet, SessionId, Tag};
