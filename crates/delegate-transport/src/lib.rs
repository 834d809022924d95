//! Transport abstraction layer for the TCP delegate.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the byte stream a client talks on. The protocol layer above only ever
//! sees a [`Connection`]; it never touches sockets directly.
//!
//! # Feature Flags
//!
//! - `tcp` (default) — plain TCP transport via `tokio::net`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
///
/// Sessions record the id of the connection they are bound to, not the
/// socket itself: the socket stays owned by the worker serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}

/// A single, exclusively owned byte stream to a remote peer.
///
/// Methods take `&mut self`: a connection belongs to exactly one worker.
/// Reads are "read until complete": [`read_exact`](Self::read_exact)
/// loops over partial reads, so callers never assume one `read()` yields
/// one logical message.
pub trait Connection: Send + 'static {
    /// Fills `buf` completely.
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the peer hits EOF
    /// before `buf` is full.
    fn read_exact(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Reads bytes until `delim` is seen or `limit` bytes were consumed.
    ///
    /// The returned buffer includes the delimiter when one was found. An
    /// empty buffer means EOF before any byte. A buffer that does not end
    /// in `delim` means either EOF mid-message (shorter than `limit`) or
    /// that the limit was hit.
    fn read_until(
        &mut self,
        delim: u8,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Reads whatever is available into `buf`, returning the count.
    ///
    /// `Ok(0)` means the peer closed the connection cleanly.
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, TransportError>> + Send;

    /// Writes all of `data` and flushes it.
    fn send(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Shuts down the write half. Further sends fail.
    fn close(
        &mut self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the remote peer's address.
    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_ordering_follows_raw_value() {
        assert!(ConnectionId::new(1) < ConnectionId::new(2));
        assert_eq!(ConnectionId::new(3), ConnectionId::new(3));
    }

    #[test]
    fn test_transport_error_is_closed_only_for_eof() {
        assert!(TransportError::ConnectionClosed("eof".into()).is_closed());
        assert!(!TransportError::AcceptFailed(std::io::ErrorKind::Other.into()).is_closed());
    }
}
