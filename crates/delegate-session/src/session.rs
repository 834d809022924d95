//! Session types: the record the registry keeps for each client.
//!
//! A session outlives any single TCP connection. It tracks:
//! - WHO it is (`SessionId`, handed to the client after INIT)
//! - WHICH connection currently speaks for it (`ConnectionId`)
//! - WHERE that connection came from and WHEN the session began

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use delegate_protocol::SessionId;
use delegate_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Width of the registry's bucket table when nothing else is configured.
pub const DEFAULT_TABLE_WIDTH: usize = 19;

/// Widest table the registry will build. Every node carries `width`
/// child slots, so the width is paid once per live session.
pub const MAX_TABLE_WIDTH: usize = 1024;

/// Configuration for the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of top-level buckets, and of child slots in every node.
    ///
    /// Values below 2 are raised to 2 (a width of 1 could not tell any
    /// two ids apart) and values above [`MAX_TABLE_WIDTH`] are lowered
    /// to it.
    pub table_width: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table_width: DEFAULT_TABLE_WIDTH,
        }
    }
}

impl RegistryConfig {
    /// Shorthand for a config with the given table width.
    pub fn with_width(table_width: usize) -> Self {
        Self { table_width }
    }

    pub(crate) fn effective_width(&self) -> usize {
        self.table_width.clamp(2, MAX_TABLE_WIDTH)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
///
/// ```text
///   Pending ──(registry insert)──→ Active ──(registry delete)──→ Closed
/// ```
///
/// Only `Active` sessions live in the registry. `Closed` is the status
/// of the record `delete` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Built by the handshake, not yet registered.
    Pending,

    /// Registered and reachable by REESTAB.
    Active,

    /// Removed from the registry.
    Closed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single client session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique, process-wide identifier.
    pub id: SessionId,

    /// The connection currently bound to this session. REESTAB swaps it.
    ///
    /// The socket itself is owned by that connection's worker; the
    /// registry only records which worker it is.
    pub connection: ConnectionId,

    /// Peer address of the bound connection.
    pub remote_addr: SocketAddr,

    /// When the session was first issued.
    pub created_at: Instant,

    /// Lifecycle state.
    pub status: SessionStatus,
}

impl Session {
    /// Creates a `Pending` session bound to `connection`.
    pub fn new(
        id: SessionId,
        connection: ConnectionId,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            id,
            connection,
            remote_addr,
            created_at: Instant::now(),
            status: SessionStatus::Pending,
        }
    }

    /// How long ago the session was issued.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
