//! Session management for the TCP delegate.
//!
//! This crate handles everything a client session is, independent of
//! the socket it arrived on:
//!
//! 1. **Authentication** — checking the INIT secret ([`Authenticator`],
//!    [`SharedSecret`])
//! 2. **Identity** — issuing unique ids ([`SessionIdGenerator`])
//! 3. **Tracking** — the concurrent id → session store
//!    ([`SessionRegistry`]) and the drop guard that tears a session down
//!    when its worker exits ([`SessionLease`])
//!
//! # How it fits in the stack
//!
//! ```text
//! AuthGate (above)  ← drives the registry from handshake packets
//!     ↕
//! Session Layer (this crate)  ← ids, registry, authentication
//!     ↕
//! Protocol Layer (below)  ← provides SessionId
//! ```

mod auth;
mod error;
mod id;
mod registry;
mod session;
mod table;

pub use auth::{Authenticator, SharedSecret};
pub use error::SessionError;
pub use id::SessionIdGenerator;
pub use registry::{SessionLease, SessionRegistry};
pub use session::{
    DEFAULT_TABLE_WIDTH, MAX_TABLE_WIDTH, RegistryConfig, Session, SessionStatus,
};
pub use table::SessionTable;
