//! # Delegate
//!
//! A TCP delegate with resumable sessions.
//!
//! Clients open a TCP connection and either present the shared secret
//! (INIT) to be issued a fresh session id, or present an id they were
//! issued earlier (REESTAB) to pick that session back up on the new
//! connection. Every live session sits in one concurrent registry; a
//! session leaves it when the connection serving it ends.
//!
//! ```text
//! TcpTransport → AuthGate (INIT / REESTAB) → RelayHandler
//!                    ↕
//!              SessionRegistry
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use delegate::prelude::*;
//!
//! # async fn start() -> Result<(), DelegateError> {
//! let server = DelegateServer::builder()
//!     .bind("0.0.0.0:13370")
//!     .secret("s3cret")
//!     .build()
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod client;
mod config;
mod error;
mod gate;
mod handler;
mod server;

pub use client::{DelegateClient, HandshakeReply};
pub use config::{DEFAULT_PORT, DelegateConfig};
pub use error::DelegateError;
pub use gate::{AuthGate, GateOutcome, GateState, RejectReason};
pub use handler::{IdleRelay, RelayHandler};
pub use server::{DelegateServer, DelegateServerBuilder};

/// Everything needed to run or talk to a delegate.
pub mod prelude {
    pub use crate::{
        DelegateClient, DelegateConfig, DelegateError, DelegateServer,
        DelegateServerBuilder, HandshakeReply, IdleRelay, RelayHandler,
    };
    pub use delegate_protocol::{Packet, PacketCodec, SessionId};
    pub use delegate_session::{
        Authenticator, RegistryConfig, SessionError, SessionLease,
        SessionRegistry, SharedSecret,
    };
    pub use delegate_transport::{Connection, ConnectionId};
}
