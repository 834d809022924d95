//! The handshake state machine that gates session issue and resumption.
//!
//! ```text
//!                 INIT ok                      SESSIONID sent
//!  AwaitInit ───────────────→ IssueSession ───────────────────→ Active
//!     │  ▲
//!     │  │ INIT bad, attempts left (REJECT n)
//!     │  └──────────── PendingRetry
//!     │                     │ INIT bad, none left (REJECT 0)
//!     │                     ▼
//!     ├── REESTAB unknown ─→ Rejected
//!     ├── malformed / timeout ─→ Rejected
//!     └── REESTAB live ───────────────────────────────────────→ Active
//! ```
//!
//! The gate touches shared state only through the registry and the id
//! generator, and never holds the registry lock across a socket call:
//! every registry method locks, mutates and unlocks before returning.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use delegate_protocol::{Packet, PacketCodec, ProtocolError, SessionId, Tag};
use delegate_session::{
    Authenticator, Session, SessionError, SessionIdGenerator, SessionLease,
    SessionRegistry,
};
use delegate_transport::Connection;

use crate::{DelegateConfig, DelegateError};

/// Non-terminal states of the handshake.
///
/// The terminal states, `Active` and `Rejected`, are the variants of
/// [`GateOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for the first INIT or REESTAB.
    AwaitInit,
    /// A wrong secret was presented; waiting for another try.
    PendingRetry { failures: u8 },
    /// The secret checked out; a session is being issued.
    IssueSession,
}

/// How a handshake ended.
#[derive(Debug)]
pub enum GateOutcome {
    /// The connection is bound to a registered session. The lease tears
    /// the session down when it drops.
    Active {
        lease: SessionLease,
        resumed: bool,
    },

    /// The handshake failed and the connection was closed.
    Rejected(RejectReason),

    /// The client hung up before sending a single byte of a packet.
    Disconnected,
}

/// Why a handshake was rejected.
#[derive(Debug)]
pub enum RejectReason {
    /// Every allowed INIT attempt carried the wrong secret.
    AttemptsExhausted,
    /// REESTAB named an id with no live session.
    UnknownSession(SessionId),
    /// The bytes did not form a valid packet.
    Malformed(ProtocolError),
    /// The client sent a packet only the server may send.
    UnexpectedPacket(Tag),
    /// No packet arrived within the handshake timeout.
    TimedOut,
    /// The registry refused the new session.
    Registry(SessionError),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptsExhausted => f.write_str("authentication attempts exhausted"),
            Self::UnknownSession(id) => write!(f, "unknown session {id}"),
            Self::Malformed(e) => write!(f, "malformed packet: {e}"),
            Self::UnexpectedPacket(tag) => write!(f, "unexpected {tag} packet"),
            Self::TimedOut => f.write_str("handshake timed out"),
            Self::Registry(e) => write!(f, "registry refused session: {e}"),
        }
    }
}

/// Result of waiting for one handshake packet.
enum Read {
    Packet(Packet),
    Disconnected,
    TimedOut,
    Malformed(ProtocolError),
}

/// Runs the handshake for one connection.
///
/// Borrowed from the server state for the duration of one handshake.
pub struct AuthGate<'s, A: Authenticator> {
    registry: &'s Arc<SessionRegistry>,
    ids: &'s SessionIdGenerator,
    auth: &'s A,
    codec: PacketCodec,
    max_attempts: u8,
    read_timeout: Duration,
}

impl<'s, A: Authenticator> AuthGate<'s, A> {
    /// Creates a gate over shared registry state.
    pub fn new(
        registry: &'s Arc<SessionRegistry>,
        ids: &'s SessionIdGenerator,
        auth: &'s A,
        config: &DelegateConfig,
    ) -> Self {
        Self {
            registry,
            ids,
            auth,
            codec: PacketCodec::new(config.max_secret_len),
            max_attempts: config.max_auth_attempts.max(1),
            read_timeout: config.handshake_timeout(),
        }
    }

    /// Drives the handshake to a terminal state.
    ///
    /// # Errors
    /// Returns an error only for I/O failures on the connection. Every
    /// protocol or authentication failure is an `Ok(Rejected)`.
    pub async fn run<C: Connection>(
        &self,
        conn: &mut C,
    ) -> Result<GateOutcome, DelegateError> {
        let conn_id = conn.id();
        let mut state = GateState::AwaitInit;

        loop {
            tracing::debug!(%conn_id, ?state, "handshake state");

            let failures = match state {
                GateState::IssueSession => return self.issue(conn).await,
                GateState::AwaitInit => 0,
                GateState::PendingRetry { failures } => failures,
            };

            let packet = match self.read_packet(conn).await? {
                Read::Packet(packet) => packet,
                Read::Disconnected => {
                    tracing::debug!(%conn_id, "client left before handshake");
                    return Ok(GateOutcome::Disconnected);
                }
                Read::TimedOut => {
                    return Ok(self.reject(conn, RejectReason::TimedOut).await);
                }
                Read::Malformed(e) => {
                    return Ok(self.reject(conn, RejectReason::Malformed(e)).await);
                }
            };

            state = match packet {
                Packet::Init { secret } => {
                    match self.auth.authenticate(&secret).await {
                        Ok(()) => GateState::IssueSession,
                        Err(e) => {
                            let failures = failures + 1;
                            let remaining = self.max_attempts - failures;
                            tracing::warn!(
                                %conn_id,
                                peer = %conn.peer_addr(),
                                failures,
                                remaining,
                                error = %e,
                                "authentication attempt failed"
                            );
                            self.codec
                                .write(conn, &Packet::Reject { remaining })
                                .await?;
                            if remaining == 0 {
                                close_logged(conn).await;
                                return Ok(GateOutcome::Rejected(
                                    RejectReason::AttemptsExhausted,
                                ));
                            }
                            GateState::PendingRetry { failures }
                        }
                    }
                }
                Packet::Reestab { session_id } => {
                    return self.resume(conn, session_id).await;
                }
                other => {
                    let reason = RejectReason::UnexpectedPacket(other.tag());
                    return Ok(self.reject(conn, reason).await);
                }
            };
        }
    }

    /// Reads one packet under the handshake timeout.
    async fn read_packet<C: Connection>(
        &self,
        conn: &mut C,
    ) -> Result<Read, DelegateError> {
        match tokio::time::timeout(self.read_timeout, self.codec.read(conn)).await {
            Err(_) => Ok(Read::TimedOut),
            Ok(Ok(packet)) => Ok(Read::Packet(packet)),
            Ok(Err(e)) if e.is_disconnect() => Ok(Read::Disconnected),
            Ok(Err(ProtocolError::Transport(e))) => Err(e.into()),
            Ok(Err(e)) => Ok(Read::Malformed(e)),
        }
    }

    /// IssueSession → Active: allocate, register, lease, confirm.
    async fn issue<C: Connection>(
        &self,
        conn: &mut C,
    ) -> Result<GateOutcome, DelegateError> {
        let session_id = self.ids.next_id();
        let session = Session::new(session_id, conn.id(), conn.peer_addr());

        if let Err(e) = self.registry.insert(session) {
            return Ok(self.reject(conn, RejectReason::Registry(e)).await);
        }
        // Taken before the write: if the SESSIONID can't be sent, the
        // lease drops on the `?` and the session goes with it.
        let lease = SessionLease::new(Arc::clone(self.registry), session_id, conn.id());
        self.codec
            .write(conn, &Packet::SessionId { session_id })
            .await?;

        tracing::info!(
            conn_id = %conn.id(),
            %session_id,
            peer = %conn.peer_addr(),
            "session issued"
        );
        Ok(GateOutcome::Active {
            lease,
            resumed: false,
        })
    }

    /// REESTAB: rebind a live session to this connection, or reject.
    async fn resume<C: Connection>(
        &self,
        conn: &mut C,
        session_id: SessionId,
    ) -> Result<GateOutcome, DelegateError> {
        match self.registry.rebind(session_id, conn.id(), conn.peer_addr()) {
            Ok(_) => {
                let lease =
                    SessionLease::new(Arc::clone(self.registry), session_id, conn.id());
                self.codec
                    .write(conn, &Packet::SessionId { session_id })
                    .await?;
                tracing::info!(conn_id = %conn.id(), %session_id, "session resumed");
                Ok(GateOutcome::Active {
                    lease,
                    resumed: true,
                })
            }
            Err(_) => {
                let reason = RejectReason::UnknownSession(session_id);
                Ok(self.reject(conn, reason).await)
            }
        }
    }

    /// Sends one final REJECT and closes. Both are best effort: the
    /// outcome is `Rejected` whether or not the peer is still there.
    async fn reject<C: Connection>(&self, conn: &mut C, reason: RejectReason) -> GateOutcome {
        tracing::warn!(
            conn_id = %conn.id(),
            peer = %conn.peer_addr(),
            %reason,
            "handshake rejected"
        );
        if let Err(e) = self.codec.write(conn, &Packet::Reject { remaining: 0 }).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "could not send rejection");
        }
        close_logged(conn).await;
        GateOutcome::Rejected(reason)
    }
}

/// Closes `conn`, logging instead of returning a failure: by the time a
/// connection is being closed there is nobody left to report it to.
pub(crate) async fn close_logged<C: Connection>(conn: &mut C) {
    if let Err(e) = conn.close().await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}
