//! Per-connection worker: handshake, relay, teardown.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Run the [`AuthGate`] until it reaches `Active` or `Rejected`
//!   2. Hand the connection to the [`RelayHandler`]
//!   3. Drop the session lease → the session leaves the registry

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use delegate_session::{Authenticator, SessionLease};
use delegate_transport::{Connection, TcpConnection};

use crate::gate::{AuthGate, GateOutcome, close_logged};
use crate::server::ServerState;
use crate::DelegateError;

/// What an authenticated connection does once its session is active.
///
/// The handshake is all this service defines; whatever the delegate
/// forwards for its clients plugs in here. The relay returns when the
/// connection is done, and the worker then tears the session down.
pub trait RelayHandler: Send + Sync + 'static {
    /// Serves `conn` for the session held by `lease`.
    fn relay<C: Connection>(
        &self,
        conn: &mut C,
        lease: &SessionLease,
    ) -> impl Future<Output = Result<(), DelegateError>> + Send;
}

/// Keeps an active connection open without interpreting its bytes.
///
/// Incoming data is read and discarded. The relay ends when the peer
/// closes, when nothing arrives for `idle_timeout`, or when a REESTAB on
/// another connection has taken the session over.
#[derive(Debug, Clone, Copy)]
pub struct IdleRelay {
    idle_timeout: Duration,
}

impl IdleRelay {
    /// Creates a relay that closes after `idle_timeout` of silence.
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }
}

impl RelayHandler for IdleRelay {
    async fn relay<C: Connection>(
        &self,
        conn: &mut C,
        lease: &SessionLease,
    ) -> Result<(), DelegateError> {
        let session_id = lease.session_id();
        let mut buf = [0u8; 1024];

        loop {
            match tokio::time::timeout(self.idle_timeout, conn.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    tracing::debug!(%session_id, "peer closed connection");
                    return Ok(());
                }
                Ok(Ok(n)) => {
                    tracing::trace!(%session_id, bytes = n, "discarded relay data");
                }
                Ok(Err(e)) if e.is_closed() => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    tracing::info!(%session_id, "connection idle, closing");
                    return Ok(());
                }
            }

            if !lease.is_current() {
                tracing::info!(
                    %session_id,
                    conn_id = %lease.connection(),
                    "session taken over by another connection"
                );
                return Ok(());
            }
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, R>(
    mut conn: TcpConnection,
    state: Arc<ServerState<A, R>>,
) -> Result<(), DelegateError>
where
    A: Authenticator,
    R: RelayHandler,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let gate = AuthGate::new(&state.registry, &state.ids, &state.auth, &state.config);
    let (lease, resumed) = match gate.run(&mut conn).await? {
        GateOutcome::Active { lease, resumed } => (lease, resumed),
        GateOutcome::Rejected(reason) => {
            tracing::debug!(%conn_id, %reason, "connection rejected");
            return Ok(());
        }
        GateOutcome::Disconnected => return Ok(()),
    };

    tracing::debug!(%conn_id, session_id = %lease.session_id(), resumed, "relay started");
    let result = state.relay.relay(&mut conn, &lease).await;
    close_logged(&mut conn).await;

    // Dropping the lease releases the session, unless a REESTAB has
    // rebound it to another connection in the meantime.
    drop(lease);
    tracing::debug!(%conn_id, "connection finished");
    result
}
