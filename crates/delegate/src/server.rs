//! `DelegateServer` builder and server loop.
//!
//! This is the entry point for running a delegate. It ties together all
//! the layers: transport → protocol → session → handshake → relay.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use delegate_protocol::SessionId;
use delegate_session::{
    Authenticator, RegistryConfig, SessionIdGenerator, SessionRegistry, SharedSecret,
};
use delegate_transport::{TcpTransport, Transport};
use tokio::task::JoinSet;

use crate::handler::{IdleRelay, RelayHandler, handle_connection};
use crate::{DelegateConfig, DelegateError};

/// Shared server state passed to each connection worker.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry is its own `Arc` because session leases outlive any borrow
/// of the state.
pub(crate) struct ServerState<A: Authenticator, R: RelayHandler> {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) ids: SessionIdGenerator,
    pub(crate) auth: A,
    pub(crate) relay: R,
    pub(crate) config: DelegateConfig,
}

/// Builder for configuring and starting a delegate server.
///
/// # Example
///
/// ```rust,no_run
/// use delegate::prelude::*;
///
/// # async fn start() -> Result<(), DelegateError> {
/// let server = DelegateServer::builder()
///     .bind("0.0.0.0:13370")
///     .secret("s3cret")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DelegateServerBuilder {
    config: DelegateConfig,
}

impl DelegateServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: DelegateConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the shared secret clients must present.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = secret.into();
        self
    }

    /// Sets how long the handshake waits for each client packet.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets how long an active connection may stay silent.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets how many wrong secrets one connection may send.
    pub fn max_auth_attempts(mut self, attempts: u8) -> Self {
        self.config.max_auth_attempts = attempts;
        self
    }

    /// Sets the session registry configuration.
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.config.registry = registry;
        self
    }

    /// Builds and binds the server with the stock [`SharedSecret`]
    /// authenticator and [`IdleRelay`].
    pub async fn build(
        self,
    ) -> Result<DelegateServer<SharedSecret, IdleRelay>, DelegateError> {
        let auth = SharedSecret::new(self.config.secret.as_bytes());
        let relay = IdleRelay::new(self.config.idle_timeout());
        self.build_with(auth, relay).await
    }

    /// Builds and binds the server with a custom authenticator and relay.
    ///
    /// # Errors
    /// - [`DelegateError::Config`] if the configuration is unusable
    /// - [`DelegateError::Transport`] if the address cannot be bound
    pub async fn build_with<A, R>(
        self,
        auth: A,
        relay: R,
    ) -> Result<DelegateServer<A, R>, DelegateError>
    where
        A: Authenticator,
        R: RelayHandler,
    {
        self.config.validate()?;
        let transport = TcpTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(SessionRegistry::new(self.config.registry.clone())),
            ids: SessionIdGenerator::new(),
            auth,
            relay,
            config: self.config,
        });

        Ok(DelegateServer { transport, state })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// First pause after a failed accept.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
/// Longest pause between accepts while they keep failing.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Doubles the accept backoff, up to [`ACCEPT_BACKOFF_MAX`].
fn next_accept_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => ACCEPT_BACKOFF_MIN,
        Some(d) => (d * 2).min(ACCEPT_BACKOFF_MAX),
    }
}

/// A bound delegate server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to
/// start accepting connections.
pub struct DelegateServer<A: Authenticator, R: RelayHandler> {
    transport: TcpTransport,
    state: Arc<ServerState<A, R>>,
}

impl DelegateServer<SharedSecret, IdleRelay> {
    /// Creates a new builder.
    pub fn builder() -> DelegateServerBuilder {
        DelegateServerBuilder::new()
    }
}

impl<A, R> DelegateServer<A, R>
where
    A: Authenticator,
    R: RelayHandler,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DelegateError> {
        Ok(self.transport.local_addr()?)
    }

    /// The live session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// The id the next successful INIT will be issued.
    pub fn next_session_id(&self) -> SessionId {
        self.state.ids.peek()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), DelegateError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Each accepted connection is served by its own task. Once
    /// `shutdown` fires, the listener stops accepting and the call
    /// returns after every in-flight worker has finished. Workers are
    /// bounded by the handshake and idle timeouts, so the drain is too.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), DelegateError> {
        tracing::info!(addr = %self.local_addr()?, "delegate server running");

        let mut workers = JoinSet::new();
        let mut backoff: Option<Duration> = None;
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => accepted,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "connection worker panicked");
                    }
                    continue;
                }
            };

            match accepted {
                Ok(conn) => {
                    backoff = None;
                    let state = Arc::clone(&self.state);
                    workers.spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    // Errors like EMFILE persist until a worker exits;
                    // retrying at once would only spin.
                    let pause = next_accept_backoff(backoff);
                    backoff = Some(pause);
                    tracing::error!(error = %e, retry_in = ?pause, "accept failed");
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }

        self.transport.shutdown().await?;
        drop(self.transport);
        tracing::info!(in_flight = workers.len(), "listener closed, draining workers");

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "connection worker panicked");
            }
        }

        tracing::info!(
            live_sessions = self.state.registry.len(),
            "delegate server stopped"
        );
        Ok(())
    }
}
