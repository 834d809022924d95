//! The concurrent session registry.
//!
//! One mutex guards the whole [`SessionTable`], so every insert, lookup,
//! rebind and delete observes a single total order. The lock is taken
//! and released inside each call: nothing here is `async`, so it can
//! never be held across a socket read or write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use delegate_protocol::SessionId;
use delegate_transport::ConnectionId;

use crate::{RegistryConfig, Session, SessionError, SessionTable};

/// Thread-safe map from [`SessionId`] to [`Session`].
///
/// ## Lifecycle
///
/// ```text
/// INIT ok ──→ insert() ──→ [Active] ──(REESTAB)──→ rebind() ──→ [Active]
///                              │                                   │
///                              └──────(worker exits)──→ release() ─┘
///                                                          │
///                                                          ▼
///                                                 delete() → [Closed]
/// ```
#[derive(Debug)]
pub struct SessionRegistry {
    table: Mutex<SessionTable>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            table: Mutex::new(SessionTable::new(config.effective_width())),
        }
    }

    // A panic while holding the lock can't leave the tree half-linked
    // (every mutation completes before it can unwind), so a poisoned lock
    // is still safe to use.
    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a session, marking it `Active`.
    ///
    /// # Errors
    /// Returns [`SessionError::DuplicateId`] if a live session already
    /// has this id. That is logged as an invariant violation and the
    /// existing record is left as it was.
    pub fn insert(&self, session: Session) -> Result<(), SessionError> {
        let session_id = session.id;
        let connection = session.connection;
        let result = self.table().insert(session);

        match &result {
            Ok(()) => {
                tracing::info!(%session_id, %connection, "session registered");
            }
            Err(e) => {
                tracing::error!(
                    %session_id,
                    %connection,
                    error = %e,
                    "registry invariant violation: duplicate insert rejected"
                );
            }
        }
        result
    }

    /// Returns a snapshot of the session with this id.
    pub fn lookup(&self, id: SessionId) -> Option<Session> {
        self.table().get(id).cloned()
    }

    /// Returns `true` if a live session has this id.
    pub fn contains(&self, id: SessionId) -> bool {
        self.table().get(id).is_some()
    }

    /// Binds a live session to a new connection (REESTAB).
    ///
    /// Returns the updated snapshot. No id is allocated and nothing is
    /// inserted or removed; only the connection handle changes.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no live session has this id.
    pub fn rebind(
        &self,
        id: SessionId,
        connection: ConnectionId,
        remote_addr: std::net::SocketAddr,
    ) -> Result<Session, SessionError> {
        let mut table = self.table();
        let session = table.get_mut(id).ok_or(SessionError::NotFound(id))?;
        let previous = std::mem::replace(&mut session.connection, connection);
        session.remote_addr = remote_addr;
        let snapshot = session.clone();
        drop(table);

        tracing::info!(
            session_id = %id,
            from = %previous,
            to = %connection,
            "session rebound"
        );
        Ok(snapshot)
    }

    /// Removes a session, reparenting anything that collided with it.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no live session has this id.
    pub fn delete(&self, id: SessionId) -> Result<Session, SessionError> {
        let removed = self.table().remove(id)?;
        tracing::info!(session_id = %id, age = ?removed.age(), "session deleted");
        Ok(removed)
    }

    /// Removes a session only if it is still bound to `connection`.
    ///
    /// This is the worker teardown path. A worker whose session was
    /// since rebound to another connection by REESTAB no longer owns it,
    /// so its release is a no-op. Check and delete happen under one lock.
    ///
    /// Returns `true` if the session was removed.
    pub fn release(&self, id: SessionId, connection: ConnectionId) -> bool {
        let mut table = self.table();
        match table.get(id) {
            Some(session) if session.connection == connection => {
                let removed = table.remove(id);
                drop(table);
                match removed {
                    Ok(session) => {
                        tracing::info!(
                            session_id = %id,
                            %connection,
                            age = ?session.age(),
                            "session released"
                        );
                        true
                    }
                    Err(_) => false,
                }
            }
            Some(session) => {
                let owner = session.connection;
                drop(table);
                tracing::debug!(
                    session_id = %id,
                    %connection,
                    %owner,
                    "session owned by another connection, not released"
                );
                false
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Returns `true` if there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Every live id, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        self.table().ids()
    }
}

// ---------------------------------------------------------------------------
// SessionLease
// ---------------------------------------------------------------------------

/// Drop guard tying a registered session to the worker serving it.
///
/// When the lease drops (clean return, error, or panic unwinding), the
/// session is released for its connection. The teardown can't be
/// forgotten on any exit path.
#[derive(Debug)]
#[must_use = "dropping the lease releases the session immediately"]
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    session_id: SessionId,
    connection: ConnectionId,
    released: bool,
}

impl SessionLease {
    /// Creates a lease for a session already bound to `connection`.
    pub fn new(
        registry: Arc<SessionRegistry>,
        session_id: SessionId,
        connection: ConnectionId,
    ) -> Self {
        Self {
            registry,
            session_id,
            connection,
            released: false,
        }
    }

    /// The leased session's id.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The connection holding the lease.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Returns `true` while the session is still bound to this lease's
    /// connection (i.e. no REESTAB has taken it over).
    pub fn is_current(&self) -> bool {
        self.registry
            .lookup(self.session_id)
            .is_some_and(|s| s.connection == self.connection)
    }

    /// Releases the session now instead of at drop.
    ///
    /// Returns `true` if this call removed it.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.registry.release(self.session_id, self.connection)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(self.session_id, self.connection);
        }
    }
}
