//! Authentication hook for validating INIT secrets.
//!
//! The handshake doesn't compare secrets itself. It calls an
//! [`Authenticator`], so deployments can swap in a different check
//! (a secrets file, an external service) without touching the protocol
//! state machine. [`SharedSecret`] is the stock implementation: one
//! secret configured at startup.

use std::fmt;
use std::future::Future;

use crate::SessionError;

/// Validates the secret a client presented in its INIT packet.
///
/// # Trait bounds
///
/// - `Send + Sync` → shared by every connection task.
/// - `'static` → lives as long as the server.
pub trait Authenticator: Send + Sync + 'static {
    /// Checks `secret`.
    ///
    /// # Returns
    /// - `Ok(())` — the client may open a session
    /// - `Err(SessionError::AuthFailed)` — it may not
    fn authenticate(
        &self,
        secret: &[u8],
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// A single shared secret, compared in constant time.
///
/// The secret still crosses the wire in cleartext; this only keeps the
/// comparison from leaking how many leading bytes matched.
#[derive(Clone)]
pub struct SharedSecret {
    secret: Vec<u8>,
}

impl SharedSecret {
    /// Creates an authenticator accepting exactly `secret`.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Returns `true` if `candidate` equals the configured secret.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        constant_time_eq(&self.secret, candidate)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("len", &self.secret.len())
            .finish_non_exhaustive()
    }
}

impl Authenticator for SharedSecret {
    async fn authenticate(&self, secret: &[u8]) -> Result<(), SessionError> {
        if self.matches(secret) {
            Ok(())
        } else {
            Err(SessionError::AuthFailed("secret mismatch".into()))
        }
    }
}

/// Compares two byte strings without short-circuiting on the first
/// differing byte. Length is not hidden.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_exact_secret() {
        let auth = SharedSecret::new("test");
        assert!(auth.matches(b"test"));
    }

    #[test]
    fn test_matches_rejects_prefix_and_extension() {
        let auth = SharedSecret::new("test");
        assert!(!auth.matches(b"tes"));
        assert!(!auth.matches(b"testing"));
        assert!(!auth.matches(b""));
    }

    #[test]
    fn test_matches_rejects_same_length_mismatch() {
        let auth = SharedSecret::new("test");
        assert!(!auth.matches(b"tesT"));
    }

    #[test]
    fn test_debug_does_not_print_secret() {
        let auth = SharedSecret::new("hunter2");
        let printed = format!("{auth:?}");
        assert!(!printed.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_authenticate_mismatch_returns_auth_failed() {
        let auth = SharedSecret::new("test");
        assert!(auth.authenticate(b"test").await.is_ok());
        assert!(matches!(
            auth.authenticate(b"nope").await,
            Err(SessionError::AuthFailed(_))
        ));
    }
}
