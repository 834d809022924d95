//! Server configuration.

use std::time::Duration;

use delegate_protocol::{DEFAULT_MAX_SECRET_LEN, MAX_SECRET_LEN_LIMIT};
use delegate_session::{MAX_TABLE_WIDTH, RegistryConfig};
use serde::{Deserialize, Serialize};

use crate::DelegateError;

/// Port the server listens on when none is given.
pub const DEFAULT_PORT: u16 = 13370;

/// Configuration for a delegate server.
///
/// Every field has a default, so a JSON config file only needs the keys
/// it wants to change:
///
/// ```json
/// { "bind_addr": "127.0.0.1:9000", "secret": "s3cret", "max_auth_attempts": 5 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Address to listen on.
    pub bind_addr: String,

    /// The shared secret clients must present in INIT.
    ///
    /// Never written back out when the config is serialized.
    #[serde(skip_serializing)]
    pub secret: String,

    /// Upper bound on waiting for each handshake packet, in milliseconds.
    pub handshake_timeout_ms: u64,

    /// How long an active connection may sit silent before it is closed,
    /// in milliseconds.
    pub idle_timeout_ms: u64,

    /// Wrong secrets tolerated on one connection before it is closed.
    pub max_auth_attempts: u8,

    /// Longest INIT secret accepted, in bytes.
    pub max_secret_len: usize,

    /// Session registry settings.
    pub registry: RegistryConfig,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            secret: String::new(),
            handshake_timeout_ms: 10_000,
            idle_timeout_ms: 10_000,
            max_auth_attempts: 3,
            max_secret_len: DEFAULT_MAX_SECRET_LEN,
            registry: RegistryConfig::default(),
        }
    }
}

impl DelegateConfig {
    /// The handshake read bound as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// The idle bound as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Checks that a server can actually run with this config.
    ///
    /// # Errors
    /// Returns [`DelegateError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<(), DelegateError> {
        if self.secret.is_empty() {
            return Err(DelegateError::Config("secret must not be empty".into()));
        }
        if self.secret.as_bytes().contains(&0) {
            return Err(DelegateError::Config(
                "secret must not contain NUL bytes".into(),
            ));
        }
        if self.max_secret_len > MAX_SECRET_LEN_LIMIT {
            return Err(DelegateError::Config(format!(
                "max_secret_len must be at most {MAX_SECRET_LEN_LIMIT}"
            )));
        }
        if !(2..=MAX_TABLE_WIDTH).contains(&self.registry.table_width) {
            return Err(DelegateError::Config(format!(
                "registry.table_width must be between 2 and {MAX_TABLE_WIDTH}"
            )));
        }
        if self.secret.len() > self.max_secret_len {
            return Err(DelegateError::Config(format!(
                "secret is longer than max_secret_len ({})",
                self.max_secret_len
            )));
        }
        if self.max_auth_attempts == 0 {
            return Err(DelegateError::Config(
                "max_auth_attempts must be at least 1".into(),
            ));
        }
        if self.handshake_timeout_ms == 0 || self.idle_timeout_ms == 0 {
            return Err(DelegateError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
