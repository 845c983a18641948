//! Client configuration.
//!
//! The robot endpoint and connection knobs are read from a RON file
//! (`~/.config/spencer/client.ron` by default). Every field is optional:
//!
//! ```ron
//! (
//!     endpoint: (host: "palmon", port: 1050),
//!     connect_timeout_ms: 5000,
//!     on_write_failure: Close,
//!     history_capacity: 20,
//!     retry: (max_retries: 5, initial_delay_ms: 500, max_delay_ms: 8000),
//! )
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{CONNECT_TIMEOUT, DEFAULT_HISTORY_CAPACITY, DEFAULT_HOST, DEFAULT_PORT};
use crate::reconnect::RetryPolicy;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must be in 1..=65535")]
    InvalidPort,
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
}

/// Robot address. Validated at construction, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEndpoint", into = "RawEndpoint")]
pub struct Endpoint {
    host: String,
    port: u16,
}

#[derive(Serialize, Deserialize)]
struct RawEndpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ConfigError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<RawEndpoint> for Endpoint {
    type Error = ConfigError;

    fn try_from(raw: RawEndpoint) -> Result<Self, Self::Error> {
        Endpoint::new(raw.host, raw.port)
    }
}

impl From<Endpoint> for RawEndpoint {
    fn from(ep: Endpoint) -> Self {
        Self {
            host: ep.host,
            port: ep.port,
        }
    }
}

/// What a failed command write does to the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteFailurePolicy {
    /// Drop the command, log it, keep reading.
    #[default]
    KeepOpen,
    /// Drop the command and close the connection.
    Close,
}

/// Settings for a single [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    pub on_write_failure: WriteFailurePolicy,
}

impl ConnectionConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: CONNECT_TIMEOUT,
            on_write_failure: WriteFailurePolicy::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(Endpoint::default())
    }
}

/// On-disk client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub connect_timeout_ms: u64,
    pub on_write_failure: WriteFailurePolicy,
    pub history_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            on_write_failure: WriteFailurePolicy::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("spencer").join("client.ron"))
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    /// Load an explicit path, or the default path if it exists, or defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                log::debug!("Loading client config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.endpoint.clone(),
            connect_timeout: self.connect_timeout(),
            on_write_failure: self.on_write_failure,
        }
    }
}
