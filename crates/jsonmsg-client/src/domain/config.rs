//! Client configuration.
//!
//! [`ClientConfig`] holds the two values that identify a client for its whole
//! lifetime: the broker URI and the client ID.  Both are validated once, at
//! construction, so the engine never has to re-check them.
//!
//! [`FileConfig`] is the optional TOML file read by the CLI binary.  Every
//! field has a serde default, so a file only needs the keys it wants to
//! override:
//!
//! ```toml
//! uri = "ws://broker.local:8080/ws"
//! client_id = "sensor-gateway"
//! keep_alive = 20
//! log_level = "debug"
//! ```

use std::path::{Path, PathBuf};

use jsonmsg_core::domain::options::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE_SECS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest client ID accepted, in characters.
pub const MAX_CLIENT_ID_LEN: usize = 1024;

/// Errors produced while building or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The broker URI is not a `ws://` or `wss://` URI with a host.
    #[error("invalid broker URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The client ID is empty, too long, or contains control characters.
    #[error("invalid client id: {0}")]
    InvalidClientId(String),

    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`FileConfig`].
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── ClientConfig ──────────────────────────────────────────────────────────────

/// Identity of one json-msg client: where it connects and under which ID.
///
/// ```rust
/// use jsonmsg_client::ClientConfig;
///
/// let cfg = ClientConfig::new("ws://localhost:8080/ws", "c1").unwrap();
/// assert_eq!(cfg.client_id(), "c1");
/// assert!(ClientConfig::new("http://localhost", "c1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    uri: String,
    client_id: String,
}

impl ClientConfig {
    /// Validates and stores the broker URI and client ID.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUri`] or [`ConfigError::InvalidClientId`].
    pub fn new(uri: impl Into<String>, client_id: impl Into<String>) -> Result<Self, ConfigError> {
        let uri = uri.into();
        let client_id = client_id.into();
        validate_uri(&uri)?;
        validate_client_id(&client_id)?;
        Ok(Self { uri, client_id })
    }

    /// Like [`new`](Self::new) with a random `jsonmsg-<uuid>` client ID.
    pub fn with_generated_id(uri: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(uri, format!("jsonmsg-{}", Uuid::new_v4().simple()))
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

fn validate_uri(uri: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    if !scheme.eq_ignore_ascii_case("ws") && !scheme.eq_ignore_ascii_case("wss") {
        return Err(invalid("scheme must be ws or wss"));
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    if client_id.is_empty() {
        return Err(ConfigError::InvalidClientId("must not be empty".to_string()));
    }
    if client_id.chars().count() > MAX_CLIENT_ID_LEN {
        return Err(ConfigError::InvalidClientId(format!(
            "longer than {MAX_CLIENT_ID_LEN} characters"
        )));
    }
    if client_id.chars().any(char::is_control) {
        return Err(ConfigError::InvalidClientId(
            "must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

// ── FileConfig ────────────────────────────────────────────────────────────────

/// Settings read from the CLI's `--config` TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    /// Broker URI, e.g. `ws://host:port/path`.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Keepalive interval in seconds; `0` disables it.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u32,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_keep_alive() -> u32 {
    DEFAULT_KEEP_ALIVE_SECS
}
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            uri: None,
            client_id: None,
            user: None,
            password: None,
            keep_alive: default_keep_alive(),
            connect_timeout: default_connect_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl FileConfig {
    /// Parses a config file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed or a field has
    /// the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
