//! Server configuration.
//!
//! Everything has a default, so a config file only lists what it changes:
//!
//! ```toml
//! bind = "0.0.0.0:25565"
//! verification_workers = 4
//!
//! [login]
//! online_mode = false
//! compression_threshold = -1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use drawbridge_identity::DEFAULT_SESSION_SERVER;
use drawbridge_session::LoginConfig;

use crate::DrawbridgeError;

/// Top-level configuration for a [`DrawbridgeServer`](crate::DrawbridgeServer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Game ticks per second. Login timeouts and hand-off run on ticks.
    pub tick_rate_hz: u32,
    /// How often the sweeper reaps dead sessions and retries stalled
    /// writes, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Identity lookups allowed in flight at once.
    pub verification_workers: usize,
    /// Base URL of the session service.
    pub session_server_url: String,
    /// Per-lookup HTTP timeout in milliseconds.
    pub verification_timeout_ms: u64,
    /// Send the client's address to the session service so it can reject
    /// logins relayed through a proxy.
    pub prevent_proxy_connections: bool,
    pub login: LoginConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:25565".to_string(),
            tick_rate_hz: 20,
            sweep_interval_ms: 50,
            verification_workers: 8,
            session_server_url: DEFAULT_SESSION_SERVER.to_string(),
            verification_timeout_ms: 5_000,
            prevent_proxy_connections: false,
            login: LoginConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DrawbridgeError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DrawbridgeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, DrawbridgeError> {
        toml::from_str(contents)
            .map_err(|e| DrawbridgeError::Config(format!("failed to parse TOML: {e}")))
    }

    /// Renders the config as TOML, e.g. to write out a starter file.
    pub fn to_toml_string(&self) -> Result<String, DrawbridgeError> {
        toml::to_string_pretty(self)
            .map_err(|e| DrawbridgeError::Config(format!("failed to serialize config: {e}")))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    /// Returns a list of problems. Empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push("bind address cannot be empty".to_string());
        }
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 128 {
            errors.push(format!(
                "tick_rate_hz must be between 1 and 128, got {}",
                self.tick_rate_hz
            ));
        }
        if self.sweep_interval_ms == 0 {
            errors.push("sweep_interval_ms must be greater than 0".to_string());
        }
        if self.verification_workers == 0 {
            errors.push("verification_workers must be greater than 0".to_string());
        }
        if self.login.online_mode {
            if !(self.session_server_url.starts_with("http://")
                || self.session_server_url.starts_with("https://"))
            {
                errors.push(format!(
                    "session_server_url must be an http(s) URL, got {:?}",
                    self.session_server_url
                ));
            }
            if self.verification_timeout_ms == 0 {
                errors.push("verification_timeout_ms must be greater than 0".to_string());
            }
        }

        errors.extend(self.login.validate());
        errors
    }

    /// Like [`validate`](Self::validate), but as a single error.
    pub fn validate_strict(&self) -> Result<(), DrawbridgeError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DrawbridgeError::Config(format!(
                "invalid configuration:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}
