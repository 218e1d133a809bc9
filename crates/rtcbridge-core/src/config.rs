//! Transport configuration.
//!
//! Accepted on disk as TOML:
//!
//! ```toml
//! signalling_host = "127.0.0.1"
//! signalling_port = 8080
//! take_first_step = false
//! framed = false
//! ```
//!
//! The older JSON shape (`{"SignallingIP": "...", "SignallingPort": 8080}`)
//! is accepted too, via [`TransportConfig::from_json`].

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SIGNALLING_HOST: &str = "127.0.0.1";
pub const DEFAULT_SIGNALLING_PORT: u16 = 8080;

/// Options handed to [`Transport::set_config`](crate::Transport::set_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Signalling server host or IP.
    #[serde(alias = "SignallingIP")]
    pub signalling_host: String,
    /// Signalling server port.
    #[serde(alias = "SignallingPort")]
    pub signalling_port: u16,
    /// Whether this side sends the first offer.
    #[serde(default, alias = "TakeFirstStep")]
    pub take_first_step: bool,
    /// Wrap outgoing JSON in the data-channel frame (see [`crate::framing`]).
    #[serde(default)]
    pub framed: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            signalling_host: DEFAULT_SIGNALLING_HOST.to_string(),
            signalling_port: DEFAULT_SIGNALLING_PORT,
            take_first_step: false,
            framed: false,
        }
    }
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            signalling_host: host.into(),
            signalling_port: port,
            ..Self::default()
        }
    }

    pub fn with_take_first_step(mut self, take_first_step: bool) -> Self {
        self.take_first_step = take_first_step;
        self
    }

    pub fn with_framed(mut self, framed: bool) -> Self {
        self.framed = framed;
        self
    }

    /// `ws://host:port` address of the signalling server.
    pub fn signalling_url(&self) -> String {
        format!("ws://{}:{}", self.signalling_host, self.signalling_port)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, picking the format from the extension (`.json` or
    /// anything else as TOML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_toml(&contents)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signalling_host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "signalling_host cannot be empty".to_string(),
            ));
        }
        if self.signalling_port == 0 {
            return Err(ConfigError::Invalid(
                "signalling_port cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}
