//! Error types.

use std::path::PathBuf;
use std::time::Duration;

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport config is missing `{0}`")]
    MissingConfig(&'static str),
    #[error("failed to serialize outgoing message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("message of {0} bytes does not fit a data-channel frame")]
    TooLarge(usize),
    #[error("transport i/o error: {0}")]
    Io(String),
    #[error("transport closed")]
    Closed,
}

/// Error loading or validating a [`TransportConfig`](crate::TransportConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Error from the bounded, cancellable or stateful parts of the bridge.
///
/// The unbounded waits never produce one of these.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transport did not connect within {waited:?}")]
    ConnectTimeout { waited: Duration },
    #[error("no reply within {waited:?}")]
    ReplyTimeout { waited: Duration },
    #[error("wait cancelled")]
    Cancelled,
    #[error("operation requires {expected} state, client is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}
