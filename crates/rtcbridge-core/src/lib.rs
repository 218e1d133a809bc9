//! Core types and synchronization for rtcbridge.
//!
//! This crate turns a callback-driven media transport into something a single
//! synchronous caller can drive: wait for the transport to connect, send a
//! JSON query, block for the reply. The transport itself is reached through
//! the [`Transport`] trait; this crate provides the glue.

mod cancel;
mod config;
mod error;
pub mod framing;
mod gate;
mod message;
mod query;
mod queue;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cancel::CancelToken;
pub use config::TransportConfig;
pub use error::{BridgeError, ConfigError, TransportError};
pub use gate::ConnectionGate;
pub use message::{Frame, Message};
pub use query::{ProtocolState, QueryClient};
pub use queue::InboundMessageQueue;
pub use transport::{
    DataCallback, FrameCallback, MessageCallback, StateCallback, Transport,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle state, as reported by the transport.
///
/// The core only ever observes this value; transitions happen inside the
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing started yet.
    #[default]
    Disconnected,
    /// Signalling connection is being opened.
    Startup,
    /// Signalling server reached, waiting for negotiation.
    Signup,
    /// Local offer sent to the peer.
    Offered,
    /// Data channel open; messages can flow.
    Connected,
    /// Channel or signalling connection closed.
    Closed,
    /// Transport-level failure.
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether the transport has given up on this session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Startup => "startup",
            Self::Signup => "signup",
            Self::Offered => "offered",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}
