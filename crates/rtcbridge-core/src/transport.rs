//! The capability set the bridge needs from a media transport.

use crate::{ConnectionState, Frame, TransportConfig, TransportError};

/// Called with each inbound text message.
pub type MessageCallback = Box<dyn Fn(String) + Send + Sync>;
/// Called with each inbound binary payload that is not a message.
pub type DataCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;
/// Called with each received media frame.
pub type FrameCallback = Box<dyn Fn(Frame) + Send + Sync>;
/// Called on every connection state transition.
pub type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// A media/signalling transport.
///
/// Implementations own their own concurrency: callbacks may fire on any
/// thread, at any time after they are registered, including while the
/// application thread is blocked in the bridge. All methods take `&self` so
/// a transport can be shared between the gate and the query client.
///
/// Registering a callback replaces the previous one of the same kind.
pub trait Transport: Send + Sync {
    /// Apply configuration. Must be called before [`start_signalling`].
    ///
    /// [`start_signalling`]: Transport::start_signalling
    fn set_config(&self, config: TransportConfig) -> Result<(), TransportError>;

    /// Begin the handshake. Returns once it has been kicked off; progress is
    /// observed through [`state`](Transport::state).
    fn start_signalling(&self) -> Result<(), TransportError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    fn set_message_callback(&self, callback: MessageCallback);

    fn set_data_callback(&self, callback: DataCallback);

    fn set_frame_callback(&self, callback: FrameCallback);

    fn set_state_callback(&self, callback: StateCallback);

    /// Serialize and send a JSON value to the peer. Fire-and-forget: success
    /// means the value was handed to the transport, not that it arrived.
    fn send_json(&self, value: &serde_json::Value) -> Result<(), TransportError>;
}
