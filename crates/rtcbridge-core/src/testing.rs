//! An in-memory [`Transport`] for tests.
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream crates.

use crate::{
    ConnectionState, DataCallback, Frame, FrameCallback, MessageCallback, StateCallback,
    Transport, TransportConfig, TransportError,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

type Shared<F> = Mutex<Option<Arc<F>>>;

/// A transport whose state and deliveries are driven by the test.
///
/// Everything it is asked to send is recorded and available through
/// [`sent`](FakeTransport::sent).
#[derive(Default)]
pub struct FakeTransport {
    state: Arc<Mutex<ConnectionState>>,
    state_reads: AtomicUsize,
    config: Mutex<Option<TransportConfig>>,
    connect_after: Mutex<Option<Duration>>,
    signalling_started: AtomicUsize,
    sent: Mutex<Vec<serde_json::Value>>,
    on_message: Shared<dyn Fn(String) + Send + Sync>,
    on_data: Shared<dyn Fn(Vec<u8>) + Send + Sync>,
    on_frame: Shared<dyn Fn(Frame) + Send + Sync>,
    on_state: Arc<Shared<dyn Fn(ConnectionState) + Send + Sync>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make [`start_signalling`](Transport::start_signalling) move to
    /// `Connected` on its own after `delay`.
    pub fn connect_after(&self, delay: Duration) {
        *self.connect_after.lock() = Some(delay);
    }

    /// Change state and fire the state callback.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
        let callback = self.on_state.lock().clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }

    /// Change state without telling anyone.
    pub fn set_state_silently(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Deliver an inbound message as the transport's receive path would.
    pub fn deliver(&self, payload: impl Into<String>) {
        let callback = self.on_message.lock().clone();
        if let Some(callback) = callback {
            callback(payload.into());
        }
    }

    pub fn deliver_data(&self, data: Vec<u8>) {
        let callback = self.on_data.lock().clone();
        if let Some(callback) = callback {
            callback(data);
        }
    }

    pub fn deliver_frame(&self, frame: Frame) {
        let callback = self.on_frame.lock().clone();
        if let Some(callback) = callback {
            callback(frame);
        }
    }

    /// Everything passed to `send_json`, in order.
    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent.lock().clone()
    }

    pub fn config(&self) -> Option<TransportConfig> {
        self.config.lock().clone()
    }

    /// How many times `state()` has been read.
    pub fn state_reads(&self) -> usize {
        self.state_reads.load(Ordering::SeqCst)
    }

    /// How many times signalling was started.
    pub fn signalling_started(&self) -> usize {
        self.signalling_started.load(Ordering::SeqCst)
    }

    pub fn has_message_callback(&self) -> bool {
        self.on_message.lock().is_some()
    }
}

impl Transport for FakeTransport {
    fn set_config(&self, config: TransportConfig) -> Result<(), TransportError> {
        *self.config.lock() = Some(config);
        Ok(())
    }

    fn start_signalling(&self) -> Result<(), TransportError> {
        self.signalling_started.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Startup);
        if let Some(delay) = *self.connect_after.lock() {
            let state = self.state.clone();
            let on_state = self.on_state.clone();
            thread::spawn(move || {
                thread::sleep(delay);
                *state.lock() = ConnectionState::Connected;
                let callback = on_state.lock().clone();
                if let Some(callback) = callback {
                    callback(ConnectionState::Connected);
                }
            });
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        *self.state.lock()
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        *self.on_message.lock() = Some(Arc::from(callback));
    }

    fn set_data_callback(&self, callback: DataCallback) {
        *self.on_data.lock() = Some(Arc::from(callback));
    }

    fn set_frame_callback(&self, callback: FrameCallback) {
        *self.on_frame.lock() = Some(Arc::from(callback));
    }

    fn set_state_callback(&self, callback: StateCallback) {
        *self.on_state.lock() = Some(Arc::from(callback));
    }

    fn send_json(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        if !self.state.lock().is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(value.clone());
        Ok(())
    }
}
