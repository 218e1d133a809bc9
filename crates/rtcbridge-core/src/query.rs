//! Synchronous request/response over the transport.

use crate::{
    BridgeError, ConnectionGate, Frame, InboundMessageQueue, Message, Transport,
    TransportConfig, TransportError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Where a [`QueryClient`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Nothing issued yet.
    Idle,
    /// Signalling started, waiting for the transport to connect.
    AwaitingConnection,
    /// Connected; queries may be sent.
    Ready,
}

impl ProtocolState {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingConnection => "awaiting-connection",
            Self::Ready => "ready",
        }
    }
}

/// Sends a JSON query and blocks for the answer.
///
/// The answer is simply the first message that arrives after the query was
/// sent; there is no correlation id. Only one query can be outstanding:
/// [`query`](QueryClient::query) takes `&mut self`, so the next one cannot be
/// issued before the previous answer was consumed. Messages the peer sends
/// unprompted are indistinguishable from answers, and are dropped by the
/// reset that precedes each query.
pub struct QueryClient<T: Transport + ?Sized> {
    transport: Arc<T>,
    gate: ConnectionGate<T>,
    queue: InboundMessageQueue,
    state: ProtocolState,
}

impl<T: Transport + ?Sized> QueryClient<T> {
    /// Wire the transport's callbacks. Messages feed the inbound queue; data
    /// and frames are only logged.
    pub fn new(transport: Arc<T>) -> Self {
        let queue = InboundMessageQueue::new();
        let feed = queue.clone();
        transport.set_message_callback(Box::new(move |payload: String| {
            tracing::debug!(len = payload.len(), "Received message");
            feed.on_message(payload);
        }));
        transport.set_data_callback(Box::new(|data: Vec<u8>| {
            tracing::debug!(len = data.len(), "Received data");
        }));
        transport.set_frame_callback(Box::new(|frame: Frame| {
            tracing::trace!(timestamp = frame.timestamp, len = frame.len(), "Received frame");
        }));
        let gate = ConnectionGate::new(transport.clone());

        Self {
            transport,
            gate,
            queue,
            state: ProtocolState::Idle,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// The inbound queue, for reading messages outside a query.
    pub fn queue(&self) -> &InboundMessageQueue {
        &self.queue
    }

    pub fn gate(&self) -> &ConnectionGate<T> {
        &self.gate
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Pass configuration to the transport. Only allowed before `start`.
    pub fn configure(&mut self, config: TransportConfig) -> Result<(), BridgeError> {
        self.expect(ProtocolState::Idle)?;
        tracing::debug!(url = %config.signalling_url(), "Configuring transport");
        self.transport.set_config(config)?;
        Ok(())
    }

    /// Start signalling and block until connected. Waits forever if the
    /// transport never connects.
    pub fn start(&mut self, poll_interval: Duration) -> Result<(), BridgeError> {
        self.begin()?;
        self.gate.await_connected(poll_interval);
        self.enter_ready();
        Ok(())
    }

    /// Like [`start`](Self::start), failing with
    /// [`BridgeError::ConnectTimeout`] after `timeout`. On timeout the client
    /// stays in `AwaitingConnection`; call [`resume`](Self::resume) to keep
    /// waiting.
    pub fn start_for(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        self.begin()?;
        self.resume(poll_interval, timeout)
    }

    /// Keep waiting for a connection after a timed-out `start_for`.
    pub fn resume(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        self.expect(ProtocolState::AwaitingConnection)?;
        self.gate.await_connected_for(poll_interval, timeout)?;
        self.enter_ready();
        Ok(())
    }

    /// Send `query` and block for the next inbound message.
    pub fn query<Q: Serialize + ?Sized>(&mut self, query: &Q) -> Result<Message, BridgeError> {
        self.send(query)?;
        let answer = self.queue.pop();
        tracing::debug!(len = answer.as_str().len(), "Received answer");
        Ok(answer)
    }

    /// Like [`query`](Self::query), failing with [`BridgeError::ReplyTimeout`]
    /// if nothing arrives within `timeout`. An answer arriving after the
    /// timeout is discarded by the next query's reset.
    pub fn query_timeout<Q: Serialize + ?Sized>(
        &mut self,
        query: &Q,
        timeout: Duration,
    ) -> Result<Message, BridgeError> {
        self.send(query)?;
        self.queue
            .pop_timeout(timeout)
            .ok_or(BridgeError::ReplyTimeout { waited: timeout })
    }

    fn send<Q: Serialize + ?Sized>(&mut self, query: &Q) -> Result<(), BridgeError> {
        self.expect(ProtocolState::Ready)?;
        let value = serde_json::to_value(query).map_err(TransportError::from)?;
        self.queue.reset();
        tracing::debug!(query = %value, "Sending query");
        self.transport.send_json(&value)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), BridgeError> {
        self.expect(ProtocolState::Idle)?;
        tracing::info!("Starting signalling");
        self.transport.start_signalling()?;
        self.state = ProtocolState::AwaitingConnection;
        Ok(())
    }

    fn enter_ready(&mut self) {
        self.queue.reset();
        self.state = ProtocolState::Ready;
    }

    fn expect(&self, expected: ProtocolState) -> Result<(), BridgeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BridgeError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }
}
