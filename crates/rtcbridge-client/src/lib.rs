//! WebSocket transport for rtcbridge.
//!
//! [`WsTransport`] implements [`Transport`] over a single WebSocket
//! connection. The socket is driven by a current-thread tokio runtime on a
//! dedicated thread, so callbacks fire on that thread while the application
//! blocks in the bridge.
//!
//! Text frames are delivered as messages. Binary frames go through
//! [`framing::decode`] and end up as messages or raw data. This transport
//! carries no media, so the frame callback never fires.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rtcbridge_core::framing::{self, Inbound};
use rtcbridge_core::{
    ConnectionState, DataCallback, FrameCallback, MessageCallback, StateCallback, Transport,
    TransportConfig, TransportError,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

type Slot<F> = Mutex<Option<Arc<F>>>;

/// State shared between the API side and the socket thread.
#[derive(Default)]
struct Shared {
    state: Mutex<ConnectionState>,
    config: Mutex<Option<TransportConfig>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    on_message: Slot<dyn Fn(String) + Send + Sync>,
    on_data: Slot<dyn Fn(Vec<u8>) + Send + Sync>,
    on_state: Slot<dyn Fn(ConnectionState) + Send + Sync>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state;
        }
        tracing::debug!(%state, "WebSocket transport state");
        // Callbacks run without any lock held.
        let callback = self.on_state.lock().clone();
        if let Some(callback) = callback {
            callback(state);
        }
    }

    fn deliver_message(&self, payload: String) {
        let callback = self.on_message.lock().clone();
        match callback {
            Some(callback) => callback(payload),
            None => tracing::debug!(len = payload.len(), "Dropping message, no callback set"),
        }
    }

    fn deliver_data(&self, data: Vec<u8>) {
        let callback = self.on_data.lock().clone();
        match callback {
            Some(callback) => callback(data),
            None => tracing::debug!(len = data.len(), "Dropping data, no callback set"),
        }
    }
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// A [`Transport`] over one WebSocket connection to `ws://host:port`.
#[derive(Default)]
pub struct WsTransport {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the socket and wait for the socket thread to exit.
    pub fn close(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.shutdown.send(());
        if worker.thread.join().is_err() {
            tracing::error!("WebSocket thread panicked");
        }
        self.shared.outgoing.lock().take();
        if !self.shared.state.lock().is_terminal() {
            self.shared.set_state(ConnectionState::Closed);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for WsTransport {
    fn set_config(&self, config: TransportConfig) -> Result<(), TransportError> {
        *self.shared.config.lock() = Some(config);
        Ok(())
    }

    fn start_signalling(&self) -> Result<(), TransportError> {
        let config = self
            .shared
            .config
            .lock()
            .clone()
            .ok_or(TransportError::MissingConfig("signalling_host"))?;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!("Signalling already started");
            return Ok(());
        }

        let url = config.signalling_url();
        tracing::info!(%url, "Starting signalling");
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shared.outgoing.lock() = Some(out_tx);
        self.shared.set_state(ConnectionState::Startup);

        let shared = self.shared.clone();
        let thread = std::thread::Builder::new()
            .name("rtcbridge-ws".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!("Failed to build runtime: {}", e);
                        shared.set_state(ConnectionState::Error);
                        return;
                    }
                };
                runtime.block_on(run(shared, url, out_rx, shutdown_rx));
            })
            .map_err(|e| TransportError::Io(e.to_string()))?;

        *worker = Some(Worker {
            shutdown: shutdown_tx,
            thread,
        });
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        *self.shared.on_message.lock() = Some(Arc::from(callback));
    }

    fn set_data_callback(&self, callback: DataCallback) {
        *self.shared.on_data.lock() = Some(Arc::from(callback));
    }

    fn set_frame_callback(&self, _callback: FrameCallback) {
        tracing::debug!("WebSocket transport carries no media, frame callback ignored");
    }

    fn set_state_callback(&self, callback: StateCallback) {
        *self.shared.on_state.lock() = Some(Arc::from(callback));
    }

    fn send_json(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        if !self.state().is_connected() {
            return Err(TransportError::NotConnected);
        }
        let text = serde_json::to_string(value)?;
        let framed = self
            .shared
            .config
            .lock()
            .as_ref()
            .is_some_and(|config| config.framed);
        let message = if framed {
            let frame = framing::encode_json(framing::UI_INTERACTION, &text)
                .ok_or(TransportError::TooLarge(text.len()))?;
            WsMessage::Binary(frame.into())
        } else {
            WsMessage::Text(text.into())
        };

        let outgoing = self.shared.outgoing.lock();
        let sender = outgoing.as_ref().ok_or(TransportError::Closed)?;
        sender.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Socket loop: connect, then pump outgoing and incoming frames until
/// either side closes.
async fn run(
    shared: Arc<Shared>,
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<WsMessage>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let ws = tokio::select! {
        connected = tokio_tungstenite::connect_async(url.as_str()) => match connected {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", url, e);
                shared.set_state(ConnectionState::Error);
                return;
            }
        },
        _ = &mut shutdown => return,
    };
    let (mut sink, mut stream) = ws.split();
    tracing::info!("Connected to {}", url);
    shared.set_state(ConnectionState::Connected);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }

            msg = outgoing.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!("Send failed: {}", e);
                    shared.set_state(ConnectionState::Error);
                    return;
                }
            }

            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        shared.set_state(ConnectionState::Error);
                        return;
                    }
                    None => break,
                };
                match msg {
                    WsMessage::Text(text) => shared.deliver_message(text.as_str().to_owned()),
                    WsMessage::Binary(bytes) => match framing::decode(&bytes) {
                        Inbound::Message(text) => shared.deliver_message(text),
                        Inbound::Data(data) => shared.deliver_data(data),
                    },
                    WsMessage::Close(frame) => {
                        tracing::info!("Peer closed connection: {:?}", frame);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    shared.set_state(ConnectionState::Closed);
}
