//! Peer server implementation.

use crate::protocol::{self, Reply};
use futures_util::{SinkExt, StreamExt};
use rtcbridge_core::framing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

pub async fn run(addr: SocketAddr, objects: Vec<String>) -> anyhow::Result<()> {
    let objects = Arc::new(objects);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let objects = objects.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, objects).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    objects: Arc<Vec<String>>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    tracing::debug!("New connection from {}", addr);

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let reply = protocol::answer(&objects, text.as_str());
                log_reply(&reply);
                sink.send(Message::Text(serde_json::to_string(&reply)?.into()))
                    .await?;
            }
            Message::Binary(bytes) => {
                // Framed requests get a framed `Response` back.
                let Some(json) = unframe(&bytes) else {
                    tracing::warn!("Ignoring {} bytes of unframed data", bytes.len());
                    continue;
                };
                let reply = protocol::answer(&objects, json);
                log_reply(&reply);
                let mut payload = vec![1u8];
                payload.extend_from_slice(serde_json::to_string(&reply)?.as_bytes());
                sink.send(Message::Binary(payload.into())).await?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}

/// Strip the `[kind][u16 len]...[0]` wrapper the bridge puts on framed JSON.
fn unframe(bytes: &[u8]) -> Option<&str> {
    if bytes.first() != Some(&framing::UI_INTERACTION) || bytes.len() < 3 {
        return None;
    }
    let len = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
    let body = bytes.get(3..3 + len)?;
    std::str::from_utf8(body).ok()
}

fn log_reply(reply: &Reply) {
    match reply {
        Reply::Error { message } => tracing::warn!("Rejected request: {}", message),
        _ => tracing::info!("Answered query"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unframe_round_trips_bridge_frames() {
        let frame = framing::encode_json(framing::UI_INTERACTION, r#"{"type":"query"}"#).unwrap();
        assert_eq!(unframe(&frame), Some(r#"{"type":"query"}"#));
        assert_eq!(unframe(&[1, 2, 0, b'{', b'}']), None);
        assert_eq!(unframe(&[50, 9, 0, b'{']), None);
    }
}
