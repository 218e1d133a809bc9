//! Data-channel framing used by pixel-streaming peers.
//!
//! Outgoing JSON is wrapped as `[kind][u16 LE length][json][0x00]`. Incoming
//! binary payloads start with a kind byte; some kinds carry a JSON document,
//! possibly UTF-16LE encoded and padded with other bytes, which [`decode`]
//! extracts.

/// Kind byte for UI interaction messages sent to the peer.
pub const UI_INTERACTION: u8 = 50;

/// The first byte of an inbound data-channel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    QualityControlOwnership,
    Response,
    Command,
    FreezeFrame,
    UnfreezeFrame,
    VideoEncoderAvgQp,
    LatencyTest,
    InitialSettings,
    FileExtension,
    FileMimeType,
    FileContents,
    TestEcho,
    InputControlOwnership,
    GamepadResponse,
    Protocol,
    Unknown(u8),
}

impl InboundKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::QualityControlOwnership,
            1 => Self::Response,
            2 => Self::Command,
            3 => Self::FreezeFrame,
            4 => Self::UnfreezeFrame,
            5 => Self::VideoEncoderAvgQp,
            6 => Self::LatencyTest,
            7 => Self::InitialSettings,
            8 => Self::FileExtension,
            9 => Self::FileMimeType,
            10 => Self::FileContents,
            11 => Self::TestEcho,
            12 => Self::InputControlOwnership,
            13 => Self::GamepadResponse,
            255 => Self::Protocol,
            other => Self::Unknown(other),
        }
    }

    /// Kinds whose payload may be a text message.
    pub fn carries_text(self) -> bool {
        matches!(self, Self::Response | Self::InitialSettings | Self::Protocol)
    }
}

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A JSON document found in the payload.
    Message(String),
    /// Anything else, passed through unchanged.
    Data(Vec<u8>),
}

/// Payloads shorter than this cannot hold a JSON object and a kind byte.
const MIN_TEXT_PAYLOAD: usize = 5;

/// Wrap a JSON document for the data channel.
///
/// Fails if the document does not fit the u16 length prefix.
pub fn encode_json(kind: u8, json: &str) -> Option<Vec<u8>> {
    let len = u16::try_from(json.len()).ok()?;
    let mut frame = Vec::with_capacity(json.len() + 4);
    frame.push(kind);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(json.as_bytes());
    frame.push(0);
    Some(frame)
}

/// Split an inbound binary payload into a message or raw data.
pub fn decode(payload: &[u8]) -> Inbound {
    let Some(&first) = payload.first() else {
        return Inbound::Data(Vec::new());
    };
    let kind = InboundKind::from_byte(first);
    tracing::trace!(?kind, len = payload.len(), "Decoding data-channel payload");
    if !kind.carries_text() || payload.len() < MIN_TEXT_PAYLOAD {
        return Inbound::Data(payload.to_vec());
    }

    let body = &payload[1..];
    let text = if looks_wide(body) {
        narrow(body)
    } else {
        String::from_utf8_lossy(body).into_owned()
    };
    match balanced_object(&text) {
        Some(json) => Inbound::Message(json.to_string()),
        None => Inbound::Data(payload.to_vec()),
    }
}

/// UTF-16LE ASCII text has a zero in every odd byte.
fn looks_wide(body: &[u8]) -> bool {
    body.len() >= 4 && body[1] == 0 && body[3] == 0
}

fn narrow(body: &[u8]) -> String {
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// The first `{...}` with balanced braces.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let frame = encode_json(UI_INTERACTION, r#"{"a":1}"#).unwrap();
        assert_eq!(frame[0], 50);
        assert_eq!(u16::from_le_bytes([frame[1], frame[2]]), 7);
        assert_eq!(&frame[3..10], br#"{"a":1}"#);
        assert_eq!(*frame.last().unwrap(), 0);
        assert_eq!(frame.len(), 7 + 4);
    }

    #[test]
    fn encode_rejects_oversized() {
        let big = "x".repeat(u16::MAX as usize + 1);
        assert!(encode_json(UI_INTERACTION, &big).is_none());
    }

    #[test]
    fn decode_response_with_padding() {
        let mut payload = vec![1];
        payload.extend_from_slice(b"\x10\x00{\"ok\":{\"n\":1}}\x00trailing");
        assert_eq!(
            decode(&payload),
            Inbound::Message(r#"{"ok":{"n":1}}"#.to_string())
        );
    }

    #[test]
    fn decode_utf16_response() {
        let mut payload = vec![1];
        for unit in r#"{"ok":true}"#.encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(
            decode(&payload),
            Inbound::Message(r#"{"ok":true}"#.to_string())
        );
    }

    #[test]
    fn non_text_kinds_are_data() {
        let payload = vec![3, b'{', b'}', 0, 0, 0];
        assert_eq!(decode(&payload), Inbound::Data(payload.clone()));
    }

    #[test]
    fn short_or_unbalanced_payloads_are_data() {
        assert_eq!(decode(&[1, b'{', b'}']), Inbound::Data(vec![1, b'{', b'}']));
        let unbalanced = b"\x01{\"a\":{\"b\":1}".to_vec();
        assert_eq!(decode(&unbalanced), Inbound::Data(unbalanced.clone()));
        assert_eq!(decode(&[]), Inbound::Data(Vec::new()));
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(InboundKind::from_byte(255), InboundKind::Protocol);
        assert_eq!(InboundKind::from_byte(42), InboundKind::Unknown(42));
        assert!(InboundKind::from_byte(7).carries_text());
        assert!(!InboundKind::from_byte(0).carries_text());
    }
}
