//! Payloads delivered by the transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inbound control message.
///
/// The payload is kept as received (usually serialized JSON, sometimes plain
/// text). Nothing is parsed until the caller asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(String);

impl Message {
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse the payload as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for Message {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Message {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A media frame handed over by the transport.
///
/// Frames are only ever logged by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// RTP timestamp of the frame.
    pub timestamp: u32,
    /// Encoded frame bytes.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(timestamp: u32, data: Vec<u8>) -> Self {
        Self { timestamp, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_parsed_on_demand() {
        let msg = Message::new(r#"{"ok":true}"#);
        assert_eq!(msg.json().unwrap()["ok"], serde_json::Value::Bool(true));
        assert_eq!(msg, r#"{"ok":true}"#);
    }

    #[test]
    fn raw_text_stays_raw() {
        let msg = Message::from("not json");
        assert!(msg.json().is_err());
        assert_eq!(msg.to_string(), "not json");
    }
}
