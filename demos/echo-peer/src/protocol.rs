//! Control messages the peer understands.

use serde::{Deserialize, Serialize};

/// Requests sent by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// List objects, or describe one if `object` is set.
    Query { object: Option<String> },
}

/// Replies sent back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// All known objects.
    Answer { data: Vec<String> },
    /// Details on one object.
    Object { name: String, index: usize },
    Error { message: String },
}

/// Dispatch a raw request against the object list.
pub fn answer(objects: &[String], raw: &str) -> Reply {
    let request: Request = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            return Reply::Error {
                message: format!("unrecognized request: {e}"),
            };
        }
    };
    match request {
        Request::Query { object: None } => Reply::Answer {
            data: objects.to_vec(),
        },
        Request::Query { object: Some(name) } => match objects.iter().position(|o| *o == name) {
            Some(index) => Reply::Object { name, index },
            None => Reply::Error {
                message: format!("unknown object: {name}"),
            },
        },
    }
}
