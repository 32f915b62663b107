//! Push message envelope: `{type, order}`.

use serde::Deserialize;
use serde_json::{Map, Value};

/// What a push message announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushKind {
    /// Fields of an existing order changed.
    OrderUpdate,
    /// An order was created; too little context to merge, so re-fetch.
    OrderCreated,
    /// Any other type, merged like an update.
    Other(String),
}

impl From<&str> for PushKind {
    fn from(s: &str) -> Self {
        match s {
            "order_update" => Self::OrderUpdate,
            "order_created" => Self::OrderCreated,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEnvelope {
    pub kind: PushKind,
    pub order: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    order: Option<Value>,
}

impl PushEnvelope {
    /// Decode a raw message. Returns `None` for anything that is not a JSON
    /// object; a missing or non-object `order` decodes as empty.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let envelope: RawEnvelope = serde_json::from_str(raw).ok()?;
        let order = match envelope.order {
            Some(Value::Object(order)) => order,
            _ => Map::new(),
        };
        Some(Self {
            kind: PushKind::from(envelope.kind.as_str()),
            order,
        })
    }
}
