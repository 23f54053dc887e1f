use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WireError};
use crate::payload::{Dimension, ScrollPosition};

/// Child → parent: readiness announcement, payload is the child's init data.
pub const READY: &str = "ready";

/// Parent → child: acknowledges a readiness announcement.
pub const READY_ACK: &str = "ready_ack";

/// Child → parent: content dimensions changed.
pub const RESIZE: &str = "resize";

/// Child → parent: content scrolled.
pub const SCROLL: &str = "scroll";

/// Child → parent: legacy load notification, delivered like a custom type.
pub const INIT: &str = "init";

/// A tagged message: `{ "type": ..., ...payload }` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Build a message from caller-supplied data.
    ///
    /// `data` must be a JSON object or null. A `type` field inside `data`
    /// never overrides `msg_type`.
    pub fn new(msg_type: impl Into<String>, data: Value) -> Result<Self> {
        let msg_type = msg_type.into();
        if msg_type.is_empty() {
            return Err(WireError::MissingType);
        }
        let mut payload = match data {
            Value::Null => Map::new(),
            Value::Object(fields) => fields,
            other => {
                return Err(WireError::PayloadNotObject {
                    msg_type,
                    kind: kind_of(&other),
                })
            }
        };
        payload.remove("type");
        Ok(Self { msg_type, payload })
    }

    /// Create a readiness announcement.
    pub fn ready(init_data: Option<&Map<String, Value>>) -> Self {
        let mut payload = init_data.cloned().unwrap_or_default();
        payload.remove("type");
        Self {
            msg_type: READY.to_string(),
            payload,
        }
    }

    /// Create a readiness acknowledgement.
    pub fn ready_ack() -> Self {
        Self {
            msg_type: READY_ACK.to_string(),
            payload: Map::new(),
        }
    }

    /// Create a resize notification.
    pub fn resize(dimension: Dimension) -> Self {
        Self::from_typed(RESIZE, &dimension)
    }

    /// Create a scroll notification.
    pub fn scroll(position: ScrollPosition) -> Self {
        Self::from_typed(SCROLL, &position)
    }

    /// Payload fields as a JSON object value.
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }

    /// Decode the payload into a typed structure.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload_value()).map_err(|err| WireError::InvalidPayload {
            msg_type: self.msg_type.clone(),
            reason: err.to_string(),
        })
    }

    fn from_typed<T: Serialize>(msg_type: &str, payload: &T) -> Self {
        let payload = match serde_json::to_value(payload) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        Self {
            msg_type: msg_type.to_string(),
            payload,
        }
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
