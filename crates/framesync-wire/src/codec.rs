use serde_json::Value;

use crate::error::{Result, WireError};
use crate::message::Message;

/// Encode a message as the flat object posted across contexts.
pub fn encode_message(message: &Message) -> Value {
    let mut fields = message.payload.clone();
    fields.remove("type");
    fields.insert("type".to_string(), Value::String(message.msg_type.clone()));
    Value::Object(fields)
}

/// Decode inbound data into a message.
///
/// Anything other than an object with a non-empty string `type` is
/// rejected with [`WireError::MissingType`].
pub fn decode_message(data: Value) -> Result<Message> {
    let Value::Object(mut fields) = data else {
        return Err(WireError::MissingType);
    };
    match fields.remove("type") {
        Some(Value::String(msg_type)) if !msg_type.is_empty() => Ok(Message {
            msg_type,
            payload: fields,
        }),
        _ => Err(WireError::MissingType),
    }
}
