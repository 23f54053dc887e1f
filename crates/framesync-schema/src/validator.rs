use jsonschema::Validator;
use serde_json::Value;

use crate::error::{Result, SchemaError};

pub(crate) fn validate_payload(msg_type: &str, payload: &Value, validator: &Validator) -> Result<()> {
    let mut errors = validator.iter_errors(payload);
    if let Some(first) = errors.next() {
        let mut message = first.to_string();
        for err in errors.take(3) {
            message.push_str("; ");
            message.push_str(&err.to_string());
        }
        return Err(SchemaError::ValidationFailed {
            msg_type: msg_type.to_string(),
            message,
        });
    }

    Ok(())
}
