use serde_json::Value;
use wasm_bindgen::{JsError, JsValue};

pub(crate) fn to_js_error(context: &str, err: impl std::fmt::Display) -> JsError {
    JsError::new(&format!("{context}: {err}"))
}

/// Render a thrown JS value for a log line or error message.
pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    js_sys::JSON::stringify(value)
        .ok()
        .and_then(|text| text.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Convert a structured-clone-able JS value into JSON.
///
/// `undefined`, functions and other values JSON cannot carry become `null`.
pub(crate) fn to_json(value: &JsValue) -> Result<Value, String> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = js_sys::JSON::stringify(value).map_err(|err| describe(&err))?;
    match text.as_string() {
        Some(text) => serde_json::from_str(&text).map_err(|err| err.to_string()),
        None => Ok(Value::Null),
    }
}

pub(crate) fn to_js(value: &Value) -> Result<JsValue, String> {
    let text = serde_json::to_string(value).map_err(|err| err.to_string())?;
    js_sys::JSON::parse(&text).map_err(|err| describe(&err))
}
