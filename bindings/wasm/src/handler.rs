use framesync_agent::HandlerResult;
use serde_json::Value;
use wasm_bindgen::JsValue;

use crate::error::{describe, to_js};

/// Adapt a JS function into a message handler.
///
/// A throwing callback becomes a handler fault, which the agent logs and
/// isolates.
pub(crate) fn js_handler(callback: js_sys::Function) -> impl FnMut(&Value) -> HandlerResult {
    move |data: &Value| {
        let data = to_js(data)?;
        callback
            .call1(&JsValue::NULL, &data)
            .map_err(|err| describe(&err))?;
        Ok(())
    }
}
