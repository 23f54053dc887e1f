//! Browser binding for framesync.
//!
//! Exports `ChildAgent` and `ParentAgent` to JavaScript, running the agents
//! over `window.postMessage`, `ResizeObserver` and `setTimeout`.
//!
//! ```js
//! import init, { ChildAgent, initPanicHook } from "framesync-wasm";
//!
//! await init();
//! initPanicHook();
//! const child = new ChildAgent({ targetOrigin: "https://parent.example" });
//! child.onMessage("theme", (data) => applyTheme(data.name));
//! ```

mod child;
mod document;
mod error;
mod handler;
mod host;
mod logging;
mod parent;

pub use child::JsChildAgent;
pub use parent::JsParentAgent;

use wasm_bindgen::prelude::*;

/// Route Rust panics to `console.error`.
#[wasm_bindgen(js_name = initPanicHook)]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Print agent diagnostics to the console at `level` and above.
///
/// Agents still only emit diagnostics when created with `log: true`.
/// Returns false if logging was already initialized.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) -> Result<bool, JsError> {
    let level = logging::parse_level(level).map_err(|err| JsError::new(&err))?;
    Ok(logging::init_logging(level))
}
