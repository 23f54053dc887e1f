use std::rc::Rc;

use framesync_agent::{ChildAgent, ChildContext, ChildRegistry};
use framesync_transport::diag;
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::document::BrowserDocument;
use crate::error::{to_js_error, to_json};
use crate::handler::js_handler;
use crate::host::{BrowserEndpoint, BrowserScheduler};

thread_local! {
    static REGISTRY: ChildRegistry = ChildRegistry::new();
}

/// Agent for the document running inside an iframe.
///
/// Only one is live per page: constructing another destroys the previous one.
#[wasm_bindgen(js_name = ChildAgent)]
pub struct JsChildAgent {
    agent: ChildAgent,
}

impl JsChildAgent {
    fn handle(&self) -> Self {
        Self {
            agent: self.agent.clone(),
        }
    }
}

#[wasm_bindgen(js_class = ChildAgent)]
impl JsChildAgent {
    /// Start reporting size and scroll to the embedding page.
    ///
    /// Invalid options, or a page that is not embedded, yield an inert agent;
    /// `startupError` says why.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<JsChildAgent, JsError> {
        let window = web_sys::window().ok_or_else(|| JsError::new("no global window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsError::new("window has no document"))?;
        let options = to_json(&options).map_err(|err| to_js_error("unreadable options", err))?;
        let log = options.get("log").and_then(Value::as_bool).unwrap_or(false);

        // A top-level window is its own parent; the agent then stays inert.
        let parent = window
            .parent()
            .ok()
            .flatten()
            .unwrap_or_else(|| window.clone());
        let context = ChildContext::new(
            Rc::new(BrowserEndpoint::new(window.clone(), parent)),
            Rc::new(BrowserScheduler::new(window.clone(), log)),
            Rc::new(BrowserDocument::new(window, document, log)),
        );
        let agent = REGISTRY.with(|registry| registry.create_from_value(options, context));
        Ok(Self { agent })
    }

    /// The live agent, if one was created and not destroyed.
    pub fn current() -> Option<JsChildAgent> {
        REGISTRY
            .with(ChildRegistry::current)
            .map(|agent| Self { agent })
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.agent.state().to_string()
    }

    #[wasm_bindgen(getter, js_name = startupError)]
    pub fn startup_error(&self) -> Option<String> {
        self.agent.startup_error().map(ToString::to_string)
    }

    #[wasm_bindgen(getter, js_name = isAcknowledged)]
    pub fn is_acknowledged(&self) -> bool {
        self.agent.is_acknowledged()
    }

    /// Register `callback(data)` for messages of `type` from the parent.
    #[wasm_bindgen(js_name = onMessage)]
    pub fn on_message(&self, msg_type: &str, callback: js_sys::Function) -> JsChildAgent {
        self.agent.on_message(msg_type, js_handler(callback));
        self.handle()
    }

    /// Post `{ type, ...data }` to the parent.
    #[wasm_bindgen(js_name = sendMessage)]
    pub fn send_message(&self, msg_type: &str, data: JsValue) -> JsChildAgent {
        match to_json(&data) {
            Ok(data) => {
                self.agent.send_message(msg_type, data);
            }
            Err(err) => {
                diag!(self.agent.options().log, warn, agent = "child", msg_type, error = %err, "message data not sent");
            }
        }
        self.handle()
    }

    /// Measure now; `force` reports the size even if unchanged.
    #[wasm_bindgen(js_name = checkLayout)]
    pub fn check_layout(&self, force: Option<bool>) {
        self.agent.check_layout(force.unwrap_or(false));
    }

    pub fn destroy(&self) {
        self.agent.destroy();
    }
}
