use std::rc::Rc;

use framesync_agent::{AgentError, AgentOptions, ParentAgent, ParentConfig};
use framesync_transport::diag;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlIFrameElement, Window};

use crate::error::{describe, to_js_error, to_json};
use crate::handler::js_handler;
use crate::host::BrowserEndpoint;

const AGENT: &str = "parent";

/// Agent for the page that embeds an iframe.
#[wasm_bindgen(js_name = ParentAgent)]
pub struct JsParentAgent {
    agent: ParentAgent,
}

impl JsParentAgent {
    fn handle(&self) -> Self {
        Self {
            agent: self.agent.clone(),
        }
    }
}

#[wasm_bindgen(js_class = ParentAgent)]
impl JsParentAgent {
    /// Listen to the iframe given as an element or a CSS selector.
    ///
    /// `options.onResize(width, height)` and `options.onScroll(left, top)`
    /// receive the child's reports. An unresolvable iframe or invalid
    /// options yield an inert agent; `startupError` says why.
    #[wasm_bindgen(constructor)]
    pub fn new(target: JsValue, options: JsValue) -> Result<JsParentAgent, JsError> {
        let window = web_sys::window().ok_or_else(|| JsError::new("no global window"))?;
        let json = to_json(&options).map_err(|err| to_js_error("unreadable options", err))?;

        let (agent_options, rejected) = match AgentOptions::from_value(json) {
            Ok(agent_options) => (agent_options, None),
            Err(err) => (AgentOptions::default(), Some(err)),
        };
        let config = with_callbacks(ParentConfig::new(agent_options), &options);

        let agent = match rejected {
            Some(err) => ParentAgent::detached(config, err),
            None => match resolve_frame(&window, &target) {
                Ok(frame) => ParentAgent::new(config, Rc::new(BrowserEndpoint::new(window, frame))),
                Err(err) => ParentAgent::detached(config, err),
            },
        };
        Ok(Self { agent })
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.agent.state().to_string()
    }

    #[wasm_bindgen(getter, js_name = startupError)]
    pub fn startup_error(&self) -> Option<String> {
        self.agent.startup_error().map(ToString::to_string)
    }

    #[wasm_bindgen(getter, js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.agent.is_ready()
    }

    /// Run `callback(initData)` once the child is ready, or right away if
    /// it already is. A later call replaces a pending callback.
    #[wasm_bindgen(js_name = onReady)]
    pub fn on_ready(&self, callback: js_sys::Function) -> JsParentAgent {
        let log = self.agent.options().log;
        let mut call = js_handler(callback);
        self.agent.on_ready(move |data| {
            if let Err(err) = call(data) {
                diag!(log, error, agent = AGENT, error = %err, "ready callback failed");
            }
        });
        self.handle()
    }

    /// Register `callback(data)` for messages of `type` from the child.
    #[wasm_bindgen(js_name = onMessage)]
    pub fn on_message(&self, msg_type: &str, callback: js_sys::Function) -> JsParentAgent {
        self.agent.on_message(msg_type, js_handler(callback));
        self.handle()
    }

    /// Post `{ type, ...data }` to the child.
    #[wasm_bindgen(js_name = sendMessage)]
    pub fn send_message(&self, msg_type: &str, data: JsValue) -> JsParentAgent {
        match to_json(&data) {
            Ok(data) => {
                self.agent.send_message(msg_type, data);
            }
            Err(err) => {
                diag!(self.agent.options().log, warn, agent = AGENT, msg_type, error = %err, "message data not sent");
            }
        }
        self.handle()
    }

    pub fn destroy(&self) {
        self.agent.destroy();
    }
}

/// The content window of the iframe `target` names.
fn resolve_frame(window: &Window, target: &JsValue) -> Result<Window, AgentError> {
    let element = match target.as_string() {
        Some(selector) => window
            .document()
            .ok_or_else(|| AgentError::Configuration("window has no document".to_string()))?
            .query_selector(&selector)
            .map_err(|err| {
                AgentError::Configuration(format!("invalid selector '{selector}': {}", describe(&err)))
            })?
            .ok_or_else(|| AgentError::Configuration(format!("no element matches '{selector}'")))?
            .dyn_into::<HtmlIFrameElement>()
            .map_err(|_| AgentError::Configuration(format!("'{selector}' is not an iframe")))?,
        None => target
            .clone()
            .dyn_into::<HtmlIFrameElement>()
            .map_err(|_| AgentError::Configuration("target is not an iframe element".to_string()))?,
    };
    element
        .content_window()
        .ok_or_else(|| AgentError::Configuration("iframe has no content window".to_string()))
}

/// Attach `onResize`/`onScroll` functions found on the JS options object.
fn with_callbacks(mut config: ParentConfig, options: &JsValue) -> ParentConfig {
    let log = config.options.log;
    if let Some(callback) = function_property(options, "onResize") {
        config = config.on_resize(move |width, height| {
            let width = width.map_or(JsValue::UNDEFINED, JsValue::from_f64);
            if let Err(err) = callback.call2(&JsValue::NULL, &width, &JsValue::from_f64(height)) {
                diag!(log, error, agent = AGENT, error = %describe(&err), "onResize callback failed");
            }
        });
    }
    if let Some(callback) = function_property(options, "onScroll") {
        config = config.on_scroll(move |left, top| {
            let (left, top) = (JsValue::from_f64(left), JsValue::from_f64(top));
            if let Err(err) = callback.call2(&JsValue::NULL, &left, &top) {
                diag!(log, error, agent = AGENT, error = %describe(&err), "onScroll callback failed");
            }
        });
    }
    config
}

fn function_property(object: &JsValue, name: &str) -> Option<js_sys::Function> {
    if !object.is_object() {
        return None;
    }
    js_sys::Reflect::get(object, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<js_sys::Function>().ok())
}
