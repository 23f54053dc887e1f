//! `Endpoint` and `Scheduler` over a browser window.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use framesync_transport::{
    diag, ContextId, Endpoint, InboundEvent, Listener, ListenerId, Result, Scheduler,
    TargetOrigin, Task, TransportError,
};
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{MessageEvent, Window};

use crate::error::{describe, to_js, to_json};

/// Id the endpoint reports for the window it posts to.
pub(crate) const REMOTE: ContextId = ContextId::new(1);
/// Id given to every other sender.
pub(crate) const FOREIGN: ContextId = ContextId::new(2);

type MessageClosure = Closure<dyn FnMut(MessageEvent)>;

/// Posts to `remote` and listens for `message` events on `local`.
pub(crate) struct BrowserEndpoint {
    local: Window,
    remote: Window,
    listeners: RefCell<HashMap<u64, MessageClosure>>,
    next_listener: Cell<u64>,
}

impl BrowserEndpoint {
    pub(crate) fn new(local: Window, remote: Window) -> Self {
        Self {
            local,
            remote,
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(1),
        }
    }
}

impl Endpoint for BrowserEndpoint {
    fn remote(&self) -> ContextId {
        REMOTE
    }

    fn post(&self, data: Value, target_origin: &TargetOrigin) -> Result<()> {
        let message = to_js(&data).map_err(TransportError::Post)?;
        self.remote
            .post_message(&message, target_origin.as_str())
            .map_err(|err| TransportError::Post(describe(&err)))
    }

    fn add_listener(&self, mut listener: Listener) -> Result<ListenerId> {
        let remote = JsValue::from(self.remote.clone());
        let closure = MessageClosure::new(move |event: MessageEvent| {
            let source = event.source().map(|source| {
                if JsValue::from(source) == remote {
                    REMOTE
                } else {
                    FOREIGN
                }
            });
            // Data JSON cannot carry is treated as untyped and dropped by the channel.
            let data = to_json(&event.data()).unwrap_or(Value::Null);
            listener(InboundEvent {
                origin: event.origin(),
                source,
                data,
            });
        });
        self.local
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .map_err(|err| TransportError::Listen(describe(&err)))?;

        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().insert(id, closure);
        Ok(ListenerId::new(id))
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.borrow_mut().remove(&id.raw());
        let Some(closure) = removed else {
            return false;
        };
        let _ = self
            .local
            .remove_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
        true
    }
}

impl Drop for BrowserEndpoint {
    fn drop(&mut self) {
        for (_, closure) in self.listeners.get_mut().drain() {
            let _ = self
                .local
                .remove_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
        }
    }
}

/// Runs deferred tasks through `setTimeout`.
pub(crate) struct BrowserScheduler {
    window: Window,
    log: bool,
}

impl BrowserScheduler {
    pub(crate) fn new(window: Window, log: bool) -> Self {
        Self { window, log }
    }
}

impl Scheduler for BrowserScheduler {
    fn defer(&self, task: Task) {
        self.defer_for(Duration::ZERO, task);
    }

    fn defer_for(&self, delay: Duration, task: Task) {
        let callback = Closure::once_into_js(move || task());
        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        if let Err(err) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis)
        {
            diag!(self.log, warn, error = %describe(&err), "failed to schedule task");
        }
    }
}
