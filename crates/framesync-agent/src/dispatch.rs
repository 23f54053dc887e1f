//! Routing of inbound messages and the fault boundary around consumer code.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use framesync_transport::diag;
use framesync_wire::{Message, READY, READY_ACK, RESIZE, SCROLL};
use serde_json::Value;

#[cfg(feature = "schema")]
use framesync_schema::SchemaRegistry;

use crate::error::AgentError;

/// Outcome of a consumer message handler.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// A registered message handler.
pub type Handler = Rc<RefCell<dyn FnMut(&Value) -> HandlerResult>>;

/// Which agent a message is routed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Parent,
    Child,
}

impl Side {
    /// Types handled by the agent itself, which `on_message` cannot claim.
    pub fn is_reserved(self, msg_type: &str) -> bool {
        match self {
            Self::Parent => matches!(msg_type, READY | RESIZE | SCROLL),
            Self::Child => msg_type == READY_ACK,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Child => "child",
        }
    }
}

/// Where an inbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Parent: content size fast path.
    Resize,
    /// Parent: scroll position fast path.
    Scroll,
    /// Parent: readiness announcement.
    Ready,
    /// Child: readiness acknowledgement.
    ReadyAck,
    /// Everything else, looked up in the handler table.
    Generic(String),
}

impl Route {
    pub fn classify(side: Side, msg_type: &str) -> Self {
        match (side, msg_type) {
            (Side::Parent, RESIZE) => Self::Resize,
            (Side::Parent, SCROLL) => Self::Scroll,
            (Side::Parent, READY) => Self::Ready,
            (Side::Child, READY_ACK) => Self::ReadyAck,
            (_, other) => Self::Generic(other.to_string()),
        }
    }
}

/// Message type to handler map. The last registration for a type wins.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `msg_type`. Returns true if it replaced one.
    pub fn insert(
        &mut self,
        msg_type: impl Into<String>,
        handler: impl FnMut(&Value) -> HandlerResult + 'static,
    ) -> bool {
        let handler: Handler = Rc::new(RefCell::new(handler));
        self.handlers.insert(msg_type.into(), handler).is_some()
    }

    pub fn get(&self, msg_type: &str) -> Option<Handler> {
        self.handlers.get(msg_type).cloned()
    }

    pub fn contains(&self, msg_type: &str) -> bool {
        self.handlers.contains_key(msg_type)
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.handlers.keys().collect();
        types.sort_unstable();
        f.debug_struct("HandlerTable").field("types", &types).finish()
    }
}

/// Run consumer code, turning a returned error or a panic into
/// [`AgentError::HandlerFault`].
pub fn run_guarded(msg_type: &str, f: impl FnOnce() -> HandlerResult) -> Result<(), AgentError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AgentError::HandlerFault {
            msg_type: msg_type.to_string(),
            reason: err.to_string(),
        }),
        Err(panic) => Err(AgentError::HandlerFault {
            msg_type: msg_type.to_string(),
            reason: panic_message(panic.as_ref()),
        }),
    }
}

/// Deliver `message` to its handler in `table`, logging faults and misses.
pub(crate) fn dispatch_generic(
    table: &RefCell<HandlerTable>,
    message: &Message,
    log: bool,
    side: Side,
) {
    let handler = table.borrow().get(&message.msg_type);
    let Some(handler) = handler else {
        let err = AgentError::UnknownMessageType(message.msg_type.clone());
        diag!(log, warn, agent = side.label(), error = %err, "dropping message");
        return;
    };

    let payload = message.payload_value();
    let outcome = run_guarded(&message.msg_type, || match handler.try_borrow_mut() {
        Ok(mut handler) => (&mut *handler)(&payload),
        Err(_) => Err("handler is already running".into()),
    });
    if let Err(err) = outcome {
        diag!(log, error, agent = side.label(), error = %err, "message handler failed");
    }
}

/// Optional payload validation applied before generic dispatch.
#[derive(Default)]
pub(crate) struct PayloadCheck {
    #[cfg(feature = "schema")]
    registry: RefCell<Option<Rc<SchemaRegistry>>>,
}

impl PayloadCheck {
    #[cfg(feature = "schema")]
    pub(crate) fn set(&self, registry: Rc<SchemaRegistry>) {
        *self.registry.borrow_mut() = Some(registry);
    }

    #[cfg(feature = "schema")]
    pub(crate) fn allows(&self, message: &Message, log: bool, side: Side) -> bool {
        let registry = self.registry.borrow().clone();
        let Some(registry) = registry else {
            return true;
        };
        match registry.validate_message(message) {
            Ok(()) => true,
            Err(err) => {
                let err = AgentError::from(err);
                diag!(log, warn, agent = side.label(), error = %err, "dropping invalid payload");
                false
            }
        }
    }

    #[cfg(not(feature = "schema"))]
    pub(crate) fn allows(&self, _message: &Message, _log: bool, _side: Side) -> bool {
        true
    }
}

/// Log a fault from a fast-path or readiness callback.
pub(crate) fn report_fault(outcome: Result<(), AgentError>, log: bool, side: Side) {
    if let Err(err) = outcome {
        diag!(log, error, agent = side.label(), error = %err, "callback failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;

    #[test]
    fn classify_reserves_builtin_types_per_side() {
        assert_eq!(Route::classify(Side::Parent, "resize"), Route::Resize);
        assert_eq!(Route::classify(Side::Parent, "scroll"), Route::Scroll);
        assert_eq!(Route::classify(Side::Parent, "ready"), Route::Ready);
        assert_eq!(
            Route::classify(Side::Parent, "init"),
            Route::Generic("init".to_string())
        );
        assert_eq!(Route::classify(Side::Child, "ready_ack"), Route::ReadyAck);
        assert_eq!(
            Route::classify(Side::Child, "resize"),
            Route::Generic("resize".to_string())
        );

        assert!(Side::Parent.is_reserved("resize"));
        assert!(!Side::Parent.is_reserved("ready_ack"));
        assert!(Side::Child.is_reserved("ready_ack"));
        assert!(!Side::Child.is_reserved("scroll"));
    }

    #[test]
    fn last_registration_wins() {
        let mut table = HandlerTable::new();
        let hits = Rc::new(Cell::new(0));

        assert!(!table.insert("greet", |_| Ok(())));
        let sink = Rc::clone(&hits);
        assert!(table.insert("greet", move |_| {
            sink.set(sink.get() + 10);
            Ok(())
        }));
        assert_eq!(table.len(), 1);

        let table = RefCell::new(table);
        let message = Message::new("greet", json!({})).unwrap();
        dispatch_generic(&table, &message, false, Side::Child);
        assert_eq!(hits.get(), 10);
    }

    #[test]
    fn guarded_call_catches_errors_and_panics() {
        assert!(run_guarded("ok", || Ok(())).is_ok());

        let err = run_guarded("bad", || Err("broken".into())).unwrap_err();
        assert!(matches!(
            err,
            AgentError::HandlerFault { ref msg_type, ref reason } if msg_type == "bad" && reason == "broken"
        ));

        let err = run_guarded("boom", || panic!("kaboom")).unwrap_err();
        assert!(err.to_string().contains("kaboom"));
    }

    #[test]
    fn faulty_handler_does_not_block_later_deliveries() {
        let table = RefCell::new(HandlerTable::new());
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        table.borrow_mut().insert("flaky", move |payload: &Value| {
            if payload["fail"] == true {
                panic!("asked to fail");
            }
            sink.set(sink.get() + 1);
            Ok(())
        });

        let fail = Message::new("flaky", json!({ "fail": true })).unwrap();
        let pass = Message::new("flaky", json!({ "fail": false })).unwrap();
        dispatch_generic(&table, &fail, true, Side::Parent);
        dispatch_generic(&table, &pass, true, Side::Parent);
        dispatch_generic(&table, &pass, true, Side::Parent);

        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn unknown_types_are_dropped() {
        let table = RefCell::new(HandlerTable::new());
        let message = Message::new("nobody", Value::Null).unwrap();
        dispatch_generic(&table, &message, true, Side::Child);
        assert!(table.borrow().is_empty());
    }
}
