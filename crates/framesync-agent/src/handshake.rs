//! Readiness handshake state.
//!
//! The child announces `ready` one scheduler tick after its listener is
//! installed, optionally repeating the announcement until the parent answers
//! with `ready_ack`. The parent marks itself ready on the first announcement
//! and runs the pending readiness callback exactly once.

use serde_json::Value;

/// Callback run once the child has announced readiness.
pub type ReadyCallback = Box<dyn FnOnce(&Value)>;

/// Parent-side readiness state.
#[derive(Default)]
pub struct ReadyGate {
    init_data: Option<Value>,
    pending: Option<ReadyCallback>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.init_data.is_some()
    }

    /// Payload of the first `ready` announcement.
    pub fn init_data(&self) -> Option<&Value> {
        self.init_data.as_ref()
    }

    /// Record a `ready` announcement.
    ///
    /// Returns the pending callback and the payload to run it with on the
    /// first announcement. Repeated announcements return nothing.
    pub fn mark_ready(&mut self, payload: Value) -> Option<(ReadyCallback, Value)> {
        if self.init_data.is_some() {
            return None;
        }
        self.init_data = Some(payload.clone());
        self.pending.take().map(|callback| (callback, payload))
    }

    /// Register a readiness callback.
    ///
    /// Before readiness the callback is kept, replacing any earlier one.
    /// After readiness it is handed back with the recorded payload so the
    /// caller can run it immediately.
    pub fn register(&mut self, callback: ReadyCallback) -> Option<(ReadyCallback, Value)> {
        match &self.init_data {
            Some(payload) => Some((callback, payload.clone())),
            None => {
                self.pending = Some(callback);
                None
            }
        }
    }

    /// Drop the pending callback.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl std::fmt::Debug for ReadyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyGate")
            .field("ready", &self.is_ready())
            .field("pending", &self.has_pending())
            .finish()
    }
}

/// Child-side announcement state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyAnnouncer {
    retries_left: u32,
    acknowledged: bool,
}

impl ReadyAnnouncer {
    pub fn new(retries: u32) -> Self {
        Self {
            retries_left: retries,
            acknowledged: false,
        }
    }

    /// Record the parent's acknowledgement. Returns false if already recorded.
    pub fn acknowledge(&mut self) -> bool {
        !std::mem::replace(&mut self.acknowledged, true)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Consume one re-announcement if any remain and no ack has arrived.
    pub fn take_retry(&mut self) -> bool {
        if self.acknowledged || self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        true
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, ReadyCallback) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        (calls, Box::new(move |payload: &Value| sink.borrow_mut().push(payload.clone())))
    }

    fn run(pair: Option<(ReadyCallback, Value)>) {
        if let Some((callback, payload)) = pair {
            callback(&payload);
        }
    }

    #[test]
    fn callback_registered_before_ready_fires_on_announcement() {
        let mut gate = ReadyGate::new();
        let (calls, callback) = recorder();

        run(gate.register(callback));
        assert!(calls.borrow().is_empty());

        run(gate.mark_ready(json!({ "theme": "dark" })));
        assert!(gate.is_ready());
        assert_eq!(calls.borrow().as_slice(), [json!({ "theme": "dark" })]);

        run(gate.mark_ready(json!({ "theme": "light" })));
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(gate.init_data(), Some(&json!({ "theme": "dark" })));
    }

    #[test]
    fn callback_registered_after_ready_runs_immediately() {
        let mut gate = ReadyGate::new();
        run(gate.mark_ready(json!({})));

        let (calls, callback) = recorder();
        run(gate.register(callback));
        assert_eq!(calls.borrow().len(), 1);
        assert!(!gate.has_pending());
    }

    #[test]
    fn later_registration_replaces_pending_one() {
        let mut gate = ReadyGate::new();
        let (first, first_cb) = recorder();
        let (second, second_cb) = recorder();

        run(gate.register(first_cb));
        run(gate.register(second_cb));
        run(gate.mark_ready(json!({})));

        assert!(first.borrow().is_empty());
        assert_eq!(second.borrow().len(), 1);
    }

    #[test]
    fn announcer_stops_after_ack_or_exhaustion() {
        let mut announcer = ReadyAnnouncer::new(2);
        assert!(announcer.take_retry());
        assert!(announcer.take_retry());
        assert!(!announcer.take_retry());

        let mut acked = ReadyAnnouncer::new(5);
        assert!(acked.acknowledge());
        assert!(!acked.acknowledge());
        assert!(!acked.take_retry());
        assert_eq!(acked.retries_left(), 5);
    }
}
