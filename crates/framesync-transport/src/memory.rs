//! In-memory simulated host.
//!
//! [`EventLoop`] is a single-threaded task queue with virtual time, and
//! [`MemoryBus`] is a set of browsing contexts (windows and embedded frames)
//! that post messages to each other through it. Delivery follows the
//! browser rules the agents rely on:
//! - posting only queues a delivery task; listeners run on a later turn
//! - messages in one direction arrive in send order
//! - a non-wildcard target origin must equal the receiver's origin, or the
//!   message is silently discarded

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, TransportError};
use crate::origin::TargetOrigin;
use crate::traits::{ContextId, Endpoint, InboundEvent, Listener, ListenerId, Scheduler, Task};

/// Upper bound on tasks run by one `run_until_idle` call.
const MAX_TURNS: usize = 100_000;

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

/// Deterministic single-threaded event loop with virtual time.
pub struct EventLoop {
    queue: RefCell<VecDeque<Task>>,
    timers: RefCell<Vec<Timer>>,
    now: Cell<Duration>,
    next_timer_seq: Cell<u64>,
}

impl EventLoop {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            queue: RefCell::new(VecDeque::new()),
            timers: RefCell::new(Vec::new()),
            now: Cell::new(Duration::ZERO),
            next_timer_seq: Cell::new(0),
        })
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of queued (not timed) tasks.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Number of timers not yet fired.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Run queued tasks, including tasks they queue, until the queue is empty.
    /// Timers are not advanced. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut turns = 0;
        while turns < MAX_TURNS {
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    turns += 1;
                }
                None => return turns,
            }
        }
        tracing::warn!(turns, "event loop still busy after turn limit");
        turns
    }

    /// Advance virtual time by `by`, firing due timers in deadline order and
    /// draining the task queue around each of them.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now.get() + by;
        let mut turns = self.run_until_idle();

        while let Some(timer) = self.pop_due(target) {
            self.now.set(timer.due);
            (timer.task)();
            turns += 1 + self.run_until_idle();
        }

        self.now.set(target);
        turns
    }

    fn pop_due(&self, target: Duration) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let idx = timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.due <= target)
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(idx, _)| idx)?;
        Some(timers.swap_remove(idx))
    }
}

impl Scheduler for EventLoop {
    fn defer(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }

    fn defer_for(&self, delay: Duration, task: Task) {
        let seq = self.next_timer_seq.get();
        self.next_timer_seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.now.get() + delay,
            seq,
            task,
        });
    }
}

type SharedListener = Rc<RefCell<Listener>>;

struct WindowState {
    origin: String,
    parent: Option<ContextId>,
    listeners: Vec<(ListenerId, SharedListener)>,
}

/// A set of simulated browsing contexts sharing one event loop.
pub struct MemoryBus {
    event_loop: Rc<EventLoop>,
    windows: RefCell<HashMap<ContextId, WindowState>>,
    next_context: Cell<u64>,
    next_listener: Cell<u64>,
    discarded: Cell<u64>,
}

impl MemoryBus {
    pub fn new(event_loop: Rc<EventLoop>) -> Rc<Self> {
        Rc::new(Self {
            event_loop,
            windows: RefCell::new(HashMap::new()),
            next_context: Cell::new(1),
            next_listener: Cell::new(1),
            discarded: Cell::new(0),
        })
    }

    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    /// Open a top-level window serving documents from `origin`.
    pub fn open_window(&self, origin: &str) -> ContextId {
        self.insert_window(origin, None)
    }

    /// Open a frame embedded in `parent`, serving documents from `origin`.
    pub fn open_frame(&self, parent: ContextId, origin: &str) -> Result<ContextId> {
        if !self.windows.borrow().contains_key(&parent) {
            return Err(TransportError::UnknownContext(parent));
        }
        Ok(self.insert_window(origin, Some(parent)))
    }

    /// Embedding context of `ctx`, or `None` for a top-level window.
    pub fn parent_of(&self, ctx: ContextId) -> Option<ContextId> {
        self.windows.borrow().get(&ctx).and_then(|w| w.parent)
    }

    pub fn origin_of(&self, ctx: ContextId) -> Option<String> {
        self.windows.borrow().get(&ctx).map(|w| w.origin.clone())
    }

    /// Create an endpoint posting from `local` to `remote` and listening on `local`.
    pub fn endpoint(self: &Rc<Self>, local: ContextId, remote: ContextId) -> Result<MemoryEndpoint> {
        {
            let windows = self.windows.borrow();
            for ctx in [local, remote] {
                if !windows.contains_key(&ctx) {
                    return Err(TransportError::UnknownContext(ctx));
                }
            }
        }
        Ok(MemoryEndpoint {
            bus: Rc::clone(self),
            local,
            remote,
        })
    }

    /// Queue a raw event for delivery to `to`, bypassing target-origin checks.
    ///
    /// Lets tests and tools impersonate arbitrary senders.
    pub fn dispatch(self: &Rc<Self>, to: ContextId, event: InboundEvent) -> Result<()> {
        if !self.windows.borrow().contains_key(&to) {
            return Err(TransportError::UnknownContext(to));
        }
        let bus = Rc::downgrade(self);
        self.event_loop.defer(Box::new(move || {
            if let Some(bus) = bus.upgrade() {
                bus.deliver(to, event);
            }
        }));
        Ok(())
    }

    /// Number of listeners installed on `ctx`.
    pub fn listener_count(&self, ctx: ContextId) -> usize {
        self.windows
            .borrow()
            .get(&ctx)
            .map(|w| w.listeners.len())
            .unwrap_or(0)
    }

    /// Number of posted messages discarded because of a target-origin mismatch.
    pub fn discarded(&self) -> u64 {
        self.discarded.get()
    }

    fn insert_window(&self, origin: &str, parent: Option<ContextId>) -> ContextId {
        let id = ContextId::new(self.next_context.get());
        self.next_context.set(id.raw() + 1);
        self.windows.borrow_mut().insert(
            id,
            WindowState {
                origin: origin.to_string(),
                parent,
                listeners: Vec::new(),
            },
        );
        id
    }

    fn post(
        self: &Rc<Self>,
        from: ContextId,
        to: ContextId,
        data: Value,
        target_origin: &TargetOrigin,
    ) -> Result<()> {
        let origin = self
            .origin_of(from)
            .ok_or(TransportError::UnknownContext(from))?;
        if !self.windows.borrow().contains_key(&to) {
            return Err(TransportError::UnknownContext(to));
        }

        let bus: Weak<MemoryBus> = Rc::downgrade(self);
        let target_origin = target_origin.clone();
        self.event_loop.defer(Box::new(move || {
            let Some(bus) = bus.upgrade() else {
                return;
            };
            let receiver_origin = bus.origin_of(to).unwrap_or_default();
            if !target_origin.accepts(&receiver_origin) {
                bus.discarded.set(bus.discarded.get() + 1);
                tracing::debug!(
                    target_origin = %target_origin,
                    receiver_origin = %receiver_origin,
                    "discarding message for mismatched target origin"
                );
                return;
            }
            bus.deliver(
                to,
                InboundEvent {
                    origin,
                    source: Some(from),
                    data,
                },
            );
        }));
        Ok(())
    }

    fn deliver(&self, to: ContextId, event: InboundEvent) {
        let snapshot: Vec<(ListenerId, SharedListener)> = match self.windows.borrow().get(&to) {
            Some(window) => window.listeners.clone(),
            None => return,
        };

        for (id, listener) in snapshot {
            // A listener removed by an earlier one in this dispatch is skipped.
            if !self.is_installed(to, id) {
                continue;
            }
            match listener.try_borrow_mut() {
                Ok(mut listener) => (*listener)(event.clone()),
                Err(_) => tracing::warn!(listener = id.raw(), "skipping re-entrant listener"),
            }
        }
    }

    fn is_installed(&self, ctx: ContextId, id: ListenerId) -> bool {
        self.windows
            .borrow()
            .get(&ctx)
            .is_some_and(|w| w.listeners.iter().any(|(lid, _)| *lid == id))
    }

    fn add_listener(&self, ctx: ContextId, listener: Listener) -> Result<ListenerId> {
        let id = ListenerId::new(self.next_listener.get());
        self.next_listener.set(id.raw() + 1);
        let mut windows = self.windows.borrow_mut();
        let window = windows
            .get_mut(&ctx)
            .ok_or(TransportError::UnknownContext(ctx))?;
        window.listeners.push((id, Rc::new(RefCell::new(listener))));
        Ok(id)
    }

    fn remove_listener(&self, ctx: ContextId, id: ListenerId) -> bool {
        let mut windows = self.windows.borrow_mut();
        let Some(window) = windows.get_mut(&ctx) else {
            return false;
        };
        let before = window.listeners.len();
        window.listeners.retain(|(lid, _)| *lid != id);
        window.listeners.len() != before
    }
}

/// [`Endpoint`] over a [`MemoryBus`].
#[derive(Clone)]
pub struct MemoryEndpoint {
    bus: Rc<MemoryBus>,
    local: ContextId,
    remote: ContextId,
}

impl MemoryEndpoint {
    pub fn local(&self) -> ContextId {
        self.local
    }

    pub fn bus(&self) -> &Rc<MemoryBus> {
        &self.bus
    }
}

impl Endpoint for MemoryEndpoint {
    fn remote(&self) -> ContextId {
        self.remote
    }

    fn post(&self, data: Value, target_origin: &TargetOrigin) -> Result<()> {
        self.bus.post(self.local, self.remote, data, target_origin)
    }

    fn add_listener(&self, listener: Listener) -> Result<ListenerId> {
        self.bus.add_listener(self.local, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.bus.remove_listener(self.local, id)
    }
}

impl std::fmt::Debug for MemoryEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEndpoint")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn recording_listener(log: &Rc<RefCell<Vec<InboundEvent>>>) -> Listener {
        let log = Rc::clone(log);
        Box::new(move |event| log.borrow_mut().push(event))
    }

    fn pair() -> (Rc<MemoryBus>, ContextId, ContextId) {
        let bus = MemoryBus::new(EventLoop::new());
        let parent = bus.open_window("https://parent.example");
        let child = bus
            .open_frame(parent, "https://child.example")
            .expect("frame should open");
        (bus, parent, child)
    }

    #[test]
    fn post_is_asynchronous_and_ordered() {
        let (bus, parent, child) = pair();
        let log = Rc::new(RefCell::new(Vec::new()));
        let to_parent = bus.endpoint(child, parent).unwrap();
        let on_parent = bus.endpoint(parent, child).unwrap();
        on_parent.add_listener(recording_listener(&log)).unwrap();

        for n in 0..3 {
            to_parent.post(json!({ "n": n }), &TargetOrigin::Any).unwrap();
        }
        assert!(log.borrow().is_empty());

        bus.event_loop().run_until_idle();
        let events = log.borrow();
        assert_eq!(events.len(), 3);
        let order: Vec<i64> = events.iter().map(|e| e.data["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(events[0].origin, "https://child.example");
        assert_eq!(events[0].source, Some(child));
    }

    #[test]
    fn mismatched_target_origin_is_discarded() {
        let (bus, parent, child) = pair();
        let log = Rc::new(RefCell::new(Vec::new()));
        let to_parent = bus.endpoint(child, parent).unwrap();
        bus.endpoint(parent, child)
            .unwrap()
            .add_listener(recording_listener(&log))
            .unwrap();

        let wrong = TargetOrigin::parse("https://other.example").unwrap();
        to_parent.post(json!({ "type": "x" }), &wrong).unwrap();
        let right = TargetOrigin::parse("https://parent.example").unwrap();
        to_parent.post(json!({ "type": "y" }), &right).unwrap();
        bus.event_loop().run_until_idle();

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].data["type"], "y");
        assert_eq!(bus.discarded(), 1);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let (bus, parent, child) = pair();
        let log = Rc::new(RefCell::new(Vec::new()));
        let on_parent = bus.endpoint(parent, child).unwrap();
        let id = on_parent.add_listener(recording_listener(&log)).unwrap();
        assert_eq!(bus.listener_count(parent), 1);

        assert!(on_parent.remove_listener(id));
        assert!(!on_parent.remove_listener(id));
        assert_eq!(bus.listener_count(parent), 0);

        bus.endpoint(child, parent)
            .unwrap()
            .post(json!({}), &TargetOrigin::Any)
            .unwrap();
        bus.event_loop().run_until_idle();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn dispatch_allows_spoofed_origin() {
        let (bus, parent, child) = pair();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.endpoint(parent, child)
            .unwrap()
            .add_listener(recording_listener(&log))
            .unwrap();

        bus.dispatch(
            parent,
            InboundEvent {
                origin: "https://evil.example".to_string(),
                source: None,
                data: json!({ "type": "resize" }),
            },
        )
        .unwrap();
        bus.event_loop().run_until_idle();
        assert_eq!(log.borrow()[0].origin, "https://evil.example");
        assert_eq!(log.borrow()[0].source, None);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let fired = Rc::clone(&fired);
            event_loop.defer_for(
                Duration::from_millis(delay),
                Box::new(move || fired.borrow_mut().push(tag)),
            );
        }

        event_loop.advance(Duration::from_millis(15));
        assert_eq!(*fired.borrow(), vec!["a"]);
        event_loop.advance(Duration::from_millis(100));
        assert_eq!(*fired.borrow(), vec!["a", "b", "c"]);
        assert_eq!(event_loop.now(), Duration::from_millis(115));
        assert_eq!(event_loop.pending_timers(), 0);
    }

    #[test]
    fn unknown_contexts_are_rejected() {
        let bus = MemoryBus::new(EventLoop::new());
        let parent = bus.open_window("https://parent.example");
        let ghost = ContextId::new(99);
        assert!(matches!(
            bus.open_frame(ghost, "https://x.example"),
            Err(TransportError::UnknownContext(_))
        ));
        assert!(bus.endpoint(parent, ghost).is_err());
        assert_eq!(bus.parent_of(parent), None);
    }
}
