//! Agent running inside the embedded document.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use framesync_transport::{diag, ContextId, Endpoint, MemoryBus, Scheduler};
use framesync_wire::{Channel, Dimension, Message};
use serde_json::Value;

#[cfg(feature = "schema")]
use framesync_schema::SchemaRegistry;

use crate::config::AgentOptions;
use crate::detector::ChangeDetector;
use crate::dispatch::{dispatch_generic, HandlerResult, HandlerTable, PayloadCheck, Route, Side};
use crate::document::{DocumentHost, ObserverId};
use crate::error::{AgentError, Result};
use crate::handshake::ReadyAnnouncer;
use crate::registry::AgentState;

const AGENT: &str = "child";

/// Host facilities a child agent runs on.
#[derive(Clone)]
pub struct ChildContext {
    /// Posts to, and listens for, the embedding context.
    pub endpoint: Rc<dyn Endpoint>,
    pub scheduler: Rc<dyn Scheduler>,
    pub document: Rc<dyn DocumentHost>,
}

impl ChildContext {
    pub fn new(
        endpoint: Rc<dyn Endpoint>,
        scheduler: Rc<dyn Scheduler>,
        document: Rc<dyn DocumentHost>,
    ) -> Self {
        Self {
            endpoint,
            scheduler,
            document,
        }
    }

    /// Context for `frame` on an in-memory bus.
    ///
    /// A top-level window posts to itself, the way a browser window with no
    /// embedder is its own parent.
    pub fn in_memory(
        bus: &Rc<MemoryBus>,
        frame: ContextId,
        document: Rc<dyn DocumentHost>,
    ) -> Result<Self> {
        let parent = bus.parent_of(frame).unwrap_or(frame);
        let endpoint = bus.endpoint(frame, parent)?;
        let scheduler: Rc<dyn Scheduler> = bus.event_loop().clone();
        Ok(Self::new(Rc::new(endpoint), scheduler, document))
    }
}

/// Child agent handle.
///
/// Cloning yields another handle to the same agent. Create agents through a
/// [`ChildRegistry`](crate::ChildRegistry).
#[derive(Clone)]
pub struct ChildAgent {
    inner: Rc<ChildInner>,
}

struct ChildInner {
    options: AgentOptions,
    log: bool,
    state: Cell<AgentState>,
    startup_error: Option<AgentError>,
    channel: Option<Channel>,
    scheduler: Rc<dyn Scheduler>,
    document: Rc<dyn DocumentHost>,
    observers: RefCell<Vec<ObserverId>>,
    detector: RefCell<ChangeDetector>,
    handlers: RefCell<HandlerTable>,
    announcer: RefCell<ReadyAnnouncer>,
    payloads: PayloadCheck,
}

impl ChildAgent {
    /// Install the listener and observers, report the current size and
    /// schedule the readiness announcement.
    pub(crate) fn start(options: AgentOptions, context: ChildContext) -> Self {
        let inner = Rc::new_cyclic(|weak| ChildInner::install(weak, options, context, None));

        if inner.state.get() == AgentState::Initializing {
            if inner.options.resize {
                inner.emit_layout(true);
            }
            let agent = Rc::downgrade(&inner);
            inner.scheduler.defer(Box::new(move || {
                if let Some(agent) = agent.upgrade() {
                    agent.announce();
                }
            }));
            inner.state.set(AgentState::Active);
            diag!(
                inner.log,
                info,
                agent = AGENT,
                target_origin = %inner.options.target_origin,
                "child agent active"
            );
        }

        Self { inner }
    }

    /// An inert agent that never started because of `error`.
    pub(crate) fn rejected(error: AgentError, context: ChildContext) -> Self {
        let inner = Rc::new_cyclic(|weak| {
            ChildInner::install(weak, AgentOptions::default(), context, Some(error))
        });
        Self { inner }
    }

    pub fn state(&self) -> AgentState {
        self.inner.state.get()
    }

    /// Why the agent did not start, if it did not.
    pub fn startup_error(&self) -> Option<&AgentError> {
        self.inner.startup_error.as_ref()
    }

    pub fn options(&self) -> &AgentOptions {
        &self.inner.options
    }

    /// Last dimension reported to the parent.
    pub fn last_dimension(&self) -> Option<Dimension> {
        self.inner.detector.borrow().last()
    }

    /// Returns true once the parent has acknowledged readiness.
    pub fn is_acknowledged(&self) -> bool {
        self.inner.announcer.borrow().is_acknowledged()
    }

    /// Register a handler for messages of `msg_type` from the parent.
    pub fn on_message(
        &self,
        msg_type: &str,
        handler: impl FnMut(&Value) -> HandlerResult + 'static,
    ) -> &Self {
        let inner = &self.inner;
        let state = inner.state.get();
        if state == AgentState::Destroyed {
            let err = AgentError::Inactive(state);
            diag!(inner.log, warn, agent = AGENT, msg_type, error = %err, "handler not registered");
        } else if Side::Child.is_reserved(msg_type) {
            diag!(inner.log, warn, agent = AGENT, msg_type, "message type is reserved, handler ignored");
        } else if inner.handlers.borrow_mut().insert(msg_type, handler) {
            diag!(inner.log, debug, agent = AGENT, msg_type, "replaced message handler");
        }
        self
    }

    /// Send a custom message to the parent. `data` must be an object or null.
    pub fn send_message(&self, msg_type: &str, data: Value) -> &Self {
        let inner = &self.inner;
        if let Err(err) = inner.send_custom(msg_type, data) {
            diag!(inner.log, warn, agent = AGENT, msg_type, error = %err, "message not sent");
        }
        self
    }

    /// Re-measure the document and report its size if it changed, or
    /// unconditionally when `force` is set.
    pub fn check_layout(&self, force: bool) {
        self.inner.check_layout(force);
    }

    /// Validate custom payloads from the parent against `registry`.
    #[cfg(feature = "schema")]
    pub fn use_schemas(&self, registry: Rc<SchemaRegistry>) -> &Self {
        self.inner.payloads.set(registry);
        self
    }

    /// Stop the agent: uninstall the listener and observers and drop all
    /// handlers. Safe to call any number of times.
    pub fn destroy(&self) {
        if self.inner.state.replace(AgentState::Destroyed) == AgentState::Destroyed {
            return;
        }
        self.inner.teardown();
        diag!(self.inner.log, info, agent = AGENT, "child agent destroyed");
    }

    pub(crate) fn logging(&self) -> bool {
        self.inner.log
    }
}

impl fmt::Debug for ChildAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildAgent")
            .field("state", &self.state())
            .field("target_origin", &self.inner.options.target_origin)
            .field("handlers", &self.inner.handlers.borrow())
            .field("last_dimension", &self.last_dimension())
            .finish()
    }
}

impl ChildInner {
    fn install(
        weak: &Weak<Self>,
        options: AgentOptions,
        context: ChildContext,
        rejected: Option<AgentError>,
    ) -> Self {
        let ChildContext {
            endpoint,
            scheduler,
            document,
        } = context;
        let log = options.log;
        let announcer = ReadyAnnouncer::new(options.ready_retries);
        let mut inner = Self {
            options,
            log,
            state: Cell::new(AgentState::Uninitialized),
            startup_error: None,
            channel: None,
            scheduler,
            document,
            observers: RefCell::new(Vec::new()),
            detector: RefCell::new(ChangeDetector::new()),
            handlers: RefCell::new(HandlerTable::new()),
            announcer: RefCell::new(announcer),
            payloads: PayloadCheck::default(),
        };

        let opened = match rejected {
            Some(err) => Err(err),
            None => inner.open(weak, endpoint),
        };
        match opened {
            Ok(channel) => {
                inner.channel = Some(channel);
                inner.state.set(AgentState::Initializing);
            }
            Err(err) => {
                diag!(log, error, agent = AGENT, error = %err, "child agent not started");
                inner.startup_error = Some(err);
            }
        }
        inner
    }

    fn open(&self, weak: &Weak<Self>, endpoint: Rc<dyn Endpoint>) -> Result<Channel> {
        let target_origin = self.options.validate()?;
        if !self.document.has_embedding_context() {
            return Err(AgentError::Environment(
                "document has no embedding context".to_string(),
            ));
        }

        let log = self.log;
        let channel = Channel::new(endpoint, target_origin)
            .with_label(AGENT)
            .with_logging(log)
            .with_rejection_hook(move |rejection| {
                let err = AgentError::from(rejection.clone());
                diag!(log, warn, agent = AGENT, error = %err, "dropping inbound message");
            });

        let agent = weak.clone();
        channel.receive(move |message| {
            if let Some(agent) = agent.upgrade() {
                agent.handle(message);
            }
        })?;

        if self.options.resize {
            let agent = weak.clone();
            let id = self.document.observe_layout(Box::new(move || {
                if let Some(agent) = agent.upgrade() {
                    agent.check_layout(false);
                }
            }));
            self.observers.borrow_mut().push(id);
        }
        if self.options.scroll {
            let agent = weak.clone();
            let id = self.document.observe_scroll(Box::new(move || {
                if let Some(agent) = agent.upgrade() {
                    agent.emit_scroll();
                }
            }));
            self.observers.borrow_mut().push(id);
        }

        Ok(channel)
    }

    fn handle(&self, message: Message) {
        if !self.state.get().is_active() {
            diag!(self.log, debug, agent = AGENT, msg_type = %message.msg_type, "agent inactive, dropping message");
            return;
        }

        match Route::classify(Side::Child, &message.msg_type) {
            Route::ReadyAck => {
                if self.announcer.borrow_mut().acknowledge() {
                    diag!(self.log, debug, agent = AGENT, "parent acknowledged readiness");
                }
            }
            _ => {
                if self.payloads.allows(&message, self.log, Side::Child) {
                    dispatch_generic(&self.handlers, &message, self.log, Side::Child);
                }
            }
        }
    }

    fn announce(self: &Rc<Self>) {
        if !self.state.get().is_active() {
            return;
        }
        self.emit(&Message::ready(self.options.init_data.as_ref()));
        self.schedule_retry();
    }

    fn schedule_retry(self: &Rc<Self>) {
        {
            let announcer = self.announcer.borrow();
            if announcer.is_acknowledged() || announcer.retries_left() == 0 {
                return;
            }
        }
        let agent = Rc::downgrade(self);
        self.scheduler.defer_for(
            self.options.ready_retry_interval(),
            Box::new(move || {
                let Some(agent) = agent.upgrade() else {
                    return;
                };
                if !agent.state.get().is_active() {
                    return;
                }
                let retry = agent.announcer.borrow_mut().take_retry();
                if retry {
                    diag!(agent.log, debug, agent = AGENT, "re-announcing readiness");
                    agent.emit(&Message::ready(agent.options.init_data.as_ref()));
                    agent.schedule_retry();
                }
            }),
        );
    }

    fn check_layout(&self, force: bool) {
        if self.state.get().is_active() {
            self.emit_layout(force);
        }
    }

    fn emit_layout(&self, force: bool) {
        let metrics = self.document.measure();
        let changed = self.detector.borrow_mut().check(&metrics, force);
        if let Some(dimension) = changed {
            self.emit(&Message::resize(dimension));
        }
    }

    fn emit_scroll(&self) {
        if self.state.get().is_active() {
            let position = self.document.scroll_sample().position();
            self.emit(&Message::scroll(position));
        }
    }

    fn emit(&self, message: &Message) {
        if let Err(err) = self.send(message) {
            diag!(self.log, warn, agent = AGENT, msg_type = %message.msg_type, error = %err, "message not sent");
        }
    }

    fn send_custom(&self, msg_type: &str, data: Value) -> Result<()> {
        let state = self.state.get();
        if !state.is_active() {
            return Err(AgentError::Inactive(state));
        }
        let message = Message::new(msg_type, data)?;
        self.send(&message)
    }

    fn send(&self, message: &Message) -> Result<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or(AgentError::Inactive(self.state.get()))?;
        channel.send(message)?;
        Ok(())
    }

    fn teardown(&self) {
        if let Some(channel) = &self.channel {
            channel.close();
        }
        let observers = std::mem::take(&mut *self.observers.borrow_mut());
        for id in observers {
            self.document.unobserve(id);
        }
        self.handlers.borrow_mut().clear();
    }
}

impl Drop for ChildInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framesync_transport::{
        EventLoop, InboundEvent, Listener, ListenerId, MemoryEndpoint, TargetOrigin, Task,
    };
    use framesync_wire::{READY, RESIZE, SCROLL};
    use serde_json::json;

    use super::*;
    use crate::document::MemoryDocument;
    use crate::registry::ChildRegistry;

    const PARENT_ORIGIN: &str = "https://parent.example";
    const CHILD_ORIGIN: &str = "https://child.example";

    struct Harness {
        event_loop: Rc<EventLoop>,
        bus: Rc<MemoryBus>,
        parent: ContextId,
        frame: ContextId,
        document: Rc<MemoryDocument>,
        registry: ChildRegistry,
        received: Rc<RefCell<Vec<Message>>>,
    }

    impl Harness {
        fn new() -> Self {
            let event_loop = EventLoop::new();
            let bus = MemoryBus::new(event_loop.clone());
            let parent = bus.open_window(PARENT_ORIGIN);
            let frame = bus.open_frame(parent, CHILD_ORIGIN).unwrap();
            let document = MemoryDocument::embedded(event_loop.clone());

            let received = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&received);
            let tap = bus.endpoint(parent, frame).unwrap();
            tap.add_listener(Box::new(move |event: InboundEvent| {
                if let Ok(message) = framesync_wire::decode_message(event.data) {
                    sink.borrow_mut().push(message);
                }
            }))
            .unwrap();

            Self {
                event_loop,
                bus,
                parent,
                frame,
                document,
                registry: ChildRegistry::new(),
                received,
            }
        }

        fn context(&self) -> ChildContext {
            ChildContext::in_memory(&self.bus, self.frame, self.document.clone()).unwrap()
        }

        fn create(&self, options: AgentOptions) -> ChildAgent {
            self.registry.create(options, self.context())
        }

        fn settle(&self) {
            self.event_loop.run_until_idle();
        }

        fn types(&self) -> Vec<String> {
            self.received
                .borrow()
                .iter()
                .map(|m| m.msg_type.clone())
                .collect()
        }

        fn of_type(&self, msg_type: &str) -> Vec<Message> {
            self.received
                .borrow()
                .iter()
                .filter(|m| m.msg_type == msg_type)
                .cloned()
                .collect()
        }

        fn from_parent(&self, data: Value) {
            let endpoint = self.bus.endpoint(self.parent, self.frame).unwrap();
            endpoint.post(data, &TargetOrigin::Any).unwrap();
        }
    }

    fn options() -> AgentOptions {
        AgentOptions::default().with_target_origin(PARENT_ORIGIN)
    }

    /// Records the type of every message handed to the host.
    struct RecordingEndpoint {
        inner: MemoryEndpoint,
        posted: RefCell<Vec<String>>,
    }

    impl Endpoint for RecordingEndpoint {
        fn remote(&self) -> ContextId {
            self.inner.remote()
        }

        fn post(
            &self,
            data: Value,
            target_origin: &TargetOrigin,
        ) -> framesync_transport::Result<()> {
            let msg_type = data["type"].as_str().unwrap_or_default().to_string();
            self.posted.borrow_mut().push(msg_type);
            self.inner.post(data, target_origin)
        }

        fn add_listener(&self, listener: Listener) -> framesync_transport::Result<ListenerId> {
            self.inner.add_listener(listener)
        }

        fn remove_listener(&self, id: ListenerId) -> bool {
            self.inner.remove_listener(id)
        }
    }

    /// Holds deferred tasks until the test runs them.
    #[derive(Default)]
    struct ManualScheduler {
        tasks: RefCell<Vec<Task>>,
    }

    impl ManualScheduler {
        fn pending(&self) -> usize {
            self.tasks.borrow().len()
        }

        fn run_pending(&self) -> usize {
            let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
            let count = tasks.len();
            for task in tasks {
                task();
            }
            count
        }
    }

    impl Scheduler for ManualScheduler {
        fn defer(&self, task: Task) {
            self.tasks.borrow_mut().push(task);
        }

        fn defer_for(&self, _delay: Duration, task: Task) {
            self.tasks.borrow_mut().push(task);
        }
    }

    #[test]
    fn reports_size_then_announces_readiness() {
        let h = Harness::new();
        h.document.set_content_height(400.0);
        h.settle();

        let agent = h.create(options());
        assert_eq!(agent.state(), AgentState::Active);
        h.settle();

        assert_eq!(h.types(), vec![RESIZE, "ready"]);
        assert_eq!(h.of_type(RESIZE)[0].payload["height"], 400.0);
    }

    #[test]
    fn readiness_waits_one_scheduler_turn() {
        let h = Harness::new();
        h.document.set_content_height(400.0);
        h.settle();

        let endpoint = Rc::new(RecordingEndpoint {
            inner: h.bus.endpoint(h.frame, h.parent).unwrap(),
            posted: RefCell::new(Vec::new()),
        });
        let scheduler = Rc::new(ManualScheduler::default());
        let context = ChildContext::new(endpoint.clone(), scheduler.clone(), h.document.clone());

        let agent = h.registry.create(options(), context);
        assert_eq!(agent.state(), AgentState::Active);
        assert_eq!(*endpoint.posted.borrow(), vec![RESIZE.to_string()]);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(
            *endpoint.posted.borrow(),
            vec![RESIZE.to_string(), READY.to_string()]
        );
        assert_eq!(scheduler.pending(), 0);

        h.settle();
        assert_eq!(h.types(), vec![RESIZE, READY]);
    }

    #[test]
    fn resize_sequence_skips_unchanged_layouts() {
        let h = Harness::new();
        h.document.set_content_height(400.0);
        h.settle();
        let _agent = h.create(options());
        h.settle();

        h.document.set_content_height(600.0);
        h.settle();
        h.document.touch();
        h.settle();
        h.document.touch();
        h.settle();

        let heights: Vec<f64> = h
            .of_type(RESIZE)
            .iter()
            .map(|m| m.decode_payload::<Dimension>().unwrap().height)
            .collect();
        assert_eq!(heights, vec![400.0, 600.0]);
    }

    #[test]
    fn every_scroll_event_is_reported() {
        let h = Harness::new();
        let _agent = h.create(options());
        h.settle();

        h.document.scroll_to(0.0, 10.0);
        h.document.scroll_to(0.0, 10.0);
        h.settle();

        let scrolls = h.of_type(SCROLL);
        assert_eq!(scrolls.len(), 2);
        assert_eq!(scrolls[1].payload["top"], 10.0);
        assert_eq!(scrolls[1].payload["left"], 0.0);
    }

    #[test]
    fn disabled_observers_emit_nothing() {
        let h = Harness::new();
        let _agent = h.create(AgentOptions {
            resize: false,
            scroll: false,
            ..options()
        });
        h.document.set_content_height(800.0);
        h.document.scroll_to(5.0, 5.0);
        h.settle();

        assert_eq!(h.types(), vec!["ready"]);
        assert_eq!(h.document.observer_count(), 0);
    }

    #[test]
    fn ready_carries_init_data() {
        let h = Harness::new();
        let mut init = serde_json::Map::new();
        init.insert("theme".to_string(), json!("dark"));
        let _agent = h.create(options().with_init_data(init));
        h.settle();

        assert_eq!(h.of_type("ready")[0].payload["theme"], "dark");
    }

    #[test]
    fn second_child_disposes_the_first() {
        let h = Harness::new();
        let first = h.create(options());
        h.settle();
        let second = h.create(options());
        h.settle();
        h.received.borrow_mut().clear();

        assert_eq!(first.state(), AgentState::Destroyed);
        assert_eq!(second.state(), AgentState::Active);
        assert_eq!(h.bus.listener_count(h.frame), 1);

        h.document.set_content_height(900.0);
        h.settle();
        assert_eq!(h.of_type(RESIZE).len(), 1);
        assert!(h.registry.current().is_some());
    }

    #[test]
    fn top_level_document_stays_inert() {
        let event_loop = EventLoop::new();
        let bus = MemoryBus::new(event_loop.clone());
        let window = bus.open_window(PARENT_ORIGIN);
        let document = MemoryDocument::top_level(event_loop.clone());
        let registry = ChildRegistry::new();

        let context = ChildContext::in_memory(&bus, window, document.clone()).unwrap();
        let agent = registry.create(options().with_log(true), context);
        event_loop.run_until_idle();

        assert_eq!(agent.state(), AgentState::Uninitialized);
        assert!(matches!(
            agent.startup_error(),
            Some(AgentError::Environment(_))
        ));
        assert_eq!(bus.listener_count(window), 0);
        assert_eq!(document.observer_count(), 0);
    }

    #[test]
    fn invalid_options_stay_inert() {
        let h = Harness::new();
        let agent = h.create(AgentOptions::default().with_target_origin("not an origin"));
        h.settle();

        assert_eq!(agent.state(), AgentState::Uninitialized);
        assert!(matches!(
            agent.startup_error(),
            Some(AgentError::Configuration(_))
        ));
        assert!(h.types().is_empty());
    }

    #[test]
    fn undecodable_json_options_replace_predecessor_with_inert_agent() {
        let h = Harness::new();
        let first = h
            .registry
            .create_from_value(json!({ "targetOrigin": PARENT_ORIGIN }), h.context());
        h.settle();
        assert_eq!(first.state(), AgentState::Active);

        let second = h
            .registry
            .create_from_value(json!({ "resize": "yes" }), h.context());
        assert_eq!(first.state(), AgentState::Destroyed);
        assert_eq!(second.state(), AgentState::Uninitialized);
        assert!(matches!(
            second.startup_error(),
            Some(AgentError::Configuration(_))
        ));
        assert_eq!(h.document.observer_count(), 0);
    }

    #[test]
    fn dispatches_parent_messages_to_handlers() {
        let h = Harness::new();
        let agent = h.create(options());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        agent
            .on_message("theme", move |data: &Value| {
                sink.borrow_mut().push(data["name"].clone());
                Ok(())
            })
            .on_message("unused", |_| Ok(()));

        h.from_parent(json!({ "type": "theme", "name": "dark" }));
        h.from_parent(json!({ "type": "unknown" }));
        h.settle();

        assert_eq!(seen.borrow().as_slice(), [json!("dark")]);
    }

    #[test]
    fn reserved_ack_type_cannot_be_claimed() {
        let h = Harness::new();
        let agent = h.create(options());
        let hits = Rc::new(Cell::new(0));
        let sink = Rc::clone(&hits);
        agent.on_message("ready_ack", move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });

        h.from_parent(json!({ "type": "ready_ack" }));
        h.settle();

        assert_eq!(hits.get(), 0);
        assert!(agent.is_acknowledged());
    }

    #[test]
    fn messages_from_wrong_origin_are_dropped() {
        let h = Harness::new();
        let agent = h.create(options());
        let hits = Rc::new(Cell::new(0));
        let sink = Rc::clone(&hits);
        agent.on_message("theme", move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });

        h.bus
            .dispatch(
                h.frame,
                InboundEvent {
                    origin: "https://evil.example".to_string(),
                    source: Some(h.parent),
                    data: json!({ "type": "theme" }),
                },
            )
            .unwrap();
        h.settle();

        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn send_message_is_chainable_and_rejects_scalars() {
        let h = Harness::new();
        let agent = h.create(options());
        h.settle();
        h.received.borrow_mut().clear();

        agent
            .send_message("first", json!({ "n": 1 }))
            .send_message("bad", json!("scalar"))
            .send_message("second", Value::Null);
        h.settle();

        assert_eq!(h.types(), vec!["first", "second"]);
        assert_eq!(h.of_type("first")[0].payload["n"], 1);
    }

    #[test]
    fn wrong_target_origin_is_discarded_by_host() {
        let h = Harness::new();
        let _agent = h.create(AgentOptions::default().with_target_origin("https://other.example"));
        h.settle();

        assert!(h.types().is_empty());
        assert!(h.bus.discarded() >= 2);
    }

    #[test]
    fn destroy_is_idempotent_and_silences_the_agent() {
        let h = Harness::new();
        let agent = h.create(options());
        let hits = Rc::new(Cell::new(0));
        let sink = Rc::clone(&hits);
        agent.on_message("theme", move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });
        h.settle();

        h.from_parent(json!({ "type": "theme" }));
        agent.destroy();
        agent.destroy();
        h.received.borrow_mut().clear();

        h.document.set_content_height(1000.0);
        h.document.scroll_to(0.0, 50.0);
        agent.send_message("late", Value::Null);
        agent.check_layout(true);
        h.settle();

        assert_eq!(agent.state(), AgentState::Destroyed);
        assert_eq!(hits.get(), 0);
        assert!(h.types().is_empty());
        assert_eq!(h.bus.listener_count(h.frame), 0);
        assert_eq!(h.document.observer_count(), 0);
        assert!(h.registry.current().is_none());
    }

    #[test]
    fn handler_may_destroy_its_agent() {
        let h = Harness::new();
        let agent = h.create(options());
        let handle = agent.clone();
        agent.on_message("bye", move |_| {
            handle.destroy();
            Ok(())
        });

        h.from_parent(json!({ "type": "bye" }));
        h.settle();

        assert_eq!(agent.state(), AgentState::Destroyed);
        assert_eq!(h.bus.listener_count(h.frame), 0);
    }

    #[test]
    fn check_layout_forces_a_report() {
        let h = Harness::new();
        h.document.set_content_height(300.0);
        h.settle();
        let agent = h.create(options());
        h.settle();

        agent.check_layout(false);
        agent.check_layout(true);
        h.settle();

        assert_eq!(h.of_type(RESIZE).len(), 2);
        assert_eq!(agent.last_dimension(), Some(Dimension::new(300.0, 0.0)));
    }

    #[test]
    fn readiness_is_repeated_until_acknowledged() {
        let h = Harness::new();
        let agent = h.create(AgentOptions {
            ready_retries: 3,
            ready_retry_interval_ms: 100,
            ..options()
        });
        h.settle();
        h.event_loop.advance(Duration::from_millis(100));
        assert_eq!(h.of_type("ready").len(), 2);

        h.from_parent(json!({ "type": "ready_ack" }));
        h.settle();
        h.event_loop.advance(Duration::from_millis(1_000));

        assert!(agent.is_acknowledged());
        assert_eq!(h.of_type("ready").len(), 2);
        assert_eq!(h.event_loop.pending_timers(), 0);
    }

    #[test]
    fn readiness_retries_are_bounded() {
        let h = Harness::new();
        let _agent = h.create(AgentOptions {
            ready_retries: 2,
            ready_retry_interval_ms: 50,
            ..options()
        });
        h.settle();
        h.event_loop.advance(Duration::from_secs(5));

        assert_eq!(h.of_type("ready").len(), 3);
    }
}
