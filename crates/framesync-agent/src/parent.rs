//! Agent running in the embedding document, one per embedded frame.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use framesync_transport::{diag, ContextId, Endpoint, MemoryBus};
use framesync_wire::{Channel, Dimension, Message, ScrollPosition, READY, RESIZE, SCROLL};
use serde_json::Value;

#[cfg(feature = "schema")]
use framesync_schema::SchemaRegistry;

use crate::config::AgentOptions;
use crate::dispatch::{
    dispatch_generic, report_fault, run_guarded, HandlerResult, HandlerTable, PayloadCheck, Route,
    Side,
};
use crate::error::{AgentError, Result};
use crate::handshake::ReadyGate;
use crate::registry::AgentState;

const AGENT: &str = "parent";

/// Called with `(width, height)` when the child reports a size change.
pub type ResizeCallback = Rc<RefCell<dyn FnMut(Option<f64>, f64)>>;

/// Called with `(left, top)` when the child reports a scroll.
pub type ScrollCallback = Rc<RefCell<dyn FnMut(f64, f64)>>;

/// Options plus the fast-path callbacks of a parent agent.
#[derive(Clone, Default)]
pub struct ParentConfig {
    pub options: AgentOptions,
    on_resize: Option<ResizeCallback>,
    on_scroll: Option<ScrollCallback>,
}

impl ParentConfig {
    pub fn new(options: AgentOptions) -> Self {
        Self {
            options,
            on_resize: None,
            on_scroll: None,
        }
    }

    pub fn on_resize(mut self, callback: impl FnMut(Option<f64>, f64) + 'static) -> Self {
        let callback: ResizeCallback = Rc::new(RefCell::new(callback));
        self.on_resize = Some(callback);
        self
    }

    pub fn on_scroll(mut self, callback: impl FnMut(f64, f64) + 'static) -> Self {
        let callback: ScrollCallback = Rc::new(RefCell::new(callback));
        self.on_scroll = Some(callback);
        self
    }
}

impl fmt::Debug for ParentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentConfig")
            .field("options", &self.options)
            .field("on_resize", &self.on_resize.is_some())
            .field("on_scroll", &self.on_scroll.is_some())
            .finish()
    }
}

/// Parent agent handle. Cloning yields another handle to the same agent.
#[derive(Clone)]
pub struct ParentAgent {
    inner: Rc<ParentInner>,
}

struct ParentInner {
    options: AgentOptions,
    log: bool,
    state: Cell<AgentState>,
    startup_error: Option<AgentError>,
    channel: Option<Channel>,
    on_resize: RefCell<Option<ResizeCallback>>,
    on_scroll: RefCell<Option<ScrollCallback>>,
    ready: RefCell<ReadyGate>,
    handlers: RefCell<HandlerTable>,
    payloads: PayloadCheck,
}

impl ParentAgent {
    /// Start listening to the frame `endpoint` posts to.
    pub fn new(config: ParentConfig, endpoint: Rc<dyn Endpoint>) -> Self {
        let inner = Rc::new_cyclic(|weak| ParentInner::install(weak, config, Ok(endpoint)));
        if inner.state.get() == AgentState::Initializing {
            inner.state.set(AgentState::Active);
            diag!(
                inner.log,
                info,
                agent = AGENT,
                target_origin = %inner.options.target_origin,
                "parent agent active"
            );
        }
        Self { inner }
    }

    /// An inert agent for a frame that could not be resolved.
    pub fn detached(config: ParentConfig, error: AgentError) -> Self {
        let inner = Rc::new_cyclic(|weak| ParentInner::install(weak, config, Err(error)));
        Self { inner }
    }

    /// Parent agent for `frame` on an in-memory bus.
    ///
    /// A frame that is unknown or not embedded yields a detached agent.
    pub fn for_frame(config: ParentConfig, bus: &Rc<MemoryBus>, frame: ContextId) -> Self {
        let endpoint = bus
            .parent_of(frame)
            .ok_or_else(|| AgentError::Configuration(format!("{frame} is not an embedded frame")))
            .and_then(|parent| Ok(bus.endpoint(parent, frame)?));
        match endpoint {
            Ok(endpoint) => Self::new(config, Rc::new(endpoint)),
            Err(err) => Self::detached(config, err),
        }
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

    /// Returns true once the child has announced readiness.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.borrow().is_ready()
    }

    /// Payload of the child's readiness announcement.
    pub fn init_data(&self) -> Option<Value> {
        self.inner.ready.borrow().init_data().cloned()
    }

    /// Run `callback` once the child is ready.
    ///
    /// Runs immediately if the child already announced readiness. Only one
    /// callback is kept pending; a later registration replaces it.
    pub fn on_ready(&self, callback: impl FnOnce(&Value) + 'static) -> &Self {
        let inner = &self.inner;
        let state = inner.state.get();
        if state == AgentState::Destroyed {
            let err = AgentError::Inactive(state);
            diag!(inner.log, warn, agent = AGENT, error = %err, "ready callback not registered");
            return self;
        }
        let immediate = inner.ready.borrow_mut().register(Box::new(callback));
        if let Some((callback, payload)) = immediate {
            inner.run_ready(callback, &payload);
        }
        self
    }

    /// Register a handler for messages of `msg_type` from the child.
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
        } else if Side::Parent.is_reserved(msg_type) {
            diag!(inner.log, warn, agent = AGENT, msg_type, "message type is reserved, handler ignored");
        } else if inner.handlers.borrow_mut().insert(msg_type, handler) {
            diag!(inner.log, debug, agent = AGENT, msg_type, "replaced message handler");
        }
        self
    }

    /// Send a custom message to the child. `data` must be an object or null.
    pub fn send_message(&self, msg_type: &str, data: Value) -> &Self {
        let inner = &self.inner;
        if let Err(err) = inner.send_custom(msg_type, data) {
            diag!(inner.log, warn, agent = AGENT, msg_type, error = %err, "message not sent");
        }
        self
    }

    /// Validate custom payloads from the child against `registry`.
    #[cfg(feature = "schema")]
    pub fn use_schemas(&self, registry: Rc<SchemaRegistry>) -> &Self {
        self.inner.payloads.set(registry);
        self
    }

    /// Stop the agent: uninstall the listener and drop all callbacks.
    /// Safe to call any number of times.
    pub fn destroy(&self) {
        if self.inner.state.replace(AgentState::Destroyed) == AgentState::Destroyed {
            return;
        }
        self.inner.teardown();
        diag!(self.inner.log, info, agent = AGENT, "parent agent destroyed");
    }
}

impl fmt::Debug for ParentAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentAgent")
            .field("state", &self.state())
            .field("target_origin", &self.inner.options.target_origin)
            .field("ready", &self.is_ready())
            .field("handlers", &self.inner.handlers.borrow())
            .finish()
    }
}

impl ParentInner {
    fn install(
        weak: &Weak<Self>,
        config: ParentConfig,
        endpoint: Result<Rc<dyn Endpoint>>,
    ) -> Self {
        let ParentConfig {
            options,
            on_resize,
            on_scroll,
        } = config;
        let log = options.log;
        let mut inner = Self {
            options,
            log,
            state: Cell::new(AgentState::Uninitialized),
            startup_error: None,
            channel: None,
            on_resize: RefCell::new(on_resize),
            on_scroll: RefCell::new(on_scroll),
            ready: RefCell::new(ReadyGate::new()),
            handlers: RefCell::new(HandlerTable::new()),
            payloads: PayloadCheck::default(),
        };

        match endpoint.and_then(|endpoint| inner.open(weak, endpoint)) {
            Ok(channel) => {
                inner.channel = Some(channel);
                inner.state.set(AgentState::Initializing);
            }
            Err(err) => {
                diag!(log, error, agent = AGENT, error = %err, "parent agent not started");
                inner.startup_error = Some(err);
            }
        }
        inner
    }

    fn open(&self, weak: &Weak<Self>, endpoint: Rc<dyn Endpoint>) -> Result<Channel> {
        let target_origin = self.options.validate()?;
        let log = self.log;
        let channel = Channel::new(endpoint, target_origin)
            .with_source_check(true)
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
        Ok(channel)
    }

    fn handle(&self, message: Message) {
        if !self.state.get().is_active() {
            diag!(self.log, debug, agent = AGENT, msg_type = %message.msg_type, "agent inactive, dropping message");
            return;
        }

        match Route::classify(Side::Parent, &message.msg_type) {
            Route::Resize => match message.decode_payload::<Dimension>() {
                Ok(dimension) => self.resized(dimension),
                Err(err) => {
                    diag!(self.log, warn, agent = AGENT, error = %err, "dropping malformed resize");
                }
            },
            Route::Scroll => match message.decode_payload::<ScrollPosition>() {
                Ok(position) => self.scrolled(position),
                Err(err) => {
                    diag!(self.log, warn, agent = AGENT, error = %err, "dropping malformed scroll");
                }
            },
            Route::Ready => self.announced(message),
            Route::ReadyAck | Route::Generic(_) => {
                if self.payloads.allows(&message, self.log, Side::Parent) {
                    dispatch_generic(&self.handlers, &message, self.log, Side::Parent);
                }
            }
        }
    }

    fn resized(&self, dimension: Dimension) {
        let callback = self.on_resize.borrow().clone();
        let Some(callback) = callback else {
            diag!(self.log, debug, agent = AGENT, "no resize callback, dropping resize");
            return;
        };
        let outcome = run_guarded(RESIZE, || match callback.try_borrow_mut() {
            Ok(mut callback) => {
                (&mut *callback)(dimension.width, dimension.height);
                Ok(())
            }
            Err(_) => Err("resize callback is already running".into()),
        });
        report_fault(outcome, self.log, Side::Parent);
    }

    fn scrolled(&self, position: ScrollPosition) {
        let callback = self.on_scroll.borrow().clone();
        let Some(callback) = callback else {
            diag!(self.log, debug, agent = AGENT, "no scroll callback, dropping scroll");
            return;
        };
        let outcome = run_guarded(SCROLL, || match callback.try_borrow_mut() {
            Ok(mut callback) => {
                (&mut *callback)(position.left, position.top);
                Ok(())
            }
            Err(_) => Err("scroll callback is already running".into()),
        });
        report_fault(outcome, self.log, Side::Parent);
    }

    fn announced(&self, message: Message) {
        if let Err(err) = self.send(&Message::ready_ack()) {
            diag!(self.log, warn, agent = AGENT, error = %err, "ready_ack not sent");
        }

        let first = !self.ready.borrow().is_ready();
        let pending = self.ready.borrow_mut().mark_ready(message.payload_value());
        if first {
            diag!(self.log, debug, agent = AGENT, "child announced readiness");
        } else {
            diag!(self.log, debug, agent = AGENT, "ignoring repeated readiness announcement");
        }
        if let Some((callback, payload)) = pending {
            self.run_ready(callback, &payload);
        }
    }

    fn run_ready(&self, callback: Box<dyn FnOnce(&Value)>, payload: &Value) {
        let outcome = run_guarded(READY, || {
            callback(payload);
            Ok(())
        });
        report_fault(outcome, self.log, Side::Parent);
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
        self.handlers.borrow_mut().clear();
        self.ready.borrow_mut().clear();
        self.on_resize.borrow_mut().take();
        self.on_scroll.borrow_mut().take();
    }
}
