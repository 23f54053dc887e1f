//! A child and a parent agent wired together over the in-memory host.
//!
//! Drives the embedded document through a scripted sequence of layout,
//! scroll and message steps and records everything the parent observes.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use framesync_agent::{
    AgentError, AgentOptions, ChildAgent, ChildContext, ChildRegistry, LayoutMetrics,
    MemoryDocument, ParentAgent, ParentConfig,
};
use framesync_transport::{EventLoop, MemoryBus};
use serde::Serialize;
use serde_json::Value;

#[cfg(feature = "schema")]
use framesync_schema::SchemaRegistry;

pub const DEFAULT_PARENT_ORIGIN: &str = "https://parent.example";
pub const DEFAULT_CHILD_ORIGIN: &str = "https://child.example";

/// Something the parent agent observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Observation {
    Ready {
        data: Value,
    },
    Resize {
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        height: f64,
    },
    Scroll {
        left: f64,
        top: f64,
    },
    Message {
        #[serde(rename = "type")]
        msg_type: String,
        data: Value,
    },
}

impl Observation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Resize { .. } => "resize",
            Self::Scroll { .. } => "scroll",
            Self::Message { .. } => "message",
        }
    }
}

/// An observation with its position and virtual time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observed {
    pub seq: usize,
    pub at_ms: u64,
    #[serde(flatten)]
    pub observation: Observation,
}

/// One scripted change to the embedded document.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Set the content height. Setting the current height is a no-op mutation.
    Height(f64),
    /// Set the content width.
    Width(f64),
    /// Scroll the page.
    Scroll { left: f64, top: f64 },
    /// Send a custom message from the child.
    Message { msg_type: String, data: Value },
}

/// Origins, initial layout and agent options of a simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub parent_origin: String,
    pub child_origin: String,
    /// Layout of the embedded document when the child agent starts.
    pub initial: LayoutMetrics,
    pub child: AgentOptions,
    pub parent: AgentOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            parent_origin: DEFAULT_PARENT_ORIGIN.to_string(),
            child_origin: DEFAULT_CHILD_ORIGIN.to_string(),
            initial: LayoutMetrics::default(),
            child: AgentOptions::default().with_target_origin(DEFAULT_PARENT_ORIGIN),
            parent: AgentOptions::default().with_target_origin(DEFAULT_CHILD_ORIGIN),
        }
    }
}

/// A running simulation.
pub struct Simulation {
    event_loop: Rc<EventLoop>,
    bus: Rc<MemoryBus>,
    document: Rc<MemoryDocument>,
    registry: ChildRegistry,
    child: ChildAgent,
    parent: ParentAgent,
    observed: Rc<RefCell<Vec<Observed>>>,
}

impl Simulation {
    /// Open both contexts and start both agents.
    ///
    /// Fails with the startup error of whichever agent did not start.
    pub fn start(config: SimulationConfig) -> Result<Self, AgentError> {
        let event_loop = EventLoop::new();
        let bus = MemoryBus::new(event_loop.clone());
        let parent_window = bus.open_window(&config.parent_origin);
        let frame = bus.open_frame(parent_window, &config.child_origin)?;

        let observed: Rc<RefCell<Vec<Observed>>> = Rc::new(RefCell::new(Vec::new()));
        let record = {
            let observed = Rc::clone(&observed);
            let event_loop = Rc::clone(&event_loop);
            move |observation: Observation| {
                let mut observed = observed.borrow_mut();
                let seq = observed.len() + 1;
                observed.push(Observed {
                    seq,
                    at_ms: millis(event_loop.now()),
                    observation,
                });
            }
        };
        let record = Rc::new(record);

        let on_resize = Rc::clone(&record);
        let on_scroll = Rc::clone(&record);
        let parent_config = ParentConfig::new(config.parent)
            .on_resize(move |width, height| on_resize(Observation::Resize { width, height }))
            .on_scroll(move |left, top| on_scroll(Observation::Scroll { left, top }));
        let parent = ParentAgent::for_frame(parent_config, &bus, frame);
        if let Some(err) = parent.startup_error() {
            return Err(AgentError::Configuration(format!("parent agent: {err}")));
        }
        let on_ready = Rc::clone(&record);
        parent.on_ready(move |data| on_ready(Observation::Ready { data: data.clone() }));

        let document = MemoryDocument::embedded(event_loop.clone());
        document.set_metrics(config.initial);
        event_loop.run_until_idle();

        let registry = ChildRegistry::new();
        let context = ChildContext::in_memory(&bus, frame, document.clone())?;
        let child = registry.create(config.child, context);
        if let Some(err) = child.startup_error() {
            return Err(AgentError::Configuration(format!("child agent: {err}")));
        }

        let simulation = Self {
            event_loop,
            bus,
            document,
            registry,
            child,
            parent,
            observed,
        };
        simulation.settle();
        Ok(simulation)
    }

    /// Record custom messages of `msg_type` arriving at the parent.
    pub fn watch(&self, msg_type: &str) {
        let observed = Rc::clone(&self.observed);
        let event_loop = Rc::clone(&self.event_loop);
        let owned = msg_type.to_string();
        self.parent.on_message(msg_type, move |data: &Value| {
            let mut observed = observed.borrow_mut();
            let seq = observed.len() + 1;
            observed.push(Observed {
                seq,
                at_ms: millis(event_loop.now()),
                observation: Observation::Message {
                    msg_type: owned.clone(),
                    data: data.clone(),
                },
            });
            Ok(())
        });
    }

    /// Validate custom messages at the parent.
    #[cfg(feature = "schema")]
    pub fn use_schemas(&self, registry: SchemaRegistry) {
        self.parent.use_schemas(Rc::new(registry));
    }

    /// Apply one step and run the event loop until idle.
    pub fn apply(&self, step: &Step) {
        match step {
            Step::Height(height) => self.document.set_content_height(*height),
            Step::Width(width) => self.document.set_content_width(*width),
            Step::Scroll { left, top } => self.document.scroll_to(*left, *top),
            Step::Message { msg_type, data } => {
                self.child.send_message(msg_type, data.clone());
            }
        }
        self.settle();
    }

    pub fn settle(&self) {
        self.event_loop.run_until_idle();
    }

    pub fn bus(&self) -> &Rc<MemoryBus> {
        &self.bus
    }

    pub fn child(&self) -> &ChildAgent {
        &self.child
    }

    pub fn parent(&self) -> &ParentAgent {
        &self.parent
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.borrow().clone()
    }

    /// Stop both agents.
    pub fn finish(self) -> Vec<Observed> {
        self.registry.clear();
        self.parent.destroy();
        self.observed.take()
    }
}

fn millis(at: Duration) -> u64 {
    u64::try_from(at.as_millis()).unwrap_or(u64::MAX)
}

/// Start a simulation, watch every custom message type the steps send,
/// apply the steps and return what the parent observed.
pub fn run(config: SimulationConfig, steps: &[Step]) -> Result<Vec<Observed>, AgentError> {
    let simulation = Simulation::start(config)?;
    let custom: BTreeSet<&str> = steps
        .iter()
        .filter_map(|step| match step {
            Step::Message { msg_type, .. } => Some(msg_type.as_str()),
            _ => None,
        })
        .collect();
    for msg_type in custom {
        simulation.watch(msg_type);
    }
    for step in steps {
        simulation.apply(step);
    }
    Ok(simulation.finish())
}
