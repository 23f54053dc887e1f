//! Agent lifecycle and the single-active child registry.

use std::cell::RefCell;
use std::fmt;

use serde_json::Value;

use crate::child::{ChildAgent, ChildContext};
use crate::config::AgentOptions;

/// Lifecycle of an agent.
///
/// `Uninitialized → Initializing → Active → Destroyed`. An agent whose
/// startup failed stays `Uninitialized` and never emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentState {
    Uninitialized,
    Initializing,
    Active,
    Destroyed,
}

impl AgentState {
    /// Returns true when the agent may emit and dispatch.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds at most one live child agent.
///
/// A document runs a single child agent. Creating a new one first destroys
/// its predecessor, so orphaned observers never emit alongside it.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    current: RefCell<Option<ChildAgent>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroy the current agent, if any, and start a new one.
    pub fn create(&self, options: AgentOptions, context: ChildContext) -> ChildAgent {
        let log = options.log;
        self.replace(log, || ChildAgent::start(options, context))
    }

    /// Like [`create`](Self::create), with the options still in JSON form.
    ///
    /// Options that fail to deserialize yield an inert agent whose
    /// `startup_error()` carries the configuration error.
    pub fn create_from_value(&self, options: Value, context: ChildContext) -> ChildAgent {
        match AgentOptions::from_value(options) {
            Ok(options) => self.create(options, context),
            Err(err) => self.replace(false, || ChildAgent::rejected(err, context)),
        }
    }

    fn replace(&self, log: bool, start: impl FnOnce() -> ChildAgent) -> ChildAgent {
        let previous = self.current.borrow_mut().take();
        if let Some(previous) = previous {
            let log = log || previous.logging();
            previous.destroy();
            framesync_transport::diag!(log, debug, agent = "child", "destroyed previous child agent");
        }

        let agent = start();
        *self.current.borrow_mut() = Some(agent.clone());
        agent
    }

    /// The agent created last, unless it has since been destroyed.
    pub fn current(&self) -> Option<ChildAgent> {
        self.current
            .borrow()
            .as_ref()
            .filter(|agent| agent.state() != AgentState::Destroyed)
            .cloned()
    }

    /// Destroy and forget the current agent.
    pub fn clear(&self) {
        let previous = self.current.borrow_mut().take();
        if let Some(previous) = previous {
            previous.destroy();
        }
    }
}
