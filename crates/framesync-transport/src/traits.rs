use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::origin::TargetOrigin;

/// Opaque identity of a browsing context (a window reference).
///
/// Hosts hand these out so a receiver can tell which context posted an
/// event without holding the context itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Handle for an installed listener, used to uninstall it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// One inbound message event as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Origin of the document that posted the message.
    pub origin: String,
    /// Context that posted the message, when the host can identify it.
    pub source: Option<ContextId>,
    /// Structured message data.
    pub data: Value,
}

/// Callback invoked for every message event delivered to the local context.
pub type Listener = Box<dyn FnMut(InboundEvent)>;

/// Unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// The host's cross-context post primitive, bound to one local and one remote
/// context.
///
/// Posting is one-way and asynchronous: `post` only queues the message, and
/// listeners run later on the host's event loop.
pub trait Endpoint {
    /// Identity of the remote context this endpoint posts to.
    fn remote(&self) -> ContextId;

    /// Post structured data to the remote context. The host drops the message
    /// if the remote context's origin does not satisfy `target_origin`.
    fn post(&self, data: Value, target_origin: &TargetOrigin) -> Result<()>;

    /// Install a listener for message events delivered to the local context.
    fn add_listener(&self, listener: Listener) -> Result<ListenerId>;

    /// Remove a listener. Returns false if it was not installed.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// The host's single-threaded task scheduler.
pub trait Scheduler {
    /// Run `task` on a later turn of the event loop.
    fn defer(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn defer_for(&self, delay: Duration, task: Task);
}
