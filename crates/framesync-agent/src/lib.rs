//! Child and parent agents for embedded-document messaging.
//!
//! A [`ChildAgent`] runs inside the embedded document. It reports content
//! size and scroll position to the embedder, announces readiness, and
//! exchanges custom messages. A [`ParentAgent`] runs in the embedding
//! document, one per embedded frame, and routes what the child sends to
//! caller-supplied callbacks.
//!
//! Both agents are single-threaded handles: every callback runs on the
//! host's event loop and no consumer fault escapes into the host.

pub mod child;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod handshake;
pub mod parent;
pub mod registry;

pub use child::{ChildAgent, ChildContext};
pub use config::AgentOptions;
pub use detector::{ChangeDetector, LayoutMetrics, ScrollSample};
pub use dispatch::{run_guarded, Handler, HandlerResult, HandlerTable, Route, Side};
pub use document::{DocumentHost, MemoryDocument, Notify, ObserverId};
pub use error::{AgentError, Result};
pub use handshake::{ReadyAnnouncer, ReadyCallback, ReadyGate};
pub use parent::{ParentAgent, ParentConfig, ResizeCallback, ScrollCallback};
pub use registry::{AgentState, ChildRegistry};
