//! Keep an embedded document and its embedder in sync.
//!
//! framesync carries content size, scroll position and custom messages
//! between an embedded document and the page embedding it, over the host's
//! origin-checked cross-context post primitive.
//!
//! # Crate Structure
//!
//! - [`transport`]: Host post primitive abstraction and the in-memory host
//! - [`wire`]: Tagged message format and origin-filtered channel
//! - [`agent`]: Child and parent agents
//! - [`schema`]: Optional JSON Schema validation (behind `schema` feature)
//! - [`simulate`]: Child and parent wired together over the in-memory host

pub mod simulate;

/// Re-export transport types.
pub mod transport {
    pub use framesync_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use framesync_wire::*;
}

/// Re-export agent types.
pub mod agent {
    pub use framesync_agent::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use framesync_schema::*;
}

pub use framesync_agent::{
    AgentError, AgentOptions, AgentState, ChildAgent, ChildContext, ChildRegistry, ParentAgent,
    ParentConfig,
};
