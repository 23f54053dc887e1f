//! Cross-context transport abstraction.
//!
//! Provides a unified interface over the host's "post a structured message to
//! another browsing context" primitive:
//! - a real browser window (see the `framesync-wasm` binding)
//! - an in-memory simulated host with a deterministic event loop ([`memory`])
//!
//! This is the lowest layer of framesync. Everything else builds on top of
//! the [`Endpoint`] and [`Scheduler`] traits provided here.

pub mod error;
pub mod memory;
pub mod origin;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{EventLoop, MemoryBus, MemoryEndpoint};
pub use origin::TargetOrigin;
pub use traits::{ContextId, Endpoint, InboundEvent, Listener, ListenerId, Scheduler, Task};

#[doc(hidden)]
pub use tracing as __tracing;

/// Emit a `tracing` event only when diagnostics are switched on.
///
/// Agents are silent by default; every diagnostic they produce goes through
/// this gate so the `log` option controls all of them at once.
///
/// ```
/// let verbose = true;
/// framesync_transport::diag!(verbose, warn, origin = "https://a.example", "dropped message");
/// ```
#[macro_export]
macro_rules! diag {
    ($enabled:expr, $level:ident, $($arg:tt)+) => {
        if $enabled {
            $crate::__tracing::$level!($($arg)+);
        }
    };
}
