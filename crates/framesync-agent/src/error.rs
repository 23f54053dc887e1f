use framesync_wire::Rejection;

/// Errors reported by the agents.
///
/// None of these escape into the host: constructors keep them as the
/// agent's startup error, and inbound faults are logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Invalid options or an embedded target that cannot be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document cannot run a child agent.
    #[error("environment error: {0}")]
    Environment(String),

    /// An inbound message came from a disallowed origin.
    #[error("origin mismatch: expected '{expected}', got '{actual}'")]
    OriginMismatch { expected: String, actual: String },

    /// An inbound message was posted by a context other than the bound one.
    #[error("message from foreign context: {0}")]
    ForeignSource(String),

    /// No handler is registered for an inbound message type.
    #[error("no handler registered for message type '{0}'")]
    UnknownMessageType(String),

    /// A consumer callback returned an error or panicked.
    #[error("handler for '{msg_type}' failed: {reason}")]
    HandlerFault { msg_type: String, reason: String },

    /// The agent is not active.
    #[error("agent is {0}")]
    Inactive(crate::registry::AgentState),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framesync_transport::TransportError),

    /// Wire-level error.
    #[error("wire error: {0}")]
    Wire(#[from] framesync_wire::WireError),

    /// Schema validation error.
    #[cfg(feature = "schema")]
    #[error("schema validation error: {0}")]
    Schema(#[from] framesync_schema::SchemaError),
}

impl From<Rejection> for AgentError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::OriginMismatch { expected, actual } => {
                Self::OriginMismatch { expected, actual }
            }
            Rejection::ForeignSource { source } => Self::ForeignSource(
                source.map_or_else(|| "unknown".to_string(), |ctx| ctx.to_string()),
            ),
            Rejection::MissingType => Self::Wire(framesync_wire::WireError::MissingType),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
