use crate::traits::ContextId;

/// Errors that can occur in cross-context transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host refused to post the message.
    #[error("failed to post message: {0}")]
    Post(String),

    /// The host refused to install a message listener.
    #[error("failed to install listener: {0}")]
    Listen(String),

    /// No browsing context is registered under this id.
    #[error("unknown context {0}")]
    UnknownContext(ContextId),
}

pub type Result<T> = std::result::Result<T, TransportError>;
