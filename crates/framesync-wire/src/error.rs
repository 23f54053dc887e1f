/// Errors that can occur while encoding, decoding or exchanging messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The inbound data has no string `type` field.
    #[error("message has no string 'type' field")]
    MissingType,

    /// Message payloads must be JSON objects (or null for none).
    #[error("payload for '{msg_type}' must be an object, got {kind}")]
    PayloadNotObject { msg_type: String, kind: &'static str },

    /// A built-in message carries a payload of the wrong shape.
    #[error("invalid '{msg_type}' payload: {reason}")]
    InvalidPayload { msg_type: String, reason: String },

    /// `receive` was called while a listener is already installed.
    #[error("channel already has a listener installed")]
    AlreadyListening,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framesync_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, WireError>;
