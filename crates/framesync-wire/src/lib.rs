//! Tagged message format with an origin-filtered channel.
//!
//! Every message on the wire is one flat JSON object:
//! - a string `type` field naming the message
//! - any number of payload fields beside it
//!
//! Objects without a string `type` are dropped on receipt, never dispatched.

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod payload;

pub use channel::{Channel, InboundFilter, Rejection, RejectionHook};
pub use codec::{decode_message, encode_message};
pub use error::{Result, WireError};
pub use message::{Message, INIT, READY, READY_ACK, RESIZE, SCROLL};
pub use payload::{Dimension, ScrollPosition};
