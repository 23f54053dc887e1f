//! Optional JSON Schema validation of custom message payloads.
//!
//! Register a JSON Schema per message type and reject payloads that do not
//! match it before they reach a handler. Types without a schema pass through
//! unless the registry is configured to fail on missing schemas.

pub mod config;
pub mod error;
pub mod registry;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
