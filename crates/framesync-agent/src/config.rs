use std::time::Duration;

use framesync_transport::TargetOrigin;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Options shared by child and parent agents.
///
/// Deserializes from the camelCase option objects embedding pages pass in;
/// every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentOptions {
    /// Origin outbound messages are addressed to and inbound messages must
    /// come from. `*` accepts any origin.
    pub target_origin: String,
    /// Emit diagnostics through `tracing`.
    pub log: bool,
    /// Child: report content size changes.
    pub resize: bool,
    /// Child: report scroll position.
    pub scroll: bool,
    /// Child: payload of the `ready` announcement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_data: Option<Map<String, Value>>,
    /// Child: extra `ready` announcements sent until the parent acknowledges.
    pub ready_retries: u32,
    /// Child: delay between `ready` announcements.
    pub ready_retry_interval_ms: u64,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            target_origin: framesync_transport::origin::WILDCARD.to_string(),
            log: false,
            resize: true,
            scroll: true,
            init_data: None,
            ready_retries: 0,
            ready_retry_interval_ms: 500,
        }
    }
}

impl AgentOptions {
    /// Parse options from a JSON value. `null` yields the defaults.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|err| AgentError::Configuration(format!("invalid options: {err}")))
    }

    pub fn with_target_origin(mut self, origin: impl Into<String>) -> Self {
        self.target_origin = origin.into();
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_init_data(mut self, init_data: Map<String, Value>) -> Self {
        self.init_data = Some(init_data);
        self
    }

    /// Check the options and return the parsed target origin.
    pub fn validate(&self) -> Result<TargetOrigin> {
        let origin = TargetOrigin::parse(&self.target_origin)
            .map_err(|reason| AgentError::Configuration(format!("targetOrigin: {reason}")))?;
        if self.ready_retries > 0 && self.ready_retry_interval_ms == 0 {
            return Err(AgentError::Configuration(
                "readyRetryIntervalMs must be positive when readyRetries is set".to_string(),
            ));
        }
        Ok(origin)
    }

    pub fn ready_retry_interval(&self) -> Duration {
        Duration::from_millis(self.ready_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = AgentOptions::default();
        assert_eq!(options.target_origin, "*");
        assert!(!options.log);
        assert!(options.resize);
        assert!(options.scroll);
        assert!(options.init_data.is_none());
        assert_eq!(options.ready_retries, 0);
        assert_eq!(options.ready_retry_interval(), Duration::from_millis(500));
        assert_eq!(options.validate().unwrap(), TargetOrigin::Any);
    }

    #[test]
    fn partial_camel_case_objects_fill_defaults() {
        let options = AgentOptions::from_value(json!({
            "targetOrigin": "https://parent.example",
            "scroll": false,
            "initData": { "theme": "dark" },
            "readyRetries": 3
        }))
        .unwrap();

        assert_eq!(options.target_origin, "https://parent.example");
        assert!(options.resize);
        assert!(!options.scroll);
        assert_eq!(options.init_data.unwrap()["theme"], "dark");
        assert_eq!(options.ready_retries, 3);
        assert_eq!(AgentOptions::from_value(Value::Null).unwrap(), AgentOptions::default());
    }

    #[test]
    fn mistyped_options_are_configuration_errors() {
        for value in [
            json!({ "resize": "yes" }),
            json!({ "targetOrigni": "*" }),
            json!("https://parent.example"),
        ] {
            assert!(matches!(
                AgentOptions::from_value(value),
                Err(AgentError::Configuration(_))
            ));
        }
    }

    #[test]
    fn validate_rejects_bad_origins_and_zero_interval() {
        let bad_origin = AgentOptions::default().with_target_origin("parent.example");
        assert!(matches!(
            bad_origin.validate(),
            Err(AgentError::Configuration(_))
        ));

        let zero_interval = AgentOptions {
            ready_retries: 2,
            ready_retry_interval_ms: 0,
            ..AgentOptions::default()
        };
        assert!(zero_interval.validate().is_err());

        let exact = AgentOptions::default().with_target_origin("https://parent.example/");
        assert_eq!(exact.validate().unwrap().as_str(), "https://parent.example");
    }
}
