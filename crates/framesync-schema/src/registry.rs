use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use framesync_wire::Message;
use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::validate_payload;

const SCHEMA_SUFFIX: &str = ".schema.json";
const MAX_TYPE_LEN: usize = 128;

/// Message-type-keyed registry of compiled JSON Schema validators.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Register a schema for a message type from a JSON string.
    pub fn register(&mut self, msg_type: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(msg_type, &schema)
    }

    /// Register a schema for a message type from a JSON value.
    pub fn register_value(&mut self, msg_type: &str, schema: &Value) -> Result<()> {
        validate_type_name(msg_type)?;

        let mut schema_to_compile = schema.clone();
        if self.config.strict_mode {
            apply_strict_mode(&mut schema_to_compile);
        }

        let compiled = jsonschema::validator_for(&schema_to_compile)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;

        self.validators.insert(msg_type.to_string(), compiled);
        Ok(())
    }

    /// Load schemas from a directory of `<type>.schema.json` files.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        let mut loaded_schema_count = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(msg_type) = file_name.strip_suffix(SCHEMA_SUFFIX) else {
                continue;
            };

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if metadata.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !metadata.is_file() {
                continue;
            }

            loaded_schema_count = loaded_schema_count.saturating_add(1);
            if loaded_schema_count > registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({}): {}",
                    registry.config.max_schemas_from_directory, loaded_schema_count
                )));
            }

            if metadata.len() > registry.config.max_schema_file_size as u64 {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large ({} bytes): {file_name}",
                    metadata.len()
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                SchemaError::LoadFailed(format!(
                    "failed opening schema {}: {err}",
                    entry_path.display()
                ))
            })?;
            let max_bytes = registry.config.max_schema_file_size;
            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    SchemaError::LoadFailed(format!(
                        "failed reading schema {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large while reading: {file_name}"
                )));
            }

            registry.register(msg_type, &content)?;
            tracing::debug!(msg_type, "loaded message schema");
        }

        Ok(registry)
    }

    /// Load from embedded schema strings.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (msg_type, schema) in schemas {
            registry.register(msg_type, schema)?;
        }
        Ok(registry)
    }

    /// Validate a payload against the schema registered for `msg_type`.
    pub fn validate(&self, msg_type: &str, payload: &Value) -> Result<()> {
        match self.validators.get(msg_type) {
            Some(validator) => validate_payload(msg_type, payload, validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(msg_type.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Validate a message's payload fields against its type's schema.
    pub fn validate_message(&self, message: &Message) -> Result<()> {
        self.validate(&message.msg_type, &message.payload_value())
    }

    /// Check if a message type has a registered schema.
    pub fn has_schema(&self, msg_type: &str) -> bool {
        self.validators.contains_key(msg_type)
    }

    /// Message types that have registered schemas, sorted.
    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.validators.keys().cloned().collect();
        types.sort_unstable();
        types
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("message_types", &self.message_types())
            .field("config", &self.config)
            .finish()
    }
}

fn validate_type_name(msg_type: &str) -> Result<()> {
    let valid = !msg_type.is_empty()
        && msg_type.len() <= MAX_TYPE_LEN
        && msg_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidType(msg_type.to_string()))
    }
}

fn apply_strict_mode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            recurse_object_schema_children(map);
        }
        Value::Array(items) => {
            for item in items {
                apply_strict_mode(item);
            }
        }
        _ => {}
    }
}

fn recurse_object_schema_children(map: &mut Map<String, Value>) {
    for key in [
        "properties",
        "patternProperties",
        "dependentSchemas",
        "$defs",
        "definitions",
    ] {
        if let Some(Value::Object(obj)) = map.get_mut(key) {
            obj.values_mut().for_each(apply_strict_mode);
        }
    }

    for key in [
        "propertyNames",
        "additionalProperties",
        "unevaluatedProperties",
        "items",
        "contains",
        "additionalItems",
        "unevaluatedItems",
        "not",
        "if",
        "then",
        "else",
        "prefixItems",
        "allOf",
        "anyOf",
        "oneOf",
    ] {
        if let Some(value) = map.get_mut(key) {
            apply_strict_mode(value);
        }
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    const OBJECT_KEYWORDS: [&str; 8] = [
        "properties",
        "patternProperties",
        "additionalProperties",
        "unevaluatedProperties",
        "required",
        "dependentRequired",
        "dependentSchemas",
        "propertyNames",
    ];

    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Value::String(kind) if kind == "object")),
        _ => OBJECT_KEYWORDS
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    const GREETING_SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "id": { "type": "integer" },
            "name": { "type": "string" }
        },
        "required": ["id", "name"]
    }"#;

    #[test]
    fn register_and_validate() {
        let mut registry = SchemaRegistry::new();
        registry.register("greeting", GREETING_SCHEMA).unwrap();

        assert!(registry
            .validate("greeting", &json!({ "id": 1, "name": "ok" }))
            .is_ok());
        assert!(matches!(
            registry.validate("greeting", &json!({ "id": "bad", "name": "ok" })),
            Err(SchemaError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn validate_message_checks_payload_fields() {
        let registry = SchemaRegistry::from_embedded(&[("greeting", GREETING_SCHEMA)]).unwrap();
        let good = Message::new("greeting", json!({ "id": 2, "name": "b" })).unwrap();
        let bad = Message::new("greeting", json!({ "id": 2 })).unwrap();

        assert!(registry.validate_message(&good).is_ok());
        assert!(registry.validate_message(&bad).is_err());
    }

    #[test]
    fn missing_schema_permissive_passes() {
        let registry = SchemaRegistry::new();
        assert!(registry.validate("anything", &json!({ "any": "thing" })).is_ok());
    }

    #[test]
    fn missing_schema_strict_fails() {
        let registry = SchemaRegistry::with_config(RegistryConfig {
            fail_on_missing_schema: true,
            ..RegistryConfig::default()
        });

        assert!(matches!(
            registry.validate("anything", &json!({})),
            Err(SchemaError::NoSchema(_))
        ));
    }

    #[test]
    fn strict_mode_rejects_additional_properties() {
        let mut permissive = SchemaRegistry::new();
        permissive.register("greeting", GREETING_SCHEMA).unwrap();

        let mut strict = SchemaRegistry::with_config(RegistryConfig {
            strict_mode: true,
            ..RegistryConfig::default()
        });
        strict.register("greeting", GREETING_SCHEMA).unwrap();

        let payload = json!({ "id": 1, "name": "ok", "extra": true });
        assert!(permissive.validate("greeting", &payload).is_ok());
        assert!(matches!(
            strict.validate("greeting", &payload),
            Err(SchemaError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn strict_mode_applies_nested_objects() {
        let schema = r#"{
            "type": "object",
            "properties": {
                "nested": {
                    "type": "object",
                    "properties": { "v": { "type": "integer" } },
                    "required": ["v"]
                }
            },
            "required": ["nested"]
        }"#;

        let mut strict = SchemaRegistry::with_config(RegistryConfig {
            strict_mode: true,
            ..RegistryConfig::default()
        });
        strict.register("nested", schema).unwrap();

        assert!(strict.validate("nested", &json!({ "nested": { "v": 1 } })).is_ok());
        assert!(strict
            .validate("nested", &json!({ "nested": { "v": 1, "extra": true } }))
            .is_err());
    }

    #[test]
    fn invalid_schema_fails_compile() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register("x", r#"{"type":"definitely-not-a-type"}"#),
            Err(SchemaError::CompileFailed(_))
        ));
        assert!(matches!(
            registry.register("x", "{not-json"),
            Err(SchemaError::InvalidJson(_))
        ));
    }

    #[test]
    fn rejects_unusable_type_names() {
        let mut registry = SchemaRegistry::new();
        for name in ["", "has space", "slash/type"] {
            assert!(matches!(
                registry.register(name, GREETING_SCHEMA),
                Err(SchemaError::InvalidType(_))
            ));
        }
    }

    #[test]
    fn from_directory_loads_by_file_name() {
        let dir = make_temp_schema_dir("from-directory");
        write_schema(&dir, "greeting.schema.json", GREETING_SCHEMA);
        write_schema(&dir, "ids.schema.json", r#"{"type":"object","required":["ids"]}"#);
        write_schema(&dir, "ignored.json", GREETING_SCHEMA);

        let registry = SchemaRegistry::from_directory(&dir).unwrap();
        assert_eq!(registry.message_types(), vec!["greeting", "ids"]);
        assert!(registry
            .validate("greeting", &json!({ "id": 5, "name": "ok" }))
            .is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_limits_are_enforced() {
        let dir = make_temp_schema_dir("limits");
        write_schema(&dir, "a.schema.json", GREETING_SCHEMA);
        write_schema(&dir, "b.schema.json", GREETING_SCHEMA);

        let too_many = SchemaRegistry::from_directory_with_config(
            &dir,
            RegistryConfig {
                max_schemas_from_directory: 1,
                ..RegistryConfig::default()
            },
        );
        assert!(matches!(too_many, Err(SchemaError::LoadFailed(_))));

        let too_big = SchemaRegistry::from_directory_with_config(
            &dir,
            RegistryConfig {
                max_schema_file_size: 8,
                ..RegistryConfig::default()
            },
        );
        assert!(matches!(too_big, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_schema_is_rejected() {
        let dir = make_temp_schema_dir("symlink-schema");
        let target = dir.join("target.json");
        std::fs::write(&target, GREETING_SCHEMA.as_bytes()).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("greeting.schema.json")).unwrap();

        let result = SchemaRegistry::from_directory(&dir);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn make_temp_schema_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framesync-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_schema(dir: &Path, file_name: &str, contents: &str) {
        std::fs::write(dir.join(file_name), contents.as_bytes()).unwrap();
    }
}
