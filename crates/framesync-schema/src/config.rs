/// How a [`SchemaRegistry`](crate::SchemaRegistry) treats payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Object schemas reject fields they do not declare.
    pub strict_mode: bool,
    /// Custom message types without a schema fail with `SchemaError::NoSchema`
    /// instead of passing through.
    pub fail_on_missing_schema: bool,
    /// Cap on `<type>.schema.json` files read by `from_directory`.
    pub max_schemas_from_directory: usize,
    /// Cap on the size of one schema file, in bytes.
    pub max_schema_file_size: usize,
}

impl RegistryConfig {
    /// Reject undeclared payload fields and unknown custom message types.
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            fail_on_missing_schema: true,
            ..Self::default()
        }
    }

    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    pub fn with_fail_on_missing_schema(mut self, enabled: bool) -> Self {
        self.fail_on_missing_schema = enabled;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            fail_on_missing_schema: false,
            max_schemas_from_directory: 256,
            max_schema_file_size: 256 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_permissive() {
        let config = RegistryConfig::default();
        assert!(!config.strict_mode);
        assert!(!config.fail_on_missing_schema);
    }

    #[test]
    fn strict_keeps_directory_limits() {
        let config = RegistryConfig::strict();
        assert!(config.strict_mode && config.fail_on_missing_schema);
        assert_eq!(
            config.max_schema_file_size,
            RegistryConfig::default().max_schema_file_size
        );
        assert_eq!(
            RegistryConfig::default()
                .with_strict_mode(true)
                .with_fail_on_missing_schema(true),
            config
        );
    }
}
