//! Configuration management for bindings.

use crate::{BindingError, BindingResult};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::str::FromStr;

/// Opaque binding metadata supplied by the hosting runtime
///
/// A JSON-shaped map of property names to values. The binding decides which
/// keys it understands; nothing is validated when the metadata is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingMetadata {
    properties: Map<String, Value>,
}

impl BindingMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from an already parsed JSON value
    ///
    /// Anything other than a JSON object is rejected.
    pub fn from_value(value: Value) -> BindingResult<Self> {
        match value {
            Value::Object(properties) => Ok(Self { properties }),
            other => Err(BindingError::config(format!(
                "binding metadata must be an object, got {}",
                other
            ))),
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a property as a string slice, if it is a JSON string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Interpret the metadata as a binding-specific typed configuration
    ///
    /// Missing required fields or values of the wrong shape surface as
    /// [`BindingError::Config`].
    pub fn decode<T: DeserializeOwned>(&self) -> BindingResult<T> {
        serde_json::from_value(Value::Object(self.properties.clone()))
            .map_err(|e| BindingError::config(format!("Invalid binding metadata: {}", e)))
    }
}

/// What an input binding does when the read handler returns an error
///
/// Deserializes case-insensitively through [`FromStr`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerErrorPolicy {
    /// Log the failure and keep delivering
    #[default]
    Continue,
    /// Log the failure and end the read loop with an error
    Stop,
}

impl FromStr for HandlerErrorPolicy {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "stop" => Ok(Self::Stop),
            other => Err(BindingError::config(format!(
                "Unknown handler error policy: {} (expected continue or stop)",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for HandlerErrorPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

/// Process-level configuration for a binding runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Binding name, used in logs and metric labels
    pub binding_name: String,

    /// Log level (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metadata handed to the binding on init
    #[serde(default)]
    pub metadata: BindingMetadata,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BindingConfig {
    pub fn new(binding_name: impl Into<String>, metadata: BindingMetadata) -> Self {
        Self {
            binding_name: binding_name.into(),
            log_level: default_log_level(),
            metadata,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BINDING_NAME`: Required, binding name
    /// - `LOG_LEVEL`: Log level (default: info)
    ///
    /// Metadata starts empty; bindings add their own properties.
    pub fn from_env() -> BindingResult<Self> {
        let binding_name =
            env::var("BINDING_NAME").map_err(|_| BindingError::config("BINDING_NAME is required"))?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level());

        Ok(Self {
            binding_name,
            log_level,
            metadata: BindingMetadata::default(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> BindingResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BindingError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            BindingError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides to the process-level settings
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("BINDING_NAME") {
            self.binding_name = val;
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> BindingResult<()> {
        if self.binding_name.is_empty() {
            return Err(BindingError::config("binding_name cannot be empty"));
        }

        if self.log_level.is_empty() {
            return Err(BindingError::config("log_level cannot be empty"));
        }

        Ok(())
    }
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self::new("default-binding", BindingMetadata::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TestMetadata {
        connection_string: String,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn test_config_default() {
        let config = BindingConfig::default();
        assert_eq!(config.binding_name, "default-binding");
        assert_eq!(config.log_level, "info");
        assert!(config.metadata.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BindingConfig::default();
        config.binding_name = "".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metadata_decode() {
        let metadata = BindingMetadata::new()
            .with_property("connectionString", "Endpoint=sb://x/")
            .with_property("retries", 2);

        let decoded: TestMetadata = metadata.decode().unwrap();
        assert_eq!(decoded.connection_string, "Endpoint=sb://x/");
        assert_eq!(decoded.retries, 2);
    }

    #[test]
    fn test_metadata_decode_missing_field() {
        let metadata = BindingMetadata::new().with_property("retries", 2);

        let err = metadata.decode::<TestMetadata>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_metadata_decode_wrong_shape() {
        let metadata = BindingMetadata::new().with_property("connectionString", json!(["a"]));

        let err = metadata.decode::<TestMetadata>().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_metadata_from_value() {
        let metadata = BindingMetadata::from_value(json!({"connectionString": "abc"})).unwrap();
        assert_eq!(metadata.get_str("connectionString"), Some("abc"));
        assert!(metadata.contains("connectionString"));
        assert_eq!(metadata.len(), 1);

        assert!(BindingMetadata::from_value(json!("not an object")).is_err());
    }

    #[test]
    fn test_handler_error_policy_parse() {
        assert_eq!(
            "continue".parse::<HandlerErrorPolicy>().unwrap(),
            HandlerErrorPolicy::Continue
        );
        assert_eq!(
            "STOP".parse::<HandlerErrorPolicy>().unwrap(),
            HandlerErrorPolicy::Stop
        );
        assert!("retry".parse::<HandlerErrorPolicy>().is_err());
        assert_eq!(HandlerErrorPolicy::default(), HandlerErrorPolicy::Continue);
    }

    #[test]
    fn test_handler_error_policy_decode() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PolicyMetadata {
            handler_error_policy: HandlerErrorPolicy,
        }

        let metadata = BindingMetadata::new().with_property("handlerErrorPolicy", "Stop");
        let decoded: PolicyMetadata = metadata.decode().unwrap();
        assert_eq!(decoded.handler_error_policy, HandlerErrorPolicy::Stop);

        let invalid = BindingMetadata::new().with_property("handlerErrorPolicy", "retry");
        let err = invalid.decode::<PolicyMetadata>().err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("retry"));
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
binding_name = "orders"
log_level = "debug"

[metadata]
connectionString = "Endpoint=sb://orders.servicebus.windows.net/"
skipTlsVerify = true
"#
        )
        .unwrap();

        let config = BindingConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.binding_name, "orders");
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.metadata.get_str("connectionString"),
            Some("Endpoint=sb://orders.servicebus.windows.net/")
        );
        assert_eq!(config.metadata.get("skipTlsVerify"), Some(&json!(true)));
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = BindingConfig::from_file("/nonexistent/binding.toml").unwrap_err();
        assert!(err.is_config());
    }
}
