//! Configuration for the Event Hubs binding

use crate::client::{ClientOptions, StartPosition};
use crate::connection_string::ConnectionString;
use binding_core::{BindingConfig, BindingError, BindingMetadata, BindingResult, HandlerErrorPolicy};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Metadata keys and the environment variables that override them
const METADATA_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("EVENTHUBS_CONNECTION_STRING", "connectionString"),
    ("EVENTHUBS_EVENT_HUB", "eventHub"),
    ("EVENTHUBS_CONSUMER_GROUP", "consumerGroup"),
    ("EVENTHUBS_START_POSITION", "startPosition"),
    ("EVENTHUBS_SKIP_TLS_VERIFY", "skipTlsVerify"),
    ("EVENTHUBS_HANDLER_ERROR_POLICY", "handlerErrorPolicy"),
    ("EVENTHUBS_SEND_TIMEOUT_MS", "sendTimeoutMs"),
];

/// Bounds librdkafka accepts for `socket.timeout.ms`, which follows `sendTimeoutMs`
const SEND_TIMEOUT_RANGE_MS: RangeInclusive<u64> = 10..=300_000;

/// Typed view of the binding metadata
///
/// Hosting runtimes often pass every value as a string, so booleans and
/// numbers are accepted in either form.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHubsMetadata {
    /// Event Hubs connection string, including credentials
    pub connection_string: String,

    /// Hub name, for namespace-level connection strings without EntityPath
    #[serde(default)]
    pub event_hub: Option<String>,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    #[serde(default)]
    pub start_position: StartPosition,

    /// Disable TLS certificate verification for this binding's client
    #[serde(default, deserialize_with = "flexible_bool")]
    pub skip_tls_verify: bool,

    #[serde(default)]
    pub handler_error_policy: HandlerErrorPolicy,

    #[serde(default = "default_send_timeout_ms", deserialize_with = "flexible_u64")]
    pub send_timeout_ms: u64,
}

fn default_consumer_group() -> String {
    "$Default".to_string()
}

fn default_send_timeout_ms() -> u64 {
    30_000
}

fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => s
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid boolean: {}", s))),
        other => Err(de::Error::custom(format!("invalid boolean: {}", other))),
    }
}

fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("invalid unsigned integer: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid unsigned integer: {}", s))),
        other => Err(de::Error::custom(format!(
            "invalid unsigned integer: {}",
            other
        ))),
    }
}

impl EventHubsMetadata {
    /// Decode and validate binding metadata
    pub fn from_metadata(metadata: &BindingMetadata) -> BindingResult<Self> {
        let config: Self = metadata.decode()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> BindingResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(BindingError::config("connectionString cannot be empty"));
        }

        if self.consumer_group.is_empty() {
            return Err(BindingError::config("consumerGroup cannot be empty"));
        }

        if !SEND_TIMEOUT_RANGE_MS.contains(&self.send_timeout_ms) {
            return Err(BindingError::config(format!(
                "sendTimeoutMs must be between {} and {}, got {}",
                SEND_TIMEOUT_RANGE_MS.start(),
                SEND_TIMEOUT_RANGE_MS.end(),
                self.send_timeout_ms
            )));
        }

        Ok(())
    }

    pub fn connection(&self) -> BindingResult<ConnectionString> {
        ConnectionString::parse(&self.connection_string)
    }

    /// Resolve the hub name from EntityPath or `eventHub`
    pub fn event_hub_name(&self, connection: &ConnectionString) -> BindingResult<String> {
        match (connection.entity_path(), self.event_hub.as_deref()) {
            (Some(path), Some(hub)) if path != hub => Err(BindingError::config(format!(
                "eventHub '{}' does not match EntityPath '{}' in connectionString",
                hub, path
            ))),
            (Some(path), _) => Ok(path.to_string()),
            (None, Some(hub)) if !hub.is_empty() => Ok(hub.to_string()),
            _ => Err(BindingError::config(
                "connectionString has no EntityPath and eventHub is not set",
            )),
        }
    }

    /// Everything needed to open a client, without touching the network
    pub fn client_options(&self) -> BindingResult<ClientOptions> {
        let connection = self.connection()?;
        let event_hub = self.event_hub_name(&connection)?;

        Ok(ClientOptions {
            connection,
            event_hub,
            consumer_group: self.consumer_group.clone(),
            skip_tls_verify: self.skip_tls_verify,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        })
    }
}

impl fmt::Debug for EventHubsMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHubsMetadata")
            .field("connection_string", &"<redacted>")
            .field("event_hub", &self.event_hub)
            .field("consumer_group", &self.consumer_group)
            .field("start_position", &self.start_position)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("handler_error_policy", &self.handler_error_policy)
            .field("send_timeout_ms", &self.send_timeout_ms)
            .finish()
    }
}

/// Load the binary's configuration
///
/// Priority: TOML file (`CONFIG_FILE`) or core environment variables, then
/// `EVENTHUBS_*` environment overrides for the metadata.
///
/// # Example
///
/// ```toml
/// binding_name = "orders"
/// log_level = "info"
///
/// [metadata]
/// connectionString = "Endpoint=sb://orders-ns.servicebus.windows.net/;SharedAccessKeyName=app;SharedAccessKey=...;EntityPath=orders"
/// startPosition = "latest"
/// ```
pub fn load_config() -> BindingResult<BindingConfig> {
    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        BindingConfig::from_file(&config_file)?
    } else {
        BindingConfig::from_env()?
    };

    config.apply_env_overrides();
    apply_metadata_overrides(&mut config.metadata, |key| env::var(key).ok());

    Ok(config)
}

/// Copy `EVENTHUBS_*` values found by `lookup` into the metadata
pub fn apply_metadata_overrides<F>(metadata: &mut BindingMetadata, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, key) in METADATA_ENV_OVERRIDES {
        if let Some(value) = lookup(var) {
            metadata.insert(*key, value);
        }
    }
}
