//! Event Hubs connection string parsing.
//!
//! Format: `Endpoint=sb://<namespace>.servicebus.windows.net/;SharedAccessKeyName=<name>;SharedAccessKey=<key>;EntityPath=<hub>`

use binding_core::{BindingError, BindingResult};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Port of the Event Hubs Kafka endpoint
pub const KAFKA_ENDPOINT_PORT: u16 = 9093;

/// A parsed Event Hubs connection string
///
/// The unparsed text is kept: the Kafka endpoint takes the full connection
/// string as SASL password. `Debug` never prints secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    raw: String,
    host: String,
    port: Option<u16>,
    shared_access_key_name: Option<String>,
    shared_access_key: Option<String>,
    shared_access_signature: Option<String>,
    entity_path: Option<String>,
}

impl ConnectionString {
    pub fn parse(s: &str) -> BindingResult<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(BindingError::config("connectionString cannot be empty"));
        }

        let mut endpoint = None;
        let mut shared_access_key_name = None;
        let mut shared_access_key = None;
        let mut shared_access_signature = None;
        let mut entity_path = None;

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Keys are base64 and may end in '=', so only split on the first one
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                BindingError::config("Malformed connectionString segment (expected key=value)")
            })?;

            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "sharedaccesskeyname" => shared_access_key_name = Some(value),
                "sharedaccesskey" => shared_access_key = Some(value),
                "sharedaccesssignature" => shared_access_signature = Some(value),
                "entitypath" => entity_path = Some(value).filter(|v| !v.is_empty()),
                _ => {}
            }
        }

        let endpoint =
            endpoint.ok_or_else(|| BindingError::config("connectionString is missing Endpoint"))?;
        let url = Url::parse(&endpoint).map_err(|e| {
            BindingError::config(format!("connectionString has an invalid Endpoint: {}", e))
        })?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BindingError::config("connectionString Endpoint has no host"))?
            .to_string();

        let has_key = shared_access_key_name.is_some() && shared_access_key.is_some();
        if !has_key && shared_access_signature.is_none() {
            return Err(BindingError::config(
                "connectionString needs SharedAccessKeyName and SharedAccessKey, or SharedAccessSignature",
            ));
        }

        Ok(Self {
            raw: raw.to_string(),
            host,
            port: url.port(),
            shared_access_key_name,
            shared_access_key,
            shared_access_signature,
            entity_path,
        })
    }

    /// The connection string as supplied
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Fully qualified namespace host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Event hub named by the connection string, if any
    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }

    pub fn shared_access_key_name(&self) -> Option<&str> {
        self.shared_access_key_name.as_deref()
    }

    /// `host:port` of the Kafka-compatible endpoint
    ///
    /// Uses the port from `Endpoint` when one is given.
    pub fn kafka_bootstrap_servers(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(KAFKA_ENDPOINT_PORT))
    }
}

impl FromStr for ConnectionString {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field(
                "shared_access_key",
                &self.shared_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "shared_access_signature",
                &self.shared_access_signature.as_ref().map(|_| "<redacted>"),
            )
            .field("entity_path", &self.entity_path)
            .finish()
    }
}
