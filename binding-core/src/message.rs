//! Message types exchanged between the hosting runtime and bindings.

use crate::{BindingError, BindingResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Message written through an output binding (Runtime → External System)
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    /// The message payload
    pub data: Vec<u8>,
    /// Optional message properties, forwarded as headers where supported
    pub metadata: HashMap<String, String>,
}

impl WriteRequest {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            metadata: HashMap::new(),
        }
    }

    /// Create a WriteRequest from a string payload
    pub fn from_string(data: impl Into<String>) -> Self {
        Self::new(data.into().into_bytes())
    }

    /// Create a WriteRequest from a JSON-serializable object
    pub fn from_json<T: Serialize>(data: &T) -> BindingResult<Self> {
        Ok(Self::new(serde_json::to_vec(data)?))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Message delivered to a read handler (External System → Runtime)
#[derive(Debug, Clone, Default)]
pub struct ReadResponse {
    /// The message payload
    pub data: Vec<u8>,
    /// Binding-populated properties (partition, offset, ...)
    pub metadata: HashMap<String, String>,
}

impl ReadResponse {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the payload as a UTF-8 string (if valid)
    pub fn payload_str(&self) -> BindingResult<&str> {
        std::str::from_utf8(&self.data).map_err(|e| BindingError::InvalidData {
            message: format!("Payload is not valid UTF-8: {}", e),
            payload: self.data.clone(),
        })
    }

    /// Deserialize the payload as JSON
    pub fn payload_json<T: DeserializeOwned>(&self) -> BindingResult<T> {
        serde_json::from_slice(&self.data).map_err(|e| BindingError::InvalidData {
            message: format!("Failed to deserialize JSON: {}", e),
            payload: self.data.clone(),
        })
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }
}
