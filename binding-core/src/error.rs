//! Error types for bindings.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type used throughout the binding API
pub type BindingResult<T> = Result<T, BindingError>;

/// Errors surfaced by bindings and runtimes
///
/// Nothing in the binding layer retries: every variant is returned to the
/// immediate caller of `write` or `read`.
#[derive(Error, Debug)]
pub enum BindingError {
    /// Metadata is missing a required field or cannot be interpreted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not establish a connection to the external service
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Sending a message failed after the connection was established
    #[error("Write error: {message}")]
    Write {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Listing partitions, subscribing or receiving failed
    #[error("Read error: {message}")]
    Read {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The read handler rejected a message and the policy made it fatal
    #[error("Handler error: {0}")]
    Handler(String),

    /// Payload could not be interpreted
    #[error("Invalid data: {message}")]
    InvalidData { message: String, payload: Vec<u8> },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BindingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
            source: None,
        }
    }

    pub fn write_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Write {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
            source: None,
        }
    }

    pub fn read_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Read {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    pub fn is_handler(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::InvalidData { .. })
    }

    /// Short, stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connection { .. } => "connection",
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::Handler(_) => "handler",
            Self::InvalidData { .. } => "invalid_data",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for BindingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_predicates() {
        assert!(BindingError::config("missing").is_config());
        assert!(BindingError::connection("refused").is_connection());
        assert!(BindingError::write("rejected").is_write());
        assert!(BindingError::read("no partitions").is_read());
        assert!(BindingError::handler("boom").is_handler());
        assert!(!BindingError::handler("boom").is_config());
    }

    #[test]
    fn test_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = BindingError::connection_with_source("Failed to connect", io);

        assert_eq!(err.to_string(), "Connection error: Failed to connect");
        assert_eq!(err.source().map(|s| s.to_string()), Some("refused".into()));
        assert_eq!(err.kind(), "connection");
    }
}
