//! Domain error types
//!
//! This module defines the error hierarchy for HL7 Relay.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main HL7 Relay error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Processing state errors (attempt bookkeeping)
    #[error("Processing state error: {0}")]
    State(String),

    /// Identity mapping errors
    #[error("Identity mapping error: {0}")]
    Mapping(String),

    /// Envelope composition errors
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// Downstream delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

/// Downstream delivery errors
///
/// Errors raised while sending an envelope to the downstream service.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Failed to connect to the downstream service
    #[error("Failed to connect to downstream service: {0}")]
    ConnectionFailed(String),

    /// Could not obtain an authorization header
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Downstream answered with a non-success status
    ///
    /// Displays as the status line and body separated by CRLF so the
    /// recorded cause mirrors the raw HTTP response.
    #[error("{status_line}\r\n{body}")]
    Rejected { status_line: String, body: String },

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl DeliveryError {
    /// Whether the failure came from the downstream service itself rather than the transport
    pub fn is_rejection(&self) -> bool {
        matches!(self, DeliveryError::Rejected { .. })
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_display() {
        let err = RelayError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_delivery_error_conversion() {
        let delivery_err = DeliveryError::ConnectionFailed("Network error".to_string());
        let relay_err: RelayError = delivery_err.into();
        assert!(matches!(relay_err, RelayError::Delivery(_)));
    }

    #[test]
    fn test_rejected_display_is_status_line_and_body() {
        let err = DeliveryError::Rejected {
            status_line: "HTTP/1.1 500 Internal Server Error".to_string(),
            body: "{\"error\":\"boom\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP/1.1 500 Internal Server Error\r\n{\"error\":\"boom\"}"
        );
        assert!(err.is_rejection());
        assert!(!DeliveryError::Timeout("30s".to_string()).is_rejection());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let relay_err: RelayError = io_err.into();
        assert!(matches!(relay_err, RelayError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let relay_err: RelayError = json_err.into();
        assert!(matches!(relay_err, RelayError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let relay_err: RelayError = toml_err.into();
        assert!(matches!(relay_err, RelayError::Configuration(_)));
        assert!(relay_err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_relay_error_implements_std_error() {
        let err = RelayError::State("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
