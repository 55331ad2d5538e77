//! Error handling for the field measurement service
//!
//! A single service-wide taxonomy: transport faults, timeouts, protocol
//! violations, dual-reading tolerance failures and calibration-state errors
//! are distinct variants so callers can react to each without string
//! matching. Errors are never downgraded to default values; a failed device
//! transaction always propagates to the measurement caller.

use thiserror::Error;

/// Field service error type
#[derive(Error, Debug, Clone)]
pub enum FieldError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Connection establishment and maintenance errors
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation timeout errors (no complete response within bound)
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Malformed or unexpected bytes, bad checksum, failed handshake
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Dual-reading slope distances disagree beyond 3 mm
    #[error("Tolerance error: {0}")]
    ToleranceError(String),

    /// Operation attempted out of required calibration state, or no
    /// reliable reading available
    #[error("Calibration error: {0}")]
    CalibrationError(String),

    /// Data handling errors (serialization, parsing, conversion)
    #[error("Data error: {0}")]
    DataError(String),

    /// Result cache persistence errors
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Internal errors (unknown, general)
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the field service
pub type Result<T> = std::result::Result<T, FieldError>;

impl FieldError {
    pub fn config(msg: impl Into<String>) -> Self {
        FieldError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        FieldError::IoError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        FieldError::ConnectionError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        FieldError::TimeoutError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        FieldError::ProtocolError(msg.into())
    }

    pub fn tolerance(msg: impl Into<String>) -> Self {
        FieldError::ToleranceError(msg.into())
    }

    pub fn calibration(msg: impl Into<String>) -> Self {
        FieldError::CalibrationError(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        FieldError::DataError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        FieldError::StorageError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        FieldError::InternalError(msg.into())
    }

    // Convenience constructors for specific cases
    pub fn not_connected(role: impl std::fmt::Display) -> Self {
        FieldError::ConnectionError(format!("No connection for role: {role}"))
    }

    pub fn already_connected(role: impl std::fmt::Display) -> Self {
        FieldError::ConnectionError(format!(
            "Connection already open for role: {role} (disconnect first)"
        ))
    }

    /// True for faults where a bounded retry of the whole operation is
    /// reasonable (transient line noise, disagreeing dual reads, a device
    /// still booting).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FieldError::TimeoutError(_)
                | FieldError::ToleranceError(_)
                | FieldError::ProtocolError(_)
                | FieldError::ConnectionError(_)
        )
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for FieldError {
    fn from(err: std::io::Error) -> Self {
        FieldError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(err: serde_json::Error) -> Self {
        FieldError::DataError(format!("JSON: {err}"))
    }
}

impl From<figment::Error> for FieldError {
    fn from(err: figment::Error) -> Self {
        FieldError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn connection_error(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn connection_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| FieldError::ConnectionError(format!("{msg}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_prefix() {
        let err = FieldError::protocol("bad checksum");
        assert_eq!(err.to_string(), "Protocol error: bad checksum");

        let err = FieldError::tolerance("readings differ by 4.2 mm");
        assert!(err.to_string().starts_with("Tolerance error"));
    }

    #[test]
    fn connection_context_wraps_the_source() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        let err = result.connection_error("Simulator bind failed").unwrap_err();
        assert!(matches!(err, FieldError::ConnectionError(_)));
        assert!(err.to_string().contains("Simulator bind failed"));
    }

    #[test]
    fn retryable_classification() {
        assert!(FieldError::timeout("x").is_retryable());
        assert!(FieldError::tolerance("x").is_retryable());
        assert!(!FieldError::calibration("x").is_retryable());
        assert!(!FieldError::config("x").is_retryable());
    }

    #[test]
    fn error_ext_attaches_context() {
        let result: std::result::Result<(), &str> = Err("refused");
        let mapped = result.connection_error("open failed");
        match mapped {
            Err(FieldError::ConnectionError(msg)) => {
                assert!(msg.contains("open failed"));
                assert!(msg.contains("refused"));
            },
            other => panic!("unexpected: {other:?}"),
        }
    }
}
