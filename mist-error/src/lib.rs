//! Unified error handling for Mistcool
//!
//! This crate provides a single error type used across all Mistcool
//! components. It uses thiserror for ergonomic error definitions with proper
//! Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using CoolerError
pub type Result<T> = std::result::Result<T, CoolerError>;

/// Unified error type for all Mistcool operations
#[derive(thiserror::Error, Debug)]
pub enum CoolerError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ============================================================================
    // Sensor Errors
    // ============================================================================
    #[error("Sensor data missing: {0}")]
    SensorDataMissing(String),

    #[error("Outdoor temperature is unknown, cannot classify AC activity")]
    OutdoorTempUnknown,

    #[error("Flow sensor unreachable after {ticks} consecutive reads")]
    SensorUnreachable {
        ticks: u32,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to drive output {pin}: {reason}")]
    OutputWrite {
        pin: u32,
        reason: String,
    },

    #[error("Failed to read output {pin}: {reason}")]
    OutputRead {
        pin: u32,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Validation Errors
    // ============================================================================
    #[error("Invalid cooling mode index: {value} (must be 0-{max})")]
    InvalidModeIndex {
        value: i64,
        max: usize,
    },

    #[error("Invalid valve state value: {0}")]
    InvalidValveState(i64),

    #[error("Invalid cooling state value: {0}")]
    InvalidCoolingState(i64),

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No control message received for {elapsed_sec:.0} s")]
    TransportTimeout {
        elapsed_sec: f64,
    },

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    // ============================================================================
    // Hazard and Downstream Errors
    // ============================================================================
    #[error("Hazard detected: {0}")]
    HazardDetected(String),

    #[error("Downstream I/O failure: {0}")]
    DownstreamIo(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl CoolerError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error from a string
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid-config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True when the error is recoverable at a worker loop boundary.
    /// Only configuration errors are fatal at startup.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::InvalidConfig { .. })
    }
}

// Allow converting from String to CoolerError
impl From<String> for CoolerError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to CoolerError
impl From<&str> for CoolerError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = CoolerError::InvalidModeIndex { value: 12, max: 8 };
        assert_eq!(err.to_string(), "Invalid cooling mode index: 12 (must be 0-8)");
    }

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(!CoolerError::config("bad port").is_recoverable());
        assert!(CoolerError::TransportTimeout { elapsed_sec: 180.0 }.is_recoverable());
        assert!(CoolerError::HazardDetected("leak".into()).is_recoverable());
    }

    #[test]
    fn test_from_string() {
        let err: CoolerError = "boom".into();
        assert!(matches!(err, CoolerError::Generic(_)));
    }
}
