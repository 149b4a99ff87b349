//! Core error types for alarmchain-core.
//!
//! Failures are split by where they originate: the external notification
//! service, an alarm's schedule, queue persistence, the alarm store and the
//! configuration file. Only [`EngineError::AuthorizationDenied`] is terminal
//! for a scheduling call; everything else is recovered locally by the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for alarmchain-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The OS refused notification permission. Never retried by the engine.
    #[error("Notification authorization denied")]
    AuthorizationDenied,

    /// Notification gateway errors
    #[error("Notification gateway error: {0}")]
    Gateway(GatewayError),

    /// Alarm schedule errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Queue persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Alarm store errors
    #[error("Alarm store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snooze length must be at least one minute
    #[error("Invalid snooze length: {0} minutes")]
    InvalidSnooze(u32),

    /// Local audio playback failed
    #[error("Playback error: {0}")]
    Playback(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Errors reported by the external notification service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The user has not granted (or has revoked) notification permission.
    #[error("Notification permission denied")]
    AuthorizationDenied,

    /// The service's pending-slot pool is full.
    #[error("Pending notification capacity of {capacity} exhausted")]
    CapacityExceeded { capacity: usize },

    /// The service rejected one request (malformed content, transient OS error).
    #[error("Registration of '{id}' rejected: {reason}")]
    Rejected { id: String, reason: String },

    /// The service could not be reached at all.
    #[error("Notification service unavailable: {0}")]
    Unavailable(String),
}

/// An alarm whose next fire date cannot be computed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid alarm time {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    #[error("Invalid repeat weekday {0} (expected 0-6, Sunday = 0)")]
    InvalidWeekday(u8),

    #[error("No wall-clock instant matches {hour:02}:{minute:02} after {after}")]
    Unrepresentable {
        hour: u32,
        minute: u32,
        after: chrono::DateTime<chrono::Utc>,
    },
}

/// Queue snapshot persistence errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to access queue snapshot at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode queue snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Alarm store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Alarm does not exist
    #[error("Alarm '{0}' not found")]
    NotFound(String),

    /// Stored row could not be decoded into an alarm
    #[error("Corrupt alarm row '{id}': {message}")]
    Corrupt { id: String, message: String },

    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

// Helper implementations for converting from other error types

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AuthorizationDenied => EngineError::AuthorizationDenied,
            other => EngineError::Gateway(other),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Store(err.into())
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_denial_maps_to_terminal_variant() {
        let err: EngineError = GatewayError::AuthorizationDenied.into();
        assert!(matches!(err, EngineError::AuthorizationDenied));
    }

    #[test]
    fn other_gateway_errors_stay_wrapped() {
        let err: EngineError = GatewayError::CapacityExceeded { capacity: 64 }.into();
        match err {
            EngineError::Gateway(GatewayError::CapacityExceeded { capacity }) => {
                assert_eq!(capacity, 64)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
