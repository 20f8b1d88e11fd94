//! Core error types for nook-core.
//!
//! This module defines the error hierarchy using thiserror. Timer errors are
//! recoverable by the caller (an invalid transition is simply ignored), while
//! persistence errors are logged and retried by the debounced writer.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::{SessionMode, TimerStatus};

/// Core error type for nook-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Timer engine / orchestrator errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task provider errors
    #[error("Task error: {0}")]
    Task(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the countdown engine and the session orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The requested command is not valid in the current state.
    #[error("cannot {action} while {mode:?} timer is {status:?}")]
    InvalidTransition {
        action: &'static str,
        mode: SessionMode,
        status: TimerStatus,
    },

    /// The requested command is not valid while waiting for extend/break.
    #[error("cannot {action} while awaiting an extend-or-break decision")]
    AwaitingDecision { action: &'static str },

    /// The orchestrator is not waiting for an extend/break decision.
    #[error("no completed focus session is awaiting a decision")]
    NoDecisionPending,

    /// The host clock could not be read. The engine stays degraded.
    #[error("clock unavailable: {0}")]
    ClockUnavailable(String),
}

impl TimerError {
    /// Whether the error is a transition the caller should just ignore.
    pub fn is_ignorable(&self) -> bool {
        !matches!(self, TimerError::ClockUnavailable(_))
    }
}

/// Persistence-specific errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open the backing database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A key could not be written
    #[error("Failed to write key '{key}': {message}")]
    WriteFailed { key: String, message: String },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Value could not be encoded
    #[error("Failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
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

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::QueryFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
