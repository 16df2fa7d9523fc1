//! # Error Types
//!
//! Custom error types for the telemetry receiver using `thiserror`.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a single frame is rejected by the decoder
///
/// Decode errors never leave the pipeline: the frame is dropped and counted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Payload is not valid UTF-8
    #[error("frame is not valid UTF-8")]
    NotUtf8,

    /// Payload does not match the `<tag><number>,<number>` grammar
    #[error("malformed frame: {0:?}")]
    Malformed(String),

    /// A numeric token parsed to infinity or NaN
    #[error("non-finite number in frame: {0}")]
    NonFinite(String),
}

/// Main error type for the telemetry receiver
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Frame decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Link establishment failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Characteristic subscription failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Radio access refused by the platform
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// `start_session` while a session is running
    #[error("a logging session is already active")]
    SessionAlreadyActive,

    /// `stop_session` while no session is running
    #[error("no logging session is active")]
    SessionNotActive,

    /// Writing a session export failed
    #[error("failed to export session to {}: {reason}", path.display())]
    Export {
        /// Target file or directory
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The connection manager is no longer running
    #[error("receiver has shut down")]
    Closed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReceiverError {
    /// Whether this error must be shown to the user instead of being
    /// absorbed by the connection state machine.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ReceiverError::PermissionDenied(_) | ReceiverError::Export { .. }
        )
    }
}

/// Result type alias for the telemetry receiver
pub type Result<T> = std::result::Result<T, ReceiverError>;
