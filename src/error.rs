//! Error types for scopelink.

use thiserror::Error;

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error while connecting to or reading from the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be written to the stream.
    #[error("Write failed: {0}")]
    Write(std::io::Error),

    /// Malformed header or other protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Declared image size is larger than the configured maximum.
    #[error("Image size {declared} exceeds maximum {max}")]
    ImageTooLarge { declared: usize, max: usize },

    /// Image size token is not a valid byte count.
    #[error("Invalid image size: {0:?}")]
    InvalidImageSize(String),

    /// `send` called while no connection is active.
    #[error("Not connected")]
    NotConnected,

    /// Connection closed while a write was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection attempt did not complete within the configured timeout.
    #[error("Connection attempt timed out")]
    ConnectTimeout,

    /// JSON configuration or stats serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer sent a verb outside the known vocabulary.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Known verb with wrong arity or unparsable argument.
    #[error("Malformed command: {0}")]
    MalformedCommand(String),
}

impl LinkError {
    /// Whether this error is a recoverable protocol error (the connection stays up).
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            LinkError::Protocol(_) | LinkError::ImageTooLarge { .. } | LinkError::InvalidImageSize(_)
        )
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
