//! Error types for the L8 driver.

use thiserror::Error;

/// Main error type for all L8 operations.
#[derive(Debug, Error)]
pub enum L8Error {
    /// Input rejected before any bytes were sent (coordinates, colors, lengths).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Command could not be encoded into a single frame.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Malformed frame on the wire. The stream is desynchronized.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame checksum mismatch. The stream is desynchronized.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    /// The device answered a command with an error frame.
    #[error("Device rejected command {command:#04x}")]
    Device { command: u8 },

    /// Command issued while the session is not connected.
    #[error("Not connected")]
    NotConnected,

    /// `open` called on a session that is connecting or connected.
    #[error("Already connected")]
    AlreadyConnected,

    /// Connection closed while a command was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error from the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl L8Error {
    /// Whether the connection must be closed and reopened after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            L8Error::Protocol(_) | L8Error::Checksum { .. } | L8Error::ConnectionClosed | L8Error::Io(_)
        )
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        L8Error::Validation(msg.into())
    }
}

/// Result type alias using L8Error.
pub type Result<T> = std::result::Result<T, L8Error>;
