//! Frame struct with typed accessors.
//!
//! A decoded frame is immutable. Parameters use `bytes::Bytes` so frames can
//! be fanned out to the correlator and to observers without copying.
//!
//! # Example
//!
//! ```
//! use l8_smartlight::protocol::{slcp, Frame};
//!
//! let ack = Frame::from_parts(slcp::OK, &[slcp::L8_LED_SET]);
//! assert!(ack.is_ok_for(slcp::L8_LED_SET));
//! assert_eq!(ack.payload_length(), 2);
//! ```

use bytes::Bytes;

use super::slcp;
use super::wire_format::{checksum, encode_frame};
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: u8,
    parameters: Bytes,
}

impl Frame {
    /// Create a new frame from a command and parameter bytes.
    pub fn new(command: u8, parameters: Bytes) -> Self {
        Self { command, parameters }
    }

    /// Create a frame from a command and a borrowed slice (copies data).
    pub fn from_parts(command: u8, parameters: &[u8]) -> Self {
        Self {
            command,
            parameters: Bytes::copy_from_slice(parameters),
        }
    }

    /// Get the command byte.
    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Get a reference to the parameter bytes.
    #[inline]
    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }

    /// Get a clone of the parameters as Bytes (cheap, zero-copy).
    #[inline]
    pub fn parameter_bytes(&self) -> Bytes {
        self.parameters.clone()
    }

    /// Value of the wire `LEN` field: command byte plus parameters.
    #[inline]
    pub fn payload_length(&self) -> usize {
        1 + self.parameters.len()
    }

    /// CRC-8 of the payload as it appears on the wire.
    #[inline]
    pub fn checksum(&self) -> u8 {
        checksum(self.command, &self.parameters)
    }

    /// Check if this is the generic OK acknowledging `command`.
    #[inline]
    pub fn is_ok_for(&self, command: u8) -> bool {
        self.command == slcp::OK && self.parameters.first() == Some(&command)
    }

    /// Check if this is the generic ERR rejecting `command`.
    #[inline]
    pub fn is_error_for(&self, command: u8) -> bool {
        self.command == slcp::ERR && self.parameters.first() == Some(&command)
    }

    /// Encode this frame for the wire.
    pub fn encode(&self) -> Result<Bytes> {
        encode_frame(self.command, &self.parameters)
    }
}
