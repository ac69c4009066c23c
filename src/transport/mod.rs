//! Transport module - the byte-duplex link to a device.
//!
//! The session only needs an async byte stream. A [`Connector`] opens one
//! from a port path and baud rate:
//! - [`SerialConnector`] (feature `serial`) - a real serial port
//! - anything else implementing [`Connector`], e.g. an in-memory
//!   `tokio::io::duplex` pair in tests or a simulator

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::SerialConnector;

/// A bidirectional async byte stream.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Boxed transport stream handed to a session.
pub type BoxedStream = Box<dyn DuplexStream>;

/// Opens transport streams.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open the device at `path`.
    ///
    /// Errors are returned to the caller of `DeviceSession::open` unchanged.
    async fn open(&self, path: &str, baud_rate: u32) -> Result<BoxedStream>;
}
