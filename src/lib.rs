//! # l8-smartlight
//!
//! Host-side driver for the L8 Smartlight, an 8x8 RGB LED matrix with a
//! status LED and an accelerometer, speaking the SLCP binary protocol over a
//! serial link.
//!
//! ## Architecture
//!
//! - **Protocol**: `AA 55 LEN CMD PARAMS CRC8` frames, reassembled from
//!   arbitrary read chunks by a [`FrameBuffer`]
//! - **Correlation**: replies are matched to requests by shape (command and
//!   parameter prefix), not by send order
//! - **Session**: a [`DeviceSession`] owns one connection, a writer task and
//!   a read loop, and exposes the command API
//! - **Grid**: a [`Grid`] addresses several devices as one surface
//!
//! ## Example
//!
//! ```ignore
//! use l8_smartlight::{Color, DeviceSession, MATRIX_LEN};
//! use l8_smartlight::transport::SerialConnector;
//!
//! #[tokio::main]
//! async fn main() -> l8_smartlight::Result<()> {
//!     let session = DeviceSession::builder()
//!         .connector(SerialConnector::new())
//!         .build()?;
//!     session.open("/dev/ttyACM0").await?;
//!
//!     let red = Color::new(15, 0, 0)?;
//!     session.set_matrix(&[red; MATRIX_LEN]).await?;
//!     session.close().await
//! }
//! ```

pub mod codec;
pub mod correlator;
pub mod error;
pub mod grid;
pub mod protocol;
pub mod transport;
pub mod writer;

mod poller;
mod session;

pub use codec::{
    Acceleration, Color, Lying, Orientation, ReportedOrientation, ScrollSpeed, MATRIX_LEN,
    MATRIX_SIDE,
};
pub use correlator::{ErrorMatcher, Expectation};
pub use error::{L8Error, Result};
pub use grid::{Grid, GridBuilder, GridSegment};
pub use poller::AccelerationStream;
pub use protocol::{Frame, FrameBuffer};
pub use session::{
    ConnectionState, DeviceSession, SessionBuilder, SessionConfig, SessionEvent,
    AUTOROTATE_ACK_PARAMETER, DEFAULT_BAUD_RATE,
};
