//! Codec module - parameter encodings for SLCP commands.
//!
//! - [`color`] - colors, LED / matrix / super-LED / text packings
//! - [`sensor`] - accelerometer responses and orientation codes
//! - [`animation`] - stored-animation step tables
//!
//! All encoders validate their input and fail with `L8Error::Validation`
//! before any bytes reach the transport.
//!
//! # Example
//!
//! ```
//! use l8_smartlight::codec::{encode_matrix, Color, MATRIX_LEN};
//!
//! let red = Color::new(15, 0, 0).unwrap();
//! let params = encode_matrix(&[red; MATRIX_LEN]).unwrap();
//! assert_eq!(params.len(), 128);
//! assert_eq!(&params[..2], &[0x00, 0x0F]);
//! ```

pub mod animation;
pub mod color;
pub mod sensor;

pub use animation::{duration_ticks, encode_animation, TIMER_RESOLUTION_MS};
pub use color::{
    check_coordinates, encode_led, encode_matrix, encode_scrolling_text, encode_super_led, Color,
    ScrollSpeed, MATRIX_LEN, MATRIX_SIDE, MAX_CHANNEL,
};
pub use sensor::{decode_acceleration, Acceleration, Lying, Orientation, ReportedOrientation};
