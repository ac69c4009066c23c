//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the SLCP binary protocol:
//! - Frame encoding/decoding with CRC-8 validation
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - The SLCP command table

mod frame;
mod frame_buffer;
pub mod slcp;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::{FrameBuffer, DEFAULT_RECEIVE_CAPACITY};
pub use wire_format::{
    checksum, encode_frame, try_decode_one, Decoded, CHECKSUM_SIZE, FRAME_OVERHEAD, HEADER_SIZE,
    MAGIC, MAX_FRAME_SIZE, MAX_PARAMETERS_LEN,
};
