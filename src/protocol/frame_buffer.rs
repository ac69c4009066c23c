//! Frame buffer for accumulating partial reads.
//!
//! Transport reads arrive in chunks that ignore frame boundaries. The buffer
//! appends each chunk, extracts every complete frame from the front, and keeps
//! the leftover bytes for the next push.
//!
//! A magic or checksum failure means the stream is desynchronized. The buffer
//! then refuses further input until [`FrameBuffer::clear`] is called, which the
//! session only does on reconnect.
//!
//! # Example
//!
//! ```
//! use l8_smartlight::protocol::{encode_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = encode_frame(0x02, &[]).unwrap();
//!
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames[0].command(), 0x02);
//! ```

use bytes::BytesMut;

use super::wire_format::{try_decode_one, Decoded};
use super::Frame;
use crate::error::{L8Error, Result};

/// Default receive capacity. At least one maximal transport read.
pub const DEFAULT_RECEIVE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
enum State {
    /// Buffer start is a frame boundary.
    Synchronized,
    /// A fatal decode error occurred; the reason is replayed on every push.
    Desynchronized { reason: String },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RECEIVE_CAPACITY)
    }

    /// Create a new frame buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::Synchronized,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the frames completed by this chunk in arrival order (may be
    /// empty). Incomplete trailing bytes stay buffered.
    ///
    /// # Errors
    ///
    /// `Protocol` or `Checksum` when the stream is corrupt. Both are fatal:
    /// every later push fails the same way until `clear()`.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        if let State::Desynchronized { reason } = &self.state {
            return Err(L8Error::Protocol(format!("stream desynchronized: {}", reason)));
        }

        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while !self.buffer.is_empty() {
            match try_decode_one(&self.buffer) {
                Ok(Decoded::Frame { frame, consumed }) => {
                    let _ = self.buffer.split_to(consumed);
                    frames.push(frame);
                }
                Ok(Decoded::Incomplete) => break,
                Err(e) => {
                    self.state = State::Desynchronized {
                        reason: e.to_string(),
                    };
                    return Err(e);
                }
            }
        }

        Ok(frames)
    }

    /// Get the number of buffered bytes not yet consumed into frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a fatal decode error has poisoned this buffer.
    pub fn is_desynchronized(&self) -> bool {
        matches!(self.state, State::Desynchronized { .. })
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Synchronized;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, slcp};
    use proptest::prelude::*;

    fn make_frame_bytes(command: u8, parameters: &[u8]) -> Vec<u8> {
        encode_frame(command, parameters).unwrap().to_vec()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(slcp::PONG, b"hi")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), slcp::PONG);
        assert_eq!(frames[0].parameters(), b"hi");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = make_frame_bytes(1, b"first");
        combined.extend(make_frame_bytes(2, b"second"));
        combined.extend(make_frame_bytes(3, b"third"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].command(), 1);
        assert_eq!(frames[1].command(), 2);
        assert_eq!(frames[2].command(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame1 = make_frame_bytes(1, b"first");
        let frame2 = make_frame_bytes(2, b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..5]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&frame2[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(slcp::L8_ACC_RESPONSE, &[10, 20, 30, 2, 1, 1, 1]);

        let mut all_frames = Vec::new();
        for byte in &frame_bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].parameters(), &[10, 20, 30, 2, 1, 1, 1]);
    }

    #[test]
    fn test_checksum_error_poisons_buffer() {
        let mut buffer = FrameBuffer::new();
        let mut bad = make_frame_bytes(1, b"x");
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        assert!(matches!(buffer.push(&bad), Err(L8Error::Checksum { .. })));
        assert!(buffer.is_desynchronized());

        // Even a valid frame is refused now.
        let result = buffer.push(&make_frame_bytes(2, b""));
        assert!(matches!(result, Err(L8Error::Protocol(_))));

        buffer.clear();
        assert!(!buffer.is_desynchronized());
        assert_eq!(buffer.push(&make_frame_bytes(2, b"")).unwrap().len(), 1);
    }

    #[test]
    fn test_garbage_is_fatal() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&[0x00, 0xFF, 0x12]);
        assert!(matches!(result, Err(L8Error::Protocol(_))));
    }

    proptest! {
        #[test]
        fn prop_chunk_boundary_invariance(
            frames in proptest::collection::vec(
                (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..40)),
                1..8,
            ),
            cuts in proptest::collection::vec(1usize..16, 1..64),
        ) {
            let mut stream = Vec::new();
            for (command, params) in &frames {
                stream.extend(make_frame_bytes(*command, params));
            }

            let mut buffer = FrameBuffer::new();
            let mut decoded = Vec::new();
            let mut offset = 0;
            let mut cut_iter = cuts.iter().cycle();
            while offset < stream.len() {
                let step = (*cut_iter.next().unwrap()).min(stream.len() - offset);
                decoded.extend(buffer.push(&stream[offset..offset + step]).unwrap());
                offset += step;
            }

            prop_assert!(buffer.is_empty());
            prop_assert_eq!(decoded.len(), frames.len());
            for (frame, (command, params)) in decoded.iter().zip(&frames) {
                prop_assert_eq!(frame.command(), *command);
                prop_assert_eq!(frame.parameters(), &params[..]);
            }
        }
    }
}
