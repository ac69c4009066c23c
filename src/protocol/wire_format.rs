//! Wire format encoding and decoding.
//!
//! Every SLCP message is a single frame:
//! ```text
//! ┌───────────┬──────┬─────────┬──────────────┬──────┐
//! │ Magic     │ LEN  │ COMMAND │ PARAMS       │ CRC8 │
//! │ 0xAA 0x55 │ 1B   │ 1B      │ LEN - 1 B    │ 1B   │
//! └───────────┴──────┴─────────┴──────────────┴──────┘
//! ```
//!
//! `LEN` counts the command byte plus parameters. The checksum is
//! CRC-8/SMBUS (poly 0x07, init 0x00) over `COMMAND ‖ PARAMS` only.

use bytes::{BufMut, Bytes, BytesMut};

use super::Frame;
use crate::error::{L8Error, Result};

/// Frame synchronization bytes.
pub const MAGIC: [u8; 2] = [0xAA, 0x55];

/// Magic + length byte.
pub const HEADER_SIZE: usize = 3;

/// Trailing checksum byte.
pub const CHECKSUM_SIZE: usize = 1;

/// Bytes of framing around the payload (magic, length, checksum).
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Largest parameter block that still fits the 1-byte length field.
pub const MAX_PARAMETERS_LEN: usize = u8::MAX as usize - 1;

/// Largest possible frame on the wire.
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + 1 + MAX_PARAMETERS_LEN;

const CRC8_POLY: u8 = 0x07;

fn crc8_update(mut crc: u8, bytes: &[u8]) -> u8 {
    for &b in bytes {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Compute the frame checksum over a command byte and its parameters.
pub fn checksum(command: u8, parameters: &[u8]) -> u8 {
    crc8_update(crc8_update(0x00, &[command]), parameters)
}

/// Encode a command and its parameters into a complete frame.
///
/// # Example
///
/// ```
/// use l8_smartlight::protocol::{encode_frame, MAGIC};
///
/// let bytes = encode_frame(0x01, &[]).unwrap();
/// assert_eq!(&bytes[..2], &MAGIC);
/// assert_eq!(bytes[2], 1); // length: command byte only
/// ```
pub fn encode_frame(command: u8, parameters: &[u8]) -> Result<Bytes> {
    if parameters.len() > MAX_PARAMETERS_LEN {
        return Err(L8Error::Encoding(format!(
            "{} parameter bytes exceed maximum {}",
            parameters.len(),
            MAX_PARAMETERS_LEN
        )));
    }

    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + 1 + parameters.len());
    buf.put_slice(&MAGIC);
    buf.put_u8((1 + parameters.len()) as u8);
    buf.put_u8(command);
    buf.put_slice(parameters);
    buf.put_u8(checksum(command, parameters));
    Ok(buf.freeze())
}

/// Outcome of a single decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied.
    Frame { frame: Frame, consumed: usize },
    /// Not enough bytes yet. Not an error.
    Incomplete,
}

/// Try to decode one frame from the start of `buf`.
///
/// Magic bytes are validated as soon as they are available, so a corrupt
/// stream is reported without waiting for a full frame.
pub fn try_decode_one(buf: &[u8]) -> Result<Decoded> {
    for (i, (&got, &want)) in buf.iter().zip(MAGIC.iter()).enumerate() {
        if got != want {
            return Err(L8Error::Protocol(format!(
                "bad magic byte {} at offset {}: expected {:#04x}",
                got, i, want
            )));
        }
    }

    if buf.len() < HEADER_SIZE {
        return Ok(Decoded::Incomplete);
    }

    let length = buf[2] as usize;
    if length == 0 {
        return Err(L8Error::Protocol("zero-length payload".to_string()));
    }

    let total = HEADER_SIZE + length + CHECKSUM_SIZE;
    if buf.len() < total {
        return Ok(Decoded::Incomplete);
    }

    let payload = &buf[HEADER_SIZE..HEADER_SIZE + length];
    let actual = buf[HEADER_SIZE + length];
    let expected = checksum(payload[0], &payload[1..]);
    if actual != expected {
        return Err(L8Error::Checksum { expected, actual });
    }

    Ok(Decoded::Frame {
        frame: Frame::from_parts(payload[0], &payload[1..]),
        consumed: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_crc8_check_value() {
        // CRC-8/SMBUS catalogue check value over "123456789"
        assert_eq!(checksum(b'1', b"23456789"), 0xF4);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode_frame(0x6A, &[0x01]).unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[..], &[0xAA, 0x55, 0x02, 0x6A, 0x01, checksum(0x6A, &[0x01])]);
    }

    #[test]
    fn test_encode_max_parameters() {
        let params = vec![0u8; MAX_PARAMETERS_LEN];
        let bytes = encode_frame(0x44, &params).unwrap();
        assert_eq!(bytes.len(), MAX_FRAME_SIZE);
        assert_eq!(bytes[2], 0xFF);
    }

    #[test]
    fn test_encode_too_large() {
        let params = vec![0u8; MAX_PARAMETERS_LEN + 1];
        let result = encode_frame(0x44, &params);
        assert!(matches!(result, Err(L8Error::Encoding(_))));
    }

    #[test]
    fn test_decode_incomplete() {
        let bytes = encode_frame(0x43, &[1, 2, 3]).unwrap();
        for cut in 0..bytes.len() {
            assert_eq!(try_decode_one(&bytes[..cut]).unwrap(), Decoded::Incomplete);
        }
    }

    #[test]
    fn test_decode_reports_consumed() {
        let mut bytes = encode_frame(0x43, &[1, 2, 3]).unwrap().to_vec();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&[0xAA, 0x55]);

        match try_decode_one(&bytes).unwrap() {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(consumed, frame_len);
                assert_eq!(frame.command(), 0x43);
                assert_eq!(frame.parameters(), &[1, 2, 3]);
            }
            Decoded::Incomplete => panic!("expected a frame"),
        }
    }

    #[test]
    fn test_decode_bad_magic_early() {
        assert!(matches!(try_decode_one(&[0x00]), Err(L8Error::Protocol(_))));
        assert!(matches!(try_decode_one(&[0xAA, 0x00]), Err(L8Error::Protocol(_))));
    }

    #[test]
    fn test_decode_zero_length() {
        let result = try_decode_one(&[0xAA, 0x55, 0x00, 0x00]);
        assert!(matches!(result, Err(L8Error::Protocol(_))));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        let mut bytes = encode_frame(0x4C, &[]).unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(try_decode_one(&bytes), Err(L8Error::Checksum { .. })));
    }

    proptest! {
        #[test]
        fn prop_round_trip(command: u8, params in proptest::collection::vec(any::<u8>(), 0..=250)) {
            let bytes = encode_frame(command, &params).unwrap();
            match try_decode_one(&bytes).unwrap() {
                Decoded::Frame { frame, consumed } => {
                    prop_assert_eq!(consumed, bytes.len());
                    prop_assert_eq!(frame.command(), command);
                    prop_assert_eq!(frame.parameters(), &params[..]);
                }
                Decoded::Incomplete => prop_assert!(false, "complete frame reported incomplete"),
            }
        }

        #[test]
        fn prop_single_bit_flip_detected(
            command: u8,
            params in proptest::collection::vec(any::<u8>(), 0..=32),
            bit in 0usize..8,
            pick: proptest::sample::Index,
        ) {
            let mut bytes = encode_frame(command, &params).unwrap().to_vec();
            // Skip the length byte: flipping it changes framing, not content.
            let candidates: Vec<usize> = (0..bytes.len()).filter(|&i| i != 2).collect();
            let idx = candidates[pick.index(candidates.len())];
            bytes[idx] ^= 1 << bit;

            // CRC-8 catches every single-bit error in the payload and checksum.
            let detected = matches!(
                try_decode_one(&bytes),
                Err(L8Error::Checksum { .. }) | Err(L8Error::Protocol(_))
            );
            prop_assert!(detected);
        }
    }
}
