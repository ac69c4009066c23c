//! Accelerometer responses and orientation codes.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{L8Error, Result};

/// Length of an `L8_ACC_RESPONSE` parameter block.
pub const ACCELERATION_LEN: usize = 7;

/// Display orientation requested through `set_orientation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Up,
    Down,
    Left,
    Right,
    /// Let the device rotate from its accelerometer.
    Auto,
}

impl Orientation {
    /// Firmware orientation code. `None` for `Auto`, which has no code.
    pub fn code(self) -> Option<u8> {
        match self {
            Orientation::Up => Some(1),
            Orientation::Down => Some(2),
            Orientation::Left => Some(5),
            Orientation::Right => Some(6),
            Orientation::Auto => None,
        }
    }
}

impl FromStr for Orientation {
    type Err = L8Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Orientation::Up),
            "down" => Ok(Orientation::Down),
            "left" => Ok(Orientation::Left),
            "right" => Ok(Orientation::Right),
            "auto" => Ok(Orientation::Auto),
            other => Err(L8Error::validation(format!("invalid orientation {:?}", other))),
        }
    }
}

/// Which face of the device points up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lying {
    Up,
    UpsideDown,
}

/// Orientation reported by the accelerometer.
///
/// Codes outside the known table are passed through as `Raw`; the firmware
/// reports values the table does not cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedOrientation {
    Up,
    Down,
    Left,
    Right,
    Raw(u8),
}

impl From<u8> for ReportedOrientation {
    fn from(code: u8) -> Self {
        match code {
            1 => ReportedOrientation::Up,
            2 => ReportedOrientation::Down,
            5 => ReportedOrientation::Left,
            6 => ReportedOrientation::Right,
            other => ReportedOrientation::Raw(other),
        }
    }
}

impl fmt::Display for ReportedOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportedOrientation::Up => f.write_str("up"),
            ReportedOrientation::Down => f.write_str("down"),
            ReportedOrientation::Left => f.write_str("left"),
            ReportedOrientation::Right => f.write_str("right"),
            ReportedOrientation::Raw(code) => write!(f, "{}", code),
        }
    }
}

/// One accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Acceleration {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub lying: Lying,
    pub orientation: ReportedOrientation,
    /// `true` only when the tap byte is exactly 1.
    pub tap: bool,
    pub shake: bool,
}

/// Decode the parameters of an `L8_ACC_RESPONSE` frame.
pub fn decode_acceleration(params: &[u8]) -> Result<Acceleration> {
    if params.len() < ACCELERATION_LEN {
        return Err(L8Error::Protocol(format!(
            "acceleration response has {} bytes, expected {}",
            params.len(),
            ACCELERATION_LEN
        )));
    }

    Ok(Acceleration {
        x: params[0],
        y: params[1],
        z: params[2],
        lying: if params[3] == 2 { Lying::Up } else { Lying::UpsideDown },
        orientation: ReportedOrientation::from(params[4]),
        tap: params[5] == 1,
        shake: params[6] != 0,
    })
}
