//! Colors and the pixel packings used by the display commands.
//!
//! The device has 4 bits per channel. Packings differ per command:
//!
//! | command          | layout                                  |
//! |------------------|-----------------------------------------|
//! | `L8_LED_SET`     | `x, y, B, G, R`                         |
//! | `L8_MATRIX_SET`  | per pixel `B`, `(G << 4) \| R`, row-major |
//! | `L8_SUPERLED_SET`| `B, G, R`                               |
//! | `L8_SET_TEXT`    | `loop, speed, R, G, B, ascii...`        |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{L8Error, Result};
use crate::protocol::MAX_PARAMETERS_LEN;

/// Highest value of a single color channel.
pub const MAX_CHANNEL: u8 = 15;

/// Width and height of one device matrix.
pub const MATRIX_SIDE: usize = 8;

/// Pixels in one device matrix.
pub const MATRIX_LEN: usize = MATRIX_SIDE * MATRIX_SIDE;

/// A 12-bit color, each channel in `0..=15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// All channels off.
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    /// Create a validated color.
    pub fn new(r: u8, g: u8, b: u8) -> Result<Self> {
        let color = Self { r, g, b };
        color.validate()?;
        Ok(color)
    }

    /// Check every channel is within `0..=15`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("r", self.r), ("g", self.g), ("b", self.b)] {
            if value > MAX_CHANNEL {
                return Err(L8Error::validation(format!(
                    "color channel {} = {} outside 0..={}",
                    name, value, MAX_CHANNEL
                )));
            }
        }
        Ok(())
    }

    /// `B, G, R` triple.
    fn bgr(&self) -> [u8; 3] {
        [self.b, self.g, self.r]
    }

    /// Two-byte matrix packing: `B`, `(G << 4) | R`.
    fn packed(&self) -> [u8; 2] {
        [self.b, (self.g << 4) | self.r]
    }
}

/// Check a coordinate pair addresses a pixel of one device.
pub fn check_coordinates(x: usize, y: usize) -> Result<()> {
    if x >= MATRIX_SIDE || y >= MATRIX_SIDE {
        return Err(L8Error::validation(format!(
            "coordinates ({}, {}) outside 0..{}",
            x, y, MATRIX_SIDE
        )));
    }
    Ok(())
}

/// Parameters for `L8_LED_SET`.
pub fn encode_led(x: usize, y: usize, color: &Color) -> Result<Vec<u8>> {
    check_coordinates(x, y)?;
    color.validate()?;

    let mut params = Vec::with_capacity(5);
    params.push(x as u8);
    params.push(y as u8);
    params.extend_from_slice(&color.bgr());
    Ok(params)
}

/// Parameters for `L8_MATRIX_SET` and `L8_STORE_FRAME`.
///
/// `colors` is row-major from the top-left pixel and must hold exactly
/// [`MATRIX_LEN`] entries.
pub fn encode_matrix(colors: &[Color]) -> Result<Vec<u8>> {
    if colors.len() != MATRIX_LEN {
        return Err(L8Error::validation(format!(
            "matrix has {} pixels, expected {}",
            colors.len(),
            MATRIX_LEN
        )));
    }

    let mut params = Vec::with_capacity(MATRIX_LEN * 2);
    for color in colors {
        color.validate()?;
        params.extend_from_slice(&color.packed());
    }
    Ok(params)
}

/// Parameters for `L8_SUPERLED_SET`.
pub fn encode_super_led(color: &Color) -> Result<Vec<u8>> {
    color.validate()?;
    Ok(color.bgr().to_vec())
}

/// Scrolling text speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollSpeed {
    Slow,
    Medium,
    Fast,
}

impl ScrollSpeed {
    /// Firmware speed code.
    pub fn code(self) -> u8 {
        match self {
            ScrollSpeed::Fast => 0,
            ScrollSpeed::Medium => 2,
            ScrollSpeed::Slow => 3,
        }
    }
}

impl FromStr for ScrollSpeed {
    type Err = L8Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "slow" => Ok(ScrollSpeed::Slow),
            "medium" => Ok(ScrollSpeed::Medium),
            "fast" => Ok(ScrollSpeed::Fast),
            other => Err(L8Error::validation(format!("invalid speed {:?}", other))),
        }
    }
}

impl fmt::Display for ScrollSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrollSpeed::Slow => "slow",
            ScrollSpeed::Medium => "medium",
            ScrollSpeed::Fast => "fast",
        };
        f.write_str(s)
    }
}

/// Parameters for `L8_SET_TEXT`.
pub fn encode_scrolling_text(
    text: &str,
    color: &Color,
    speed: ScrollSpeed,
    looped: bool,
) -> Result<Vec<u8>> {
    color.validate()?;
    if !text.is_ascii() {
        return Err(L8Error::validation("scrolling text must be ASCII"));
    }

    let mut params = Vec::with_capacity(5 + text.len());
    params.push(looped as u8);
    params.push(speed.code());
    params.extend_from_slice(&[color.r, color.g, color.b]);
    params.extend_from_slice(text.as_bytes());

    if params.len() > MAX_PARAMETERS_LEN {
        return Err(L8Error::validation(format!(
            "text of {} characters does not fit in one frame",
            text.len()
        )));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_validation() {
        assert!(Color::new(15, 15, 15).is_ok());
        assert!(matches!(Color::new(16, 0, 0), Err(L8Error::Validation(_))));
        assert!(matches!(Color::new(0, 0, 200), Err(L8Error::Validation(_))));
    }

    #[test]
    fn test_encode_led() {
        let color = Color::new(1, 2, 3).unwrap();
        assert_eq!(encode_led(7, 0, &color).unwrap(), vec![7, 0, 3, 2, 1]);
        assert!(encode_led(8, 0, &color).is_err());
        assert!(encode_led(0, 8, &color).is_err());
        assert!(encode_led(0, 0, &Color { r: 16, g: 0, b: 0 }).is_err());
    }

    #[test]
    fn test_encode_matrix_red() {
        let red = Color::new(15, 0, 0).unwrap();
        let params = encode_matrix(&[red; MATRIX_LEN]).unwrap();

        assert_eq!(params.len(), 128);
        for (i, byte) in params.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(*byte, 0x00);
            } else {
                assert_eq!(*byte, 0x0F);
            }
        }
    }

    #[test]
    fn test_encode_matrix_packing_order() {
        let mut colors = [Color::BLACK; MATRIX_LEN];
        colors[9] = Color::new(0x3, 0xA, 0x5).unwrap(); // x=1, y=1

        let params = encode_matrix(&colors).unwrap();
        assert_eq!(params[18], 0x5);
        assert_eq!(params[19], 0xA3);
    }

    #[test]
    fn test_encode_matrix_wrong_length() {
        assert!(matches!(encode_matrix(&[Color::BLACK; 63]), Err(L8Error::Validation(_))));
        assert!(matches!(encode_matrix(&[Color::BLACK; 65]), Err(L8Error::Validation(_))));
    }

    #[test]
    fn test_encode_super_led() {
        let color = Color::new(4, 5, 6).unwrap();
        assert_eq!(encode_super_led(&color).unwrap(), vec![6, 5, 4]);
    }

    #[test]
    fn test_scroll_speed_tokens() {
        assert_eq!("fast".parse::<ScrollSpeed>().unwrap().code(), 0);
        assert_eq!("medium".parse::<ScrollSpeed>().unwrap().code(), 2);
        assert_eq!("slow".parse::<ScrollSpeed>().unwrap().code(), 3);
        assert!(matches!("warp".parse::<ScrollSpeed>(), Err(L8Error::Validation(_))));
    }

    #[test]
    fn test_encode_scrolling_text() {
        let color = Color::new(15, 8, 1).unwrap();
        let params = encode_scrolling_text("Hi", &color, ScrollSpeed::Medium, true).unwrap();
        assert_eq!(params, vec![1, 2, 15, 8, 1, b'H', b'i']);
    }

    #[test]
    fn test_scrolling_text_limits() {
        assert!(encode_scrolling_text("héllo", &Color::BLACK, ScrollSpeed::Slow, false).is_err());

        let long = "x".repeat(MAX_PARAMETERS_LEN);
        assert!(encode_scrolling_text(&long, &Color::BLACK, ScrollSpeed::Slow, false).is_err());
    }
}
