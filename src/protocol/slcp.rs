//! SLCP command codes.
//!
//! Firmware-defined command bytes. Every frame carries exactly one of these
//! as its first payload byte. Responses that echo a command (OK / ERR) carry
//! the originating command byte as their single parameter.

/// Generic success acknowledgement. Parameter: the acknowledged command.
pub const OK: u8 = 0x00;
/// Generic failure. Parameter: the rejected command.
pub const ERR: u8 = 0xFF;

pub const PING: u8 = 0x01;
pub const PONG: u8 = 0x02;

pub const L8_LED_SET: u8 = 0x43;
pub const L8_MATRIX_SET: u8 = 0x44;
pub const L8_MATRIX_OFF: u8 = 0x45;
pub const L8_SUPERLED_SET: u8 = 0x4B;
pub const L8_ACC_QUERY: u8 = 0x4C;
pub const L8_ACC_RESPONSE: u8 = 0x4D;

pub const L8_DELETE_USER_MEMORY: u8 = 0x61;
pub const L8_SET_AUTOROTATE: u8 = 0x6A;
pub const L8_STORE_FRAME: u8 = 0x6F;
pub const L8_STORE_FRAME_RESPONSE: u8 = 0x70;
pub const L8_STORE_ANIM: u8 = 0x75;
pub const L8_STORE_ANIM_RESPONSE: u8 = 0x76;
pub const L8_PLAY_ANIM: u8 = 0x79;

pub const L8_SET_ORIENTATION: u8 = 0x80;
pub const L8_APP_STOP: u8 = 0x82;
pub const L8_SET_TEXT: u8 = 0x83;

/// Human-readable name for a command byte, for logs.
pub fn name(command: u8) -> &'static str {
    match command {
        OK => "OK",
        ERR => "ERR",
        PING => "PING",
        PONG => "PONG",
        L8_LED_SET => "L8_LED_SET",
        L8_MATRIX_SET => "L8_MATRIX_SET",
        L8_MATRIX_OFF => "L8_MATRIX_OFF",
        L8_SUPERLED_SET => "L8_SUPERLED_SET",
        L8_ACC_QUERY => "L8_ACC_QUERY",
        L8_ACC_RESPONSE => "L8_ACC_RESPONSE",
        L8_DELETE_USER_MEMORY => "L8_DELETE_USER_MEMORY",
        L8_SET_AUTOROTATE => "L8_SET_AUTOROTATE",
        L8_STORE_FRAME => "L8_STORE_FRAME",
        L8_STORE_FRAME_RESPONSE => "L8_STORE_FRAME_RESPONSE",
        L8_STORE_ANIM => "L8_STORE_ANIM",
        L8_STORE_ANIM_RESPONSE => "L8_STORE_ANIM_RESPONSE",
        L8_PLAY_ANIM => "L8_PLAY_ANIM",
        L8_SET_ORIENTATION => "L8_SET_ORIENTATION",
        L8_APP_STOP => "L8_APP_STOP",
        L8_SET_TEXT => "L8_SET_TEXT",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(name(L8_SET_AUTOROTATE), "L8_SET_AUTOROTATE");
        assert_eq!(name(0x33), "UNKNOWN");
    }
}
