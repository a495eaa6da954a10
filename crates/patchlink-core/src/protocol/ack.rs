//! Acknowledgment frames.
//!
//! An acknowledgment is the token byte of the request it answers followed by
//! a status byte. On the wire it is prefixed with `AxoR`.

use std::fmt;

use super::constants::{ACK_FRAME_LEN, ACK_PREFIX};
use super::status::StatusCode;

/// Decoded acknowledgment event from the device.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    pub token: u8,
    pub status: StatusCode,
}

impl AckEvent {
    pub const fn new(token: u8, status: StatusCode) -> Self {
        Self { token, status }
    }

    /// Decode an acknowledgment frame. Returns `None` if the bytes are not one.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ACK_FRAME_LEN || bytes[..ACK_PREFIX.len()] != ACK_PREFIX {
            return None;
        }
        Some(Self {
            token: bytes[ACK_PREFIX.len()],
            status: StatusCode::from_u8(bytes[ACK_PREFIX.len() + 1]),
        })
    }

    pub fn to_bytes(&self) -> [u8; ACK_FRAME_LEN] {
        let mut frame = [0u8; ACK_FRAME_LEN];
        frame[..ACK_PREFIX.len()].copy_from_slice(&ACK_PREFIX);
        frame[ACK_PREFIX.len()] = self.token;
        frame[ACK_PREFIX.len() + 1] = self.status.value();
        frame
    }

    /// Printable form of the token.
    pub fn token_char(&self) -> char {
        token_char(self.token)
    }
}

pub(crate) fn token_char(token: u8) -> char {
    if token.is_ascii_graphic() {
        token as char
    } else {
        '.'
    }
}

impl fmt::Debug for AckEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AckEvent('{}' {:?})", self.token_char(), self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    #[test]
    fn test_decode_frame() {
        let ack = AckEvent::from_bytes(b"AxoRC\x00").unwrap();
        assert_eq!(ack.token, TOKEN_FILE_OPEN);
        assert!(ack.status.is_ok());
    }

    #[test]
    fn test_encode_frame() {
        let ack = AckEvent::new(TOKEN_DELETE, StatusCode::NO_FILE);
        assert_eq!(&ack.to_bytes(), b"AxoRD\x04");
    }

    #[test]
    fn test_reject_foreign_bytes() {
        assert!(AckEvent::from_bytes(b"AxoQ\x00\x00").is_none());
        assert!(AckEvent::from_bytes(b"Axo").is_none());
        assert!(AckEvent::from_bytes(b"").is_none());
    }
}
