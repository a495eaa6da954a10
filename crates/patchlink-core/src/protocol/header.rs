//! Firmware image header.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::{FIRMWARE_HEADER_SIZE, FIRMWARE_MAGIC};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 8], actual: [u8; 8] },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Firmware Header (16 bytes / 0x10)
///
/// Prefixed to the first chunk of a firmware upload so the device can
/// validate the image once the transfer is closed.
/// `[0..8]` magic tag, `[8..12]` image length (LE), `[12..16]` CRC32 (LE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareHeader {
    pub length: u32,
    pub crc: u32,
}

impl FirmwareHeader {
    pub const SIZE: usize = FIRMWARE_HEADER_SIZE;

    pub fn new(length: u32, crc: u32) -> Self {
        Self { length, crc }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&FIRMWARE_MAGIC);
        // Writes into a Vec cannot fail.
        let _ = buf.write_u32::<LittleEndian>(self.length);
        let _ = buf.write_u32::<LittleEndian>(self.crc);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[..8]);
        if magic != FIRMWARE_MAGIC {
            return Err(HeaderError::InvalidMagic {
                expected: FIRMWARE_MAGIC,
                actual: magic,
            });
        }
        let mut cursor = Cursor::new(&data[8..]);
        Ok(Self {
            length: cursor.read_u32::<LittleEndian>()?,
            crc: cursor.read_u32::<LittleEndian>()?,
        })
    }
}
