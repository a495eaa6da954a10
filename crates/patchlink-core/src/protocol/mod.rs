//! Protocol module - tokens, status codes, acknowledgment frames, framing.

pub mod ack;
pub mod constants;
pub mod crc;
pub mod header;
pub mod status;

pub use ack::AckEvent;
pub use constants::*;
pub use crc::{Crc32, crc32};
pub use header::{FirmwareHeader, HeaderError};
pub use status::StatusCode;
