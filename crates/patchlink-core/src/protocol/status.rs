//! Device status codes.
//!
//! The device reports a single status byte per acknowledgment, following
//! FAT filesystem result semantics. A handful of values at the top of the
//! byte range are reserved by this layer and never sent by the device.

use std::fmt;

/// Byte-sized result code attached to an acknowledgment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u8);

impl StatusCode {
    pub const OK: Self = Self(0);
    pub const DISK_ERR: Self = Self(1);
    pub const INT_ERR: Self = Self(2);
    pub const NOT_READY: Self = Self(3);
    pub const NO_FILE: Self = Self(4);
    pub const NO_PATH: Self = Self(5);
    pub const INVALID_NAME: Self = Self(6);
    pub const DENIED: Self = Self(7);
    pub const EXIST: Self = Self(8);
    pub const INVALID_OBJECT: Self = Self(9);
    pub const WRITE_PROTECTED: Self = Self(10);
    pub const INVALID_DRIVE: Self = Self(11);
    pub const NOT_ENABLED: Self = Self(12);
    pub const NO_FILESYSTEM: Self = Self(13);
    pub const MKFS_ABORTED: Self = Self(14);
    pub const TIMEOUT: Self = Self(15);
    pub const LOCKED: Self = Self(16);
    pub const NOT_ENOUGH_CORE: Self = Self(17);
    pub const TOO_MANY_OPEN_FILES: Self = Self(18);
    pub const INVALID_PARAMETER: Self = Self(19);

    /// No acknowledgment arrived within the phase's timeout.
    pub const NO_ACK: Self = Self(0xFC);
    /// Transport refused the transmit call.
    pub const WRITE_FAILED: Self = Self(0xFD);
    /// The waiting context was cancelled.
    pub const INTERRUPTED: Self = Self(0xFE);
    /// No status has been reported yet.
    pub const UNSET: Self = Self(0xFF);

    pub const fn from_u8(v: u8) -> Self {
        Self(v)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }

    /// Human-readable description.
    pub fn describe(&self) -> &'static str {
        match self.0 {
            0 => "ok",
            1 => "disk error",
            2 => "internal error",
            3 => "device not ready",
            4 => "no such file",
            5 => "no such path",
            6 => "invalid name",
            7 => "access denied",
            8 => "already exists",
            9 => "invalid object",
            10 => "write protected",
            11 => "invalid drive",
            12 => "volume not mounted",
            13 => "no filesystem",
            14 => "mkfs aborted",
            15 => "timeout",
            16 => "locked",
            17 => "not enough memory",
            18 => "too many open files",
            19 => "invalid parameter",
            0xFC => "no acknowledgment",
            0xFD => "write failed",
            0xFE => "interrupted",
            0xFF => "no status",
            _ => "unknown status",
        }
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::UNSET
    }
}

impl From<u8> for StatusCode {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode(0x{:02X} '{}')", self.0, self.describe())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.describe(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unset() {
        let status = StatusCode::default();
        assert!(status.is_unset());
        assert!(!status.is_ok());
        assert_eq!(status.value(), 0xFF);
    }

    #[test]
    fn test_describe() {
        assert_eq!(StatusCode::OK.describe(), "ok");
        assert_eq!(StatusCode::EXIST.describe(), "already exists");
        assert_eq!(StatusCode::from_u8(0x42).describe(), "unknown status");
        assert_eq!(format!("{}", StatusCode::NO_FILE), "no such file (0x04)");
    }

    #[test]
    fn test_layer_codes_distinct_from_device_codes() {
        assert_ne!(StatusCode::NO_ACK, StatusCode::TIMEOUT);
        assert_eq!(StatusCode::TIMEOUT.value(), 0x0F);
        assert_eq!(StatusCode::NO_ACK.describe(), "no acknowledgment");
    }
}
