//! Protocol constants: acknowledgment tokens, sizes, timing.

// Acknowledgment frame
pub const ACK_PREFIX: [u8; 4] = *b"AxoR";
pub const ACK_FRAME_LEN: usize = ACK_PREFIX.len() + 2;

// One-shot command tokens
pub const TOKEN_PING: u8 = b'p';
pub const TOKEN_CONTROLS: u8 = b'T';
pub const TOKEN_START_PATCH: u8 = b's';
pub const TOKEN_STOP_PATCH: u8 = b'S';
pub const TOKEN_DELETE: u8 = b'D';
pub const TOKEN_CREATE_DIR: u8 = b'k';
pub const TOKEN_CHANGE_DIR: u8 = b'h';
pub const TOKEN_FILE_LIST: u8 = b'l';
pub const TOKEN_FILE_INFO: u8 = b'I';

// File upload (SD card)
pub const TOKEN_FILE_UPLOAD: u8 = b'f';
pub const TOKEN_FILE_OPEN: u8 = b'C';
pub const TOKEN_FILE_APPEND: u8 = b'A';
pub const TOKEN_FILE_CLOSE: u8 = b'c';

// Firmware upload (volatile memory)
pub const TOKEN_MEM_WRITE: u8 = b'W';
pub const TOKEN_MEM_OPEN: u8 = b'W';
pub const TOKEN_MEM_APPEND: u8 = b'w';
pub const TOKEN_MEM_CLOSE: u8 = b'e';

// Firmware framing
pub const FIRMWARE_MAGIC: [u8; 8] = *b"flascopy";
pub const FIRMWARE_HEADER_SIZE: usize = 16;
pub const SDRAM_BASE_ADDRESS: u32 = 0xC000_0000;

// Sizes
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;
pub const COMMAND_QUEUE_CAPACITY: usize = 20;
pub const RESPONSE_QUEUE_CAPACITY: usize = 20;

// Timing (milliseconds)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5000;
pub const OPEN_TIMEOUT_MS: u64 = 3000;
pub const USER_OFFER_TIMEOUT_MS: u64 = 100;
pub const PERIODIC_OFFER_TIMEOUT_MS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const LONG_OPERATION_COOLDOWN_MS: u64 = 2000;
