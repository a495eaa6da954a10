//! Requests handed to the transport for transmission.

use std::time::SystemTime;

use crate::protocol::constants::*;

/// A single control-dial value pending transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlValue {
    pub index: u16,
    pub value: i32,
}

/// One transmit call. The transport owns the byte framing of each kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    Ping,
    ControlValues(Vec<ControlValue>),
    StartPatch,
    StopPatch,
    Delete { path: String },
    CreateDirectory { path: String, modified: SystemTime },
    ChangeDirectory { path: String },
    GetFileList,
    GetFileInfo { path: String },
    CreateFile { path: String, size: u64, modified: SystemTime },
    AppendFile { data: Vec<u8> },
    CloseFile { path: String, modified: SystemTime },
    StartMemWrite { address: u32, length: u32 },
    AppendMemWrite { address: u32, data: Vec<u8> },
    CloseMemWrite { address: u32, length: u32 },
}

impl DeviceRequest {
    /// Token the device tags its acknowledgment of this request with.
    pub fn ack_token(&self) -> u8 {
        match self {
            DeviceRequest::Ping => TOKEN_PING,
            DeviceRequest::ControlValues(_) => TOKEN_CONTROLS,
            DeviceRequest::StartPatch => TOKEN_START_PATCH,
            DeviceRequest::StopPatch => TOKEN_STOP_PATCH,
            DeviceRequest::Delete { .. } => TOKEN_DELETE,
            DeviceRequest::CreateDirectory { .. } => TOKEN_CREATE_DIR,
            DeviceRequest::ChangeDirectory { .. } => TOKEN_CHANGE_DIR,
            DeviceRequest::GetFileList => TOKEN_FILE_LIST,
            DeviceRequest::GetFileInfo { .. } => TOKEN_FILE_INFO,
            DeviceRequest::CreateFile { .. } => TOKEN_FILE_OPEN,
            DeviceRequest::AppendFile { .. } => TOKEN_FILE_APPEND,
            DeviceRequest::CloseFile { .. } => TOKEN_FILE_CLOSE,
            DeviceRequest::StartMemWrite { .. } => TOKEN_MEM_OPEN,
            DeviceRequest::AppendMemWrite { .. } => TOKEN_MEM_APPEND,
            DeviceRequest::CloseMemWrite { .. } => TOKEN_MEM_CLOSE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceRequest::Ping => "ping",
            DeviceRequest::ControlValues(_) => "control values",
            DeviceRequest::StartPatch => "start patch",
            DeviceRequest::StopPatch => "stop patch",
            DeviceRequest::Delete { .. } => "delete",
            DeviceRequest::CreateDirectory { .. } => "create directory",
            DeviceRequest::ChangeDirectory { .. } => "change directory",
            DeviceRequest::GetFileList => "get file list",
            DeviceRequest::GetFileInfo { .. } => "get file info",
            DeviceRequest::CreateFile { .. } => "create file",
            DeviceRequest::AppendFile { .. } => "append file",
            DeviceRequest::CloseFile { .. } => "close file",
            DeviceRequest::StartMemWrite { .. } => "start memory write",
            DeviceRequest::AppendMemWrite { .. } => "append memory write",
            DeviceRequest::CloseMemWrite { .. } => "close memory write",
        }
    }

    /// Data bytes carried by append requests.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            DeviceRequest::AppendFile { data } | DeviceRequest::AppendMemWrite { data, .. } => {
                Some(data)
            }
            _ => None,
        }
    }
}
