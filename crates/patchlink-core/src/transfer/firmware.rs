//! Firmware uploads to the device's volatile memory.
//!
//! The image is framed with a [`FirmwareHeader`] carrying its length and
//! CRC32, so the stream written to memory is `16 + image length` bytes.

use super::{Chunk, TransferPlan};
use crate::command::CommandError;
use crate::protocol::constants::SDRAM_BASE_ADDRESS;
use crate::protocol::{FirmwareHeader, crc32};
use crate::transport::DeviceRequest;

pub struct FirmwareUpload {
    address: u32,
    crc: u32,
    framed: Vec<u8>,
}

impl FirmwareUpload {
    pub fn new(image: &[u8]) -> Self {
        let crc = crc32(image);
        let header = FirmwareHeader::new(image.len() as u32, crc);
        let mut framed = header.to_bytes();
        framed.extend_from_slice(image);
        Self {
            address: SDRAM_BASE_ADDRESS,
            crc,
            framed,
        }
    }

    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    /// CRC32 of the image, excluding the header.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Header followed by the image.
    pub fn framed(&self) -> &[u8] {
        &self.framed
    }

    fn framed_len(&self) -> u32 {
        self.framed.len() as u32
    }
}

impl TransferPlan for FirmwareUpload {
    fn label(&self) -> String {
        "Uploading firmware".to_string()
    }

    fn total_len(&self) -> u64 {
        self.framed.len() as u64
    }

    fn open_request(&self) -> DeviceRequest {
        DeviceRequest::StartMemWrite {
            address: self.address,
            length: self.framed_len(),
        }
    }

    fn append_request(&mut self, chunk: Chunk) -> Result<DeviceRequest, CommandError> {
        let start = chunk.offset as usize;
        let data = self.framed[start..start + chunk.len].to_vec();
        Ok(DeviceRequest::AppendMemWrite {
            address: self.address + chunk.offset as u32,
            data,
        })
    }

    fn close_request(&self) -> DeviceRequest {
        DeviceRequest::CloseMemWrite {
            address: self.address,
            length: self.framed_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::ChunkPlan;

    #[test]
    fn test_framing() {
        let upload = FirmwareUpload::new(b"123456789");
        assert_eq!(upload.crc(), 0xCBF4_3926);
        assert_eq!(upload.framed().len(), 25);
        assert_eq!(&upload.framed()[16..], b"123456789");
        let header = FirmwareHeader::from_bytes(upload.framed()).unwrap();
        assert_eq!(header, FirmwareHeader::new(9, 0xCBF4_3926));
    }

    #[test]
    fn test_append_addresses_advance() {
        let mut upload = FirmwareUpload::new(&[0u8; 100]).with_address(0x2000_0000);
        let addresses: Vec<u32> = ChunkPlan::new(upload.total_len(), 48)
            .iter()
            .map(|chunk| match upload.append_request(chunk).unwrap() {
                DeviceRequest::AppendMemWrite { address, .. } => address,
                other => panic!("unexpected request {other:?}"),
            })
            .collect();
        assert_eq!(addresses, vec![0x2000_0000, 0x2000_0030, 0x2000_0060]);
    }
}
