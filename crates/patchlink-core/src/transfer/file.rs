//! SD-card file uploads.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::time::SystemTime;

use super::{Chunk, TransferPlan};
use crate::command::CommandError;
use crate::transport::DeviceRequest;

/// Byte stream to upload plus the metadata the device records with it.
pub struct TransferSource {
    reader: Box<dyn Read + Send>,
    size: u64,
    modified: SystemTime,
}

impl TransferSource {
    pub fn new(reader: Box<dyn Read + Send>, size: u64, modified: SystemTime) -> Self {
        Self {
            reader,
            size,
            modified,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
        Ok(Self::new(Box::new(BufReader::new(file)), meta.len(), modified))
    }

    pub fn from_bytes(data: Vec<u8>, modified: SystemTime) -> Self {
        let size = data.len() as u64;
        Self::new(Box::new(Cursor::new(data)), size, modified)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }
}

/// Upload of one file to a path on the device's SD card.
pub struct FileUpload {
    source: TransferSource,
    destination: String,
}

impl FileUpload {
    pub fn new(source: TransferSource, destination: impl Into<String>) -> Self {
        Self {
            source,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn size(&self) -> u64 {
        self.source.size
    }
}

impl TransferPlan for FileUpload {
    fn label(&self) -> String {
        format!("Uploading {}", self.destination)
    }

    fn total_len(&self) -> u64 {
        self.source.size
    }

    fn open_request(&self) -> DeviceRequest {
        DeviceRequest::CreateFile {
            path: self.destination.clone(),
            size: self.source.size,
            modified: self.source.modified,
        }
    }

    fn append_request(&mut self, chunk: Chunk) -> Result<DeviceRequest, CommandError> {
        let mut data = vec![0u8; chunk.len];
        self.source.reader.read_exact(&mut data)?;
        Ok(DeviceRequest::AppendFile { data })
    }

    fn close_request(&self) -> DeviceRequest {
        DeviceRequest::CloseFile {
            path: self.destination.clone(),
            modified: self.source.modified,
        }
    }

    fn cleanup_path(&self) -> Option<String> {
        Some(self.destination.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"patch bank contents").unwrap();
        file.flush().unwrap();

        let source = TransferSource::from_file(file.path()).unwrap();
        assert_eq!(source.size(), 19);

        let mut upload = FileUpload::new(source, "/bank.axb");
        let request = upload
            .append_request(Chunk {
                index: 0,
                offset: 0,
                len: 5,
            })
            .unwrap();
        assert_eq!(request.payload(), Some(&b"patch"[..]));
    }

    #[test]
    fn test_short_source_is_an_error() {
        let source = TransferSource::new(
            Box::new(Cursor::new(vec![1, 2, 3])),
            10,
            SystemTime::UNIX_EPOCH,
        );
        let mut upload = FileUpload::new(source, "/short.bin");
        let err = upload
            .append_request(Chunk {
                index: 0,
                offset: 0,
                len: 10,
            })
            .unwrap_err();
        assert!(matches!(err, CommandError::Source(_)));
    }

    #[test]
    fn test_open_and_close_carry_metadata() {
        let modified = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        let upload = FileUpload::new(TransferSource::from_bytes(vec![0; 42], modified), "/a.axp");
        assert_eq!(
            upload.open_request(),
            DeviceRequest::CreateFile {
                path: "/a.axp".into(),
                size: 42,
                modified
            }
        );
        assert_eq!(
            upload.close_request(),
            DeviceRequest::CloseFile {
                path: "/a.axp".into(),
                modified
            }
        );
        assert_eq!(upload.cleanup_path().as_deref(), Some("/a.axp"));
    }
}
