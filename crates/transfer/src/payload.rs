//! Payload materialization: bytes, text, files and tabular exports as one
//! readable source of known length.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::TransferError;
use crate::chunked::{calculate_file_checksum, checksum_bytes};
use crate::tabular::{TabularFormat, export_records};
use crate::types::PartSpec;

/// A source payload with a known total length.
///
/// Cloning is cheap: in-memory payloads share their buffer and file
/// payloads only carry the path.
#[derive(Debug, Clone)]
pub enum Payload {
    /// In-memory buffer.
    Bytes(Arc<Vec<u8>>),
    /// Existing file, length captured when the payload was created.
    File { path: PathBuf, len: u64 },
}

impl Payload {
    /// Wraps raw bytes.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::new(data.into()))
    }

    /// Wraps UTF-8 text.
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes().to_vec())
    }

    /// Stats `path` and wraps it as a file payload.
    pub fn from_file(path: &Path) -> Result<Self, TransferError> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        Ok(Self::File {
            path: path.to_path_buf(),
            len: meta.len(),
        })
    }

    /// Exports tabular records in `format` and wraps the result.
    pub fn from_records(
        rows: &[Map<String, Value>],
        format: TabularFormat,
    ) -> Result<Self, TransferError> {
        Ok(Self::from_bytes(export_records(rows, format)?))
    }

    /// Total length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Bytes(data) => data.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the bytes of one part.
    pub async fn read_part(&self, part: &PartSpec) -> Result<Vec<u8>, TransferError> {
        self.read_range(part.offset, part.length).await
    }

    /// Reads `len` bytes starting at `offset`.
    ///
    /// File reads run on the blocking pool.
    pub async fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        let size = self.len();
        let in_bounds = offset.checked_add(len).is_some_and(|end| end <= size);
        if !in_bounds {
            return Err(TransferError::OutOfRange { offset, len, size });
        }

        match self {
            Self::Bytes(data) => {
                let start = offset as usize;
                Ok(data[start..start + len as usize].to_vec())
            }
            Self::File { path, .. } => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_file_range(&path, offset, len))
                    .await
                    .map_err(|e| std::io::Error::other(format!("task join error: {e}")))?
            }
        }
    }

    /// Streaming SHA-256 of the whole payload.
    pub async fn sha256(&self) -> Result<String, TransferError> {
        match self {
            Self::Bytes(data) => Ok(checksum_bytes(data)),
            Self::File { path, .. } => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || calculate_file_checksum(&path))
                    .await
                    .map_err(|e| std::io::Error::other(format!("task join error: {e}")))?
            }
        }
    }

    /// Whole payload as one buffer, for single-request uploads.
    pub async fn read_all(&self) -> Result<Vec<u8>, TransferError> {
        self.read_range(0, self.len()).await
    }
}

fn read_file_range(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
