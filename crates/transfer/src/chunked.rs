use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::types::PartSpec;
use crate::{MAX_PARTS, TransferError};

/// Read buffer used when hashing files and remote streams.
const HASH_BUFFER_SIZE: usize = 8192;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Streams `reader` to EOF, returning the hex SHA-256 and the byte count.
pub async fn checksum_reader<R>(reader: &mut R) -> std::io::Result<(String, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

// ---------------------------------------------------------------------------
// PartPlan
// ---------------------------------------------------------------------------

/// Deterministic division of a payload into fixed-size parts.
///
/// Every part except the last is exactly `part_size` bytes. The plan holds
/// no cursor: iterating it twice yields identical sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    total_size: u64,
    part_size: u64,
    total_parts: u32,
}

impl PartPlan {
    /// Plans `total_size` bytes in parts of `part_size` bytes.
    pub fn new(total_size: u64, part_size: u64) -> Result<Self, TransferError> {
        if part_size == 0 {
            return Err(TransferError::ZeroPartSize);
        }
        let parts = total_size.div_ceil(part_size);
        if parts > u64::from(MAX_PARTS) {
            return Err(TransferError::TooManyParts { total_parts: parts });
        }
        Ok(Self {
            total_size,
            part_size,
            total_parts: parts as u32,
        })
    }

    /// Returns the descriptor for a 1-based `part_number`, if in range.
    pub fn part(&self, part_number: u32) -> Option<PartSpec> {
        if part_number == 0 || part_number > self.total_parts {
            return None;
        }
        let offset = u64::from(part_number - 1) * self.part_size;
        let length = self.part_size.min(self.total_size - offset);
        Some(PartSpec {
            part_number,
            offset,
            length,
        })
    }

    /// Lazily yields every part in order.
    pub fn iter(&self) -> PartIter {
        PartIter {
            plan: *self,
            next: 1,
        }
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

impl IntoIterator for &PartPlan {
    type Item = PartSpec;
    type IntoIter = PartIter;

    fn into_iter(self) -> PartIter {
        self.iter()
    }
}

/// Iterator over the parts of a [`PartPlan`].
#[derive(Debug, Clone)]
pub struct PartIter {
    plan: PartPlan,
    next: u32,
}

impl Iterator for PartIter {
    type Item = PartSpec;

    fn next(&mut self) -> Option<PartSpec> {
        let part = self.plan.part(self.next)?;
        self.next += 1;
        Some(part)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.plan.total_parts + 1).saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for PartIter {}
