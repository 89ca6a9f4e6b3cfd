use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A part acknowledged by the remote store.
///
/// `token` is opaque (an ETag for S3-compatible stores) and must be echoed
/// back verbatim when the session is completed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(alias = "PartNumber")]
    pub part_number: u32,
    #[serde(alias = "ETag")]
    pub token: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, token: impl Into<String>) -> Self {
        Self {
            part_number,
            token: token.into(),
        }
    }
}

/// Durable mirror of an in-flight multipart session.
///
/// Serialized as one JSON document per upload attempt:
///
/// ```json
/// { "session_id": "abc", "parts": [ { "part_number": 1, "token": "e1" } ] }
/// ```
///
/// The destination fields are optional so that records written by older
/// tools (which only carried the session id and parts) still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeStateRecord {
    #[serde(alias = "UploadId")]
    pub session_id: String,
    #[serde(alias = "Parts")]
    pub parts: Vec<CompletedPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

/// Reasons a loaded record cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("empty session id")]
    EmptySessionId,

    #[error("part {part_number} outside 1..={total_parts}")]
    PartOutOfRange { part_number: u32, total_parts: u32 },

    #[error("duplicate part {0}")]
    DuplicatePart(u32),

    #[error("record belongs to a different upload ({0})")]
    Stale(&'static str),
}

impl ResumeStateRecord {
    /// Creates an empty record for a freshly opened session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            parts: Vec::new(),
            bucket: None,
            key: None,
            part_size: None,
            total_size: None,
        }
    }

    /// Stamps the record with the destination and geometry it was created for.
    pub fn with_destination(
        mut self,
        bucket: &str,
        key: &str,
        part_size: u64,
        total_size: u64,
    ) -> Self {
        self.bucket = Some(bucket.to_string());
        self.key = Some(key.to_string());
        self.part_size = Some(part_size);
        self.total_size = Some(total_size);
        self
    }

    /// Parts ordered by part number, as required at completion time.
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Checks that the record can be trusted for an upload of the given shape.
    ///
    /// Destination fields are only compared when the record carries them.
    pub fn validate_for(
        &self,
        bucket: &str,
        key: &str,
        part_size: u64,
        total_size: u64,
    ) -> Result<(), RecordError> {
        if self.session_id.trim().is_empty() {
            return Err(RecordError::EmptySessionId);
        }
        if self.bucket.as_deref().is_some_and(|b| b != bucket) {
            return Err(RecordError::Stale("bucket"));
        }
        if self.key.as_deref().is_some_and(|k| k != key) {
            return Err(RecordError::Stale("key"));
        }
        if self.part_size.is_some_and(|p| p != part_size) {
            return Err(RecordError::Stale("part size"));
        }
        if self.total_size.is_some_and(|t| t != total_size) {
            return Err(RecordError::Stale("total size"));
        }

        let total = total_parts(total_size, part_size);
        let mut seen = HashSet::with_capacity(self.parts.len());
        for part in &self.parts {
            if part.part_number == 0 || part.part_number > total {
                return Err(RecordError::PartOutOfRange {
                    part_number: part.part_number,
                    total_parts: total,
                });
            }
            if !seen.insert(part.part_number) {
                return Err(RecordError::DuplicatePart(part.part_number));
            }
        }
        Ok(())
    }
}

/// Number of parts needed for `total_size` bytes at `part_size` bytes each.
///
/// Returns 0 when either argument is 0. Saturates at `u32::MAX`.
pub fn total_parts(total_size: u64, part_size: u64) -> u32 {
    if part_size == 0 || total_size == 0 {
        return 0;
    }
    u32::try_from(total_size.div_ceil(part_size)).unwrap_or(u32::MAX)
}
