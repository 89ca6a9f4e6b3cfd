//! Payload materialization, deterministic part splitting and SHA-256
//! streaming helpers.

mod chunked;
mod payload;
mod tabular;
mod types;
mod validation;

pub use chunked::{
    PartIter, PartPlan, calculate_file_checksum, checksum_bytes, checksum_reader,
};
pub use payload::Payload;
pub use tabular::{TabularFormat, export_records};
pub use types::PartSpec;
pub use validation::{object_key_for, validate_object_key};

/// Default part size: 100 MiB.
pub const DEFAULT_PART_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of parts in one multipart session (S3-compatible limit).
pub const MAX_PARTS: u32 = 10_000;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("part size must be greater than zero")]
    ZeroPartSize,

    #[error("{total_parts} parts exceeds the limit of {MAX_PARTS}")]
    TooManyParts { total_parts: u64 },

    #[error("range {offset}+{len} outside payload of {size} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON export error: {0}")]
    Json(#[from] serde_json::Error),
}
