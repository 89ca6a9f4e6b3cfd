//! Single-request versus multipart dispatch.

use serde::{Deserialize, Serialize};

/// How a payload is sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// One `put_object` request.
    SinglePut,
    /// A resumable multipart session.
    Multipart,
}

impl UploadMode {
    /// Picks the mode for a payload of `size` bytes.
    ///
    /// A payload of exactly `threshold` bytes is still sent in one request.
    pub fn for_size(size: u64, threshold: u64) -> Self {
        if size > threshold {
            Self::Multipart
        } else {
            Self::SinglePut
        }
    }
}
