//! Store error types.

/// Errors returned by [`ObjectStore`](crate::ObjectStore) backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    #[error("no such key: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    #[error("invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl StoreError {
    /// Returns `true` if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StoreError::Transient("reset".into()).is_retryable());
        assert!(StoreError::Io(std::io::Error::other("broken pipe")).is_retryable());
        assert!(!StoreError::NoSuchUpload("u1".into()).is_retryable());
        assert!(!StoreError::Rejected("bad".into()).is_retryable());
        assert!(
            !StoreError::InvalidPart {
                part_number: 1,
                reason: "etag".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_names_the_part() {
        let e = StoreError::InvalidPart {
            part_number: 3,
            reason: "token mismatch".into(),
        };
        assert_eq!(e.to_string(), "invalid part 3: token mismatch");
    }
}
