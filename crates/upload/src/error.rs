//! Upload error types.

use std::fmt;

use blobsend_store::StoreError;
use blobsend_transfer::TransferError;

use crate::verify::Verification;

/// Boxed cause of a session-fatal failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Step of the pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    ReadSource,
    UploadPart,
    SaveState,
    Complete,
    Put,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open session",
            Self::ReadSource => "read source",
            Self::UploadPart => "upload part",
            Self::SaveState => "save resume state",
            Self::Complete => "complete session",
            Self::Put => "put object",
            Self::Verify => "verify object",
        };
        f.write_str(name)
    }
}

/// Coarse classification callers script their policy against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad arguments or configuration; retrying cannot help.
    Invalid,
    /// A store or source error outside any live session; the whole upload
    /// may be retried. At [`Stage::Verify`] the object is already stored.
    Transient,
    /// The multipart session was torn down.
    SessionFatal,
    /// The stored object does not match the source.
    IntegrityMismatch,
    /// Stopped by the caller's cancellation token.
    Cancelled,
}

/// Errors returned by [`Uploader`](crate::Uploader).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload: {0}")]
    Invalid(String),

    #[error("{stage} failed: {source}")]
    Transient {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("reading source failed: {0}")]
    Source(#[source] TransferError),

    #[error("{stage} failed for session {session_id}{}: {source}", part_suffix(.part_number, .attempts))]
    SessionFatal {
        stage: Stage,
        session_id: String,
        part_number: Option<u32>,
        attempts: u32,
        #[source]
        source: BoxError,
        /// Set when tearing down the remote session failed as well.
        abort_error: Option<StoreError>,
    },

    #[error(
        "integrity mismatch: local {} bytes sha256 {}, remote {} bytes",
        .0.local_len, .0.local_digest, .0.remote_len
    )]
    IntegrityMismatch(Box<Verification>),

    #[error("upload cancelled")]
    Cancelled {
        session_id: Option<String>,
        abort_error: Option<StoreError>,
    },
}

fn part_suffix(part_number: &Option<u32>, attempts: &u32) -> String {
    match part_number {
        Some(n) => format!(" (part {n} after {attempts} attempts)"),
        None => String::new(),
    }
}

impl UploadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Invalid(_) => FailureKind::Invalid,
            Self::Transient { .. } | Self::Source(_) => FailureKind::Transient,
            Self::SessionFatal { .. } => FailureKind::SessionFatal,
            Self::IntegrityMismatch(_) => FailureKind::IntegrityMismatch,
            Self::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    /// The failed remote abort, if teardown itself went wrong.
    pub fn abort_error(&self) -> Option<&StoreError> {
        match self {
            Self::SessionFatal { abort_error, .. } | Self::Cancelled { abort_error, .. } => {
                abort_error.as_ref()
            }
            _ => None,
        }
    }

    /// The verification result, for integrity mismatches.
    pub fn verification(&self) -> Option<&Verification> {
        match self {
            Self::IntegrityMismatch(v) => Some(v),
            _ => None,
        }
    }
}

impl From<TransferError> for UploadError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::ZeroPartSize
            | TransferError::TooManyParts { .. }
            | TransferError::InvalidKey(_)
            | TransferError::UnsupportedFormat(_) => Self::Invalid(e.to_string()),
            other => Self::Source(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(UploadError::Invalid("x".into()).kind(), FailureKind::Invalid);
        assert_eq!(
            UploadError::Transient {
                stage: Stage::Open,
                source: StoreError::Transient("down".into()),
            }
            .kind(),
            FailureKind::Transient
        );
        assert_eq!(
            UploadError::Cancelled {
                session_id: None,
                abort_error: None,
            }
            .kind(),
            FailureKind::Cancelled
        );
    }

    #[test]
    fn transfer_errors_split_into_invalid_and_source() {
        let invalid: UploadError = TransferError::ZeroPartSize.into();
        assert_eq!(invalid.kind(), FailureKind::Invalid);

        let io: UploadError = TransferError::Io(std::io::Error::other("disk")).into();
        assert_eq!(io.kind(), FailureKind::Transient);
    }

    #[test]
    fn session_fatal_names_part_and_attempts() {
        let err = UploadError::SessionFatal {
            stage: Stage::UploadPart,
            session_id: "s1".into(),
            part_number: Some(3),
            attempts: 4,
            source: Box::new(StoreError::Transient("reset".into())),
            abort_error: Some(StoreError::Transient("abort down".into())),
        };
        assert_eq!(
            err.to_string(),
            "upload part failed for session s1 (part 3 after 4 attempts): transient failure: reset"
        );
        assert!(err.abort_error().is_some());
    }
}
