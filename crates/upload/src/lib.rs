//! Resumable, integrity-verified object upload.
//!
//! [`Uploader`] pushes a [`Payload`](blobsend_transfer::Payload) to an
//! [`ObjectStore`](blobsend_store::ObjectStore). Small payloads go out in
//! one request; larger ones use a multipart session whose progress is
//! mirrored into a [`StateStore`](blobsend_resume::StateStore) after every
//! part, so a crashed run resumes without re-sending acknowledged parts.
//! Every upload ends with a SHA-256 comparison of the stored object against
//! the source.
//!
//! # Pipeline
//!
//! 1. **Dispatch**: single request if `size <= multipart_threshold`
//! 2. **Resume or open**: trust a fitting state record, else open a session
//! 3. **Parts**: upload missing parts with linear-backoff retry, saving
//!    state after each
//! 4. **Complete**: hand the sorted part list to the store, clear state
//! 5. **Verify**: compare lengths, then digests

pub mod config;
pub mod dispatch;
pub mod error;
pub mod finalize;
mod part;
pub mod session;
pub mod uploader;
pub mod verify;

pub use config::UploadConfig;
pub use dispatch::UploadMode;
pub use error::{FailureKind, Stage, UploadError};
pub use session::UploadSession;
pub use uploader::{UploadReport, Uploader};
pub use verify::{Verification, verify_object};
