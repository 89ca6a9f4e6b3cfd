//! Shared data model for resumable multipart uploads.
//!
//! The [`ResumeStateRecord`] defined here is the on-disk resume-state
//! document; its JSON shape is pinned by the `wire-compat` fixtures.

pub mod events;
pub mod types;

pub use events::{UploadEvent, UploadPhase};
pub use types::{CompletedPart, RecordError, ResumeStateRecord, total_parts};
