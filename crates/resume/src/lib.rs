//! Resume-state persistence for multipart sessions.
//!
//! A [`StateStore`] holds at most one [`ResumeStateRecord`]: the durable
//! list of parts the remote store has acknowledged for the current session.
//! Its presence is the signal that a resumable attempt exists. Stores are
//! consulted before every part and rewritten after every part success.
//!
//! [`FileStateStore`] is the default adapter (one JSON document per
//! destination); [`MemoryStateStore`] serves tests and embedders that keep
//! state elsewhere.

mod file;
mod memory;

use std::future::Future;
use std::pin::Pin;

pub use blobsend_protocol::ResumeStateRecord;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Errors from writing or removing resume state.
///
/// Loading never fails: unreadable or malformed state is reported as absent.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Boxed future returned by [`StateStore`] methods.
pub type StateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pluggable resume-state persistence.
///
/// Implementations must make `save` atomic: after a crash the store holds
/// either the previous record or the new one, never a torn write.
pub trait StateStore: Send + Sync {
    /// Returns the stored record, or `None` if absent or untrustworthy.
    fn load(&self) -> StateFuture<'_, Option<ResumeStateRecord>>;

    /// Replaces the stored record.
    fn save<'a>(&'a self, record: &'a ResumeStateRecord) -> StateFuture<'a, Result<(), StateError>>;

    /// Removes the stored record. Removing an absent record succeeds.
    fn clear(&self) -> StateFuture<'_, Result<(), StateError>>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}
