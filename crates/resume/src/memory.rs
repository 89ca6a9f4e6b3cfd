//! In-memory resume-state store.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use blobsend_protocol::ResumeStateRecord;

use crate::{StateError, StateFuture, StateStore};

/// Resume state kept in process memory.
///
/// Does not survive restarts by itself; useful when the embedding
/// application persists the record elsewhere, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    record: Mutex<Option<ResumeStateRecord>>,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with `record`.
    pub fn with_record(record: ResumeStateRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    /// Returns a copy of the current record.
    pub fn snapshot(&self) -> Option<ResumeStateRecord> {
        self.record.lock().unwrap().clone()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `clear` calls.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> StateFuture<'_, Option<ResumeStateRecord>> {
        Box::pin(async move { self.snapshot() })
    }

    fn save<'a>(
        &'a self,
        record: &'a ResumeStateRecord,
    ) -> StateFuture<'a, Result<(), StateError>> {
        Box::pin(async move {
            *self.record.lock().unwrap() = Some(record.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn clear(&self) -> StateFuture<'_, Result<(), StateError>> {
        Box::pin(async move {
            *self.record.lock().unwrap() = None;
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
