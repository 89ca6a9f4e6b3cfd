//! JSON-file resume-state store.

use std::io::Write;
use std::path::{Path, PathBuf};

use blobsend_protocol::ResumeStateRecord;
use tracing::{debug, warn};

use crate::{StateError, StateFuture, StateStore};

/// Resume state persisted as a single JSON document on disk.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the target, so a crash never leaves a half-written record.
/// One file must be used per destination; concurrent uploads sharing a
/// path are not supported.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> StateFuture<'_, Option<ResumeStateRecord>> {
        Box::pin(async move {
            let path = self.path.clone();
            match tokio::task::spawn_blocking(move || load_record(&path)).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "resume state load task failed, starting fresh");
                    None
                }
            }
        })
    }

    fn save<'a>(
        &'a self,
        record: &'a ResumeStateRecord,
    ) -> StateFuture<'a, Result<(), StateError>> {
        Box::pin(async move {
            let json = serde_json::to_vec_pretty(record)?;
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &json))
                .await
                .map_err(|e| std::io::Error::other(format!("task join error: {e}")))??;
            debug!(
                path = %self.path.display(),
                session_id = %record.session_id,
                parts = record.parts.len(),
                "resume state saved"
            );
            Ok(())
        })
    }

    fn clear(&self) -> StateFuture<'_, Result<(), StateError>> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), "resume state cleared");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Reads and parses the record; any failure other than absence is logged.
fn load_record(path: &Path) -> Option<ResumeStateRecord> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "resume state unreadable, starting fresh");
            return None;
        }
    };

    match serde_json::from_slice::<ResumeStateRecord>(&data) {
        Ok(record) => {
            debug!(
                path = %path.display(),
                session_id = %record.session_id,
                parts = record.parts.len(),
                "loaded resume state"
            );
            Some(record)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "resume state malformed, starting fresh");
            None
        }
    }
}

/// Writes `data` to a sibling temp file, syncs it, and renames it over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StateError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
