//! Directory-backed object store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use blobsend_protocol::CompletedPart;
use blobsend_transfer::{checksum_bytes, validate_object_key};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{ObjectReader, ObjectStore, StoreError, StoreFuture};

/// Staging area for in-progress multipart sessions, relative to the root.
const STAGING_DIR: &str = ".multipart";

/// Object store rooted at a local directory.
///
/// Buckets are subdirectories of the root and objects live at
/// `<root>/<bucket>/<key>`. Multipart sessions stage their parts under
/// `<root>/.multipart/<session_id>/` until completed or aborted.
#[derive(Debug, Clone)]
pub struct DirObjectStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionMeta {
    bucket: String,
    key: String,
}

impl DirObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the bucket directory if it does not exist.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty()
            || bucket.starts_with('.')
            || bucket.contains(['/', '\\', '\0'])
        {
            return Err(StoreError::Rejected(format!("invalid bucket name: {bucket:?}")));
        }
        Ok(self.root.join(bucket))
    }

    /// Resolves an object path, requiring the bucket to exist.
    async fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        validate_object_key(key).map_err(|e| StoreError::Rejected(e.to_string()))?;
        match tokio::fs::metadata(&dir).await {
            Ok(m) if m.is_dir() => Ok(dir.join(key)),
            Ok(_) => Err(StoreError::NoSuchBucket(bucket.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NoSuchBucket(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        // Session ids are generated here; anything else cannot name a session.
        if uuid::Uuid::parse_str(session_id).is_err() {
            return Err(StoreError::NoSuchUpload(session_id.to_string()));
        }
        Ok(self.root.join(STAGING_DIR).join(session_id))
    }

    /// Loads a session's metadata and checks it belongs to `bucket`/`key`.
    async fn open_session(
        &self,
        bucket: &str,
        key: &str,
        session_id: &str,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.session_dir(session_id)?;
        let data = match tokio::fs::read(dir.join("meta.json")).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NoSuchUpload(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let meta: SessionMeta = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        if meta.bucket != bucket || meta.key != key {
            return Err(StoreError::NoSuchUpload(session_id.to_string()));
        }
        Ok(dir)
    }
}

/// Writes `data` next to `path` and renames it into place.
async fn write_replace(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = sibling_tmp(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Writes the staged parts, in the given order, into `tmp`.
async fn concat_parts(tmp: &Path, staged: &Path, parts: &[CompletedPart]) -> std::io::Result<()> {
    let mut out = tokio::fs::File::create(tmp).await?;
    for part in parts {
        let mut src = tokio::fs::File::open(staged.join(part.part_number.to_string())).await?;
        tokio::io::copy(&mut src, &mut out).await?;
    }
    out.flush().await?;
    out.sync_all().await
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp-{}", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

fn not_found_as_key(e: std::io::Error, bucket: &str, key: &str) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        e.into()
    }
}

impl ObjectStore for DirObjectStore {
    fn open_multipart<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.object_path(bucket, key).await?;

            let session_id = uuid::Uuid::new_v4().to_string();
            let dir = self.session_dir(&session_id)?;
            tokio::fs::create_dir_all(dir.join("parts")).await?;
            let meta = SessionMeta {
                bucket: bucket.to_string(),
                key: key.to_string(),
            };
            let json = serde_json::to_vec(&meta)
                .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;
            tokio::fs::write(dir.join("meta.json"), json).await?;

            debug!(%session_id, bucket, key, "opened multipart session");
            Ok(session_id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        session_id: &'a str,
        part_number: u32,
        data: Vec<u8>,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            if !(1..=10_000).contains(&part_number) {
                return Err(StoreError::InvalidPart {
                    part_number,
                    reason: "part number out of range".into(),
                });
            }
            let dir = self.open_session(bucket, key, session_id).await?;
            let parts = dir.join("parts");

            let token = checksum_bytes(&data);
            write_replace(&parts.join(part_number.to_string()), &data).await?;
            write_replace(&parts.join(format!("{part_number}.token")), token.as_bytes()).await?;
            Ok(token)
        })
    }

    fn complete_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        session_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let dir = self.open_session(bucket, key, session_id).await?;
            let target = self.object_path(bucket, key).await?;
            if parts.is_empty() {
                return Err(StoreError::Rejected("at least one part is required".into()));
            }

            let staged = dir.join("parts");
            let mut previous = 0;
            for part in parts {
                if part.part_number <= previous {
                    return Err(StoreError::InvalidPart {
                        part_number: part.part_number,
                        reason: "parts must be in ascending order".into(),
                    });
                }
                previous = part.part_number;

                let token_path = staged.join(format!("{}.token", part.part_number));
                let stored = match tokio::fs::read_to_string(&token_path).await {
                    Ok(t) => t,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(StoreError::InvalidPart {
                            part_number: part.part_number,
                            reason: "part was never uploaded".into(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                };
                if stored != part.token {
                    return Err(StoreError::InvalidPart {
                        part_number: part.part_number,
                        reason: "token mismatch".into(),
                    });
                }
            }

            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = sibling_tmp(&target);
            let assembled = match concat_parts(&tmp, &staged, parts).await {
                Ok(()) => tokio::fs::rename(&tmp, &target).await,
                Err(e) => Err(e),
            };
            if let Err(e) = assembled {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e.into());
            }

            // The object is live from here on.
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                warn!(%session_id, error = %e, "failed to remove multipart staging");
            }

            info!(%session_id, bucket, key, parts = parts.len(), "multipart session completed");
            Ok(())
        })
    }

    fn abort_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        session_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let dir = self.open_session(bucket, key, session_id).await?;
            tokio::fs::remove_dir_all(&dir).await?;
            debug!(%session_id, bucket, key, "multipart session aborted");
            Ok(())
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Vec<u8>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let target = self.object_path(bucket, key).await?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            write_replace(&target, &data).await
        })
    }

    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let target = self.object_path(bucket, key).await?;
            let meta = tokio::fs::metadata(&target)
                .await
                .map_err(|e| not_found_as_key(e, bucket, key))?;
            if !meta.is_file() {
                return Err(StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Ok(meta.len())
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ObjectReader> {
        Box::pin(async move {
            let target = self.object_path(bucket, key).await?;
            let file = tokio::fs::File::open(&target)
                .await
                .map_err(|e| not_found_as_key(e, bucket, key))?;
            Ok(Box::new(file) as ObjectReader)
        })
    }
}
