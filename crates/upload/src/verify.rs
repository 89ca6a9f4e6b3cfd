//! End-to-end integrity check of a stored object against its source.

use blobsend_store::{ObjectStore, StoreError};
use blobsend_transfer::{Payload, checksum_reader};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Stage, UploadError};

/// Outcome of comparing a stored object with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub local_len: u64,
    pub remote_len: u64,
    pub local_digest: String,
    /// Absent when the lengths already disagreed and the object was not read back.
    pub remote_digest: Option<String>,
}

/// Compares `bucket`/`key` with `payload` by length, then by SHA-256.
///
/// The remote digest is computed by streaming the whole object back.
/// A mismatch is a normal result here, not an error.
pub async fn verify_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    payload: &Payload,
) -> Result<Verification, UploadError> {
    let local_len = payload.len();
    let remote_len = store
        .head_object(bucket, key)
        .await
        .map_err(|source| UploadError::Transient {
            stage: Stage::Verify,
            source,
        })?;
    let local_digest = payload.sha256().await?;

    if remote_len != local_len {
        warn!(bucket, key, local_len, remote_len, "stored object length differs from source");
        return Ok(Verification {
            verified: false,
            local_len,
            remote_len,
            local_digest,
            remote_digest: None,
        });
    }

    let mut reader = store
        .get_object(bucket, key)
        .await
        .map_err(|source| UploadError::Transient {
            stage: Stage::Verify,
            source,
        })?;
    let (remote_digest, read_len) = checksum_reader(&mut reader)
        .await
        .map_err(|e| UploadError::Transient {
            stage: Stage::Verify,
            source: StoreError::Io(e),
        })?;

    let verified = read_len == local_len && remote_digest == local_digest;
    if verified {
        info!(bucket, key, bytes = local_len, sha256 = %local_digest, "integrity verified");
    } else {
        warn!(
            bucket,
            key,
            local = %local_digest,
            remote = %remote_digest,
            "stored object digest differs from source"
        );
    }

    Ok(Verification {
        verified,
        local_len,
        remote_len: read_len,
        local_digest,
        remote_digest: Some(remote_digest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobsend_store::MemoryObjectStore;
    use blobsend_transfer::checksum_bytes;

    async fn stored(data: &[u8]) -> MemoryObjectStore {
        let store = MemoryObjectStore::with_bucket("b");
        store.put_object("b", "k", data.to_vec()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn identical_object_verifies() {
        let data = b"the quick brown fox".to_vec();
        let store = stored(&data).await;
        let v = verify_object(&store, "b", "k", &Payload::from_bytes(data.clone()))
            .await
            .unwrap();
        assert!(v.verified);
        assert_eq!(v.local_digest, checksum_bytes(&data));
        assert_eq!(v.remote_digest.as_deref(), Some(v.local_digest.as_str()));
    }

    #[tokio::test]
    async fn one_flipped_byte_fails() {
        let data = vec![7u8; 4096];
        let store = stored(&data).await;
        store.corrupt_object("b", "k", 2048);

        let v = verify_object(&store, "b", "k", &Payload::from_bytes(data))
            .await
            .unwrap();
        assert!(!v.verified);
        assert_eq!(v.local_len, v.remote_len);
        assert_ne!(v.remote_digest.unwrap(), v.local_digest);
    }

    #[tokio::test]
    async fn length_mismatch_skips_download() {
        let data = vec![1u8; 100];
        let store = stored(&data).await;
        store.truncate_object("b", "k", 1);

        let v = verify_object(&store, "b", "k", &Payload::from_bytes(data))
            .await
            .unwrap();
        assert!(!v.verified);
        assert_eq!(v.remote_len, 99);
        assert!(v.remote_digest.is_none());
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn missing_object_is_transient() {
        let store = MemoryObjectStore::with_bucket("b");
        let err = verify_object(&store, "b", "k", &Payload::from_text("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Transient {
                stage: Stage::Verify,
                ..
            }
        ));
    }
}
