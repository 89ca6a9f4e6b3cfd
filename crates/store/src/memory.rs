//! In-memory object store with fault injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use blobsend_protocol::CompletedPart;
use blobsend_transfer::checksum_bytes;
use tracing::debug;

use crate::{ObjectReader, ObjectStore, StoreError, StoreFuture};

/// Object store held entirely in memory.
///
/// Follows S3 multipart semantics: parts are staged per session, tokens
/// must be echoed back at completion in ascending part order, and only the
/// listed parts make it into the final object. Failures can be injected to
/// exercise retry, abort and crash-recovery paths.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
    faults: Mutex<Faults>,
    calls: Calls,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: HashMap<String, HashMap<String, Vec<u8>>>,
    sessions: HashMap<String, PendingUpload>,
    next_session: u64,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, (String, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining transient failures per part number.
    part_failures: HashMap<u32, u32>,
    /// Part numbers whose next request hangs before reaching the store.
    part_stalls: HashSet<u32>,
    open_failures: u32,
    reject_complete: bool,
    fail_abort: bool,
}

#[derive(Debug, Default)]
struct Calls {
    open: AtomicUsize,
    complete: AtomicUsize,
    abort: AtomicUsize,
    put: AtomicUsize,
    get: AtomicUsize,
    parts: Mutex<Vec<u32>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with one empty bucket.
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.inner
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    /// Returns a copy of a stored object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.buckets.get(bucket)?.get(key).cloned()
    }

    /// Number of multipart sessions neither completed nor aborted.
    pub fn pending_sessions(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// Part numbers staged for a session, in order.
    pub fn staged_parts(&self, session_id: &str) -> Vec<u32> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(session_id)
            .map(|s| s.parts.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Flips every bit of the byte at `index` in a stored object.
    pub fn corrupt_object(&self, bucket: &str, key: &str, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        let byte = inner
            .buckets
            .get_mut(bucket)
            .and_then(|b| b.get_mut(key))
            .and_then(|data| data.get_mut(index));
        if let Some(byte) = byte {
            *byte ^= 0xFF;
        }
    }

    /// Drops the last `n` bytes of a stored object.
    pub fn truncate_object(&self, bucket: &str, key: &str, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(data) = inner.buckets.get_mut(bucket).and_then(|b| b.get_mut(key)) {
            let len = data.len().saturating_sub(n);
            data.truncate(len);
        }
    }

    // -- fault injection ----------------------------------------------------

    /// The next `times` requests for `part_number` fail transiently.
    pub fn fail_part(&self, part_number: u32, times: u32) {
        self.faults
            .lock()
            .unwrap()
            .part_failures
            .insert(part_number, times);
    }

    /// The next request for `part_number` hangs forever without reaching
    /// the store, as if the process died mid-request.
    pub fn stall_part(&self, part_number: u32) {
        self.faults.lock().unwrap().part_stalls.insert(part_number);
    }

    /// The next `times` session opens fail transiently.
    pub fn fail_open(&self, times: u32) {
        self.faults.lock().unwrap().open_failures = times;
    }

    /// The next completion request is rejected.
    pub fn reject_complete(&self) {
        self.faults.lock().unwrap().reject_complete = true;
    }

    /// Every abort request fails.
    pub fn fail_abort(&self) {
        self.faults.lock().unwrap().fail_abort = true;
    }

    // -- call accounting ----------------------------------------------------

    /// Part numbers of every `upload_part` request received, in order.
    pub fn part_calls(&self) -> Vec<u32> {
        self.calls.parts.lock().unwrap().clone()
    }

    pub fn upload_part_calls(&self) -> usize {
        self.calls.parts.lock().unwrap().len()
    }

    pub fn open_calls(&self) -> usize {
        self.calls.open.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.calls.complete.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.calls.abort.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.calls.put.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.calls.get.load(Ordering::SeqCst)
    }

    fn take_part_fault(&self, part_number: u32) -> (bool, bool) {
        let mut faults = self.faults.lock().unwrap();
        let stall = faults.part_stalls.remove(&part_number);
        let fail = match faults.part_failures.get_mut(&part_number) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };
        (stall, fail)
    }
}

fn check_bucket(inner: &Inner, bucket: &str) -> Result<(), StoreError> {
    if inner.buckets.contains_key(bucket) {
        Ok(())
    } else {
        Err(StoreError::NoSuchBucket(bucket.to_string()))
    }
}

fn session<'i>(
    inner: &'i mut Inner,
    bucket: &str,
    key: &str,
    session_id: &str,
) -> Result<&'i mut PendingUpload, StoreError> {
    match inner.sessions.get_mut(session_id) {
        Some(s) if s.bucket == bucket && s.key == key => Ok(s),
        _ => Err(StoreError::NoSuchUpload(session_id.to_string())),
    }
}

impl ObjectStore for MemoryObjectStore {
    fn open_multipart<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.calls.open.fetch_add(1, Ordering::SeqCst);
            {
                let mut faults = self.faults.lock().unwrap();
                if faults.open_failures > 0 {
                    faults.open_failures -= 1;
                    return Err(StoreError::Transient("injected open failure".into()));
                }
            }

            let mut inner = self.inner.lock().unwrap();
            check_bucket(&inner, bucket)?;
            inner.next_session += 1;
            let session_id = format!("mem-upload-{}", inner.next_session);
            inner.sessions.insert(
                session_id.clone(),
                PendingUpload {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    parts: BTreeMap::new(),
                },
            );
            debug!(%session_id, bucket, key, "memory store opened session");
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
            let (stall, fail) = self.take_part_fault(part_number);
            if stall {
                std::future::pending::<()>().await;
            }

            self.calls.parts.lock().unwrap().push(part_number);
            if fail {
                return Err(StoreError::Transient(format!(
                    "injected failure for part {part_number}"
                )));
            }
            if !(1..=10_000).contains(&part_number) {
                return Err(StoreError::InvalidPart {
                    part_number,
                    reason: "part number out of range".into(),
                });
            }

            let token = checksum_bytes(&data);
            let mut inner = self.inner.lock().unwrap();
            let upload = session(&mut inner, bucket, key, session_id)?;
            upload.parts.insert(part_number, (token.clone(), data));
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
            self.calls.complete.fetch_add(1, Ordering::SeqCst);
            {
                let mut faults = self.faults.lock().unwrap();
                if std::mem::take(&mut faults.reject_complete) {
                    return Err(StoreError::Rejected("injected completion rejection".into()));
                }
            }

            let mut inner = self.inner.lock().unwrap();
            let upload = session(&mut inner, bucket, key, session_id)?;
            if parts.is_empty() {
                return Err(StoreError::Rejected("at least one part is required".into()));
            }

            let mut object = Vec::new();
            let mut previous = 0;
            for part in parts {
                if part.part_number <= previous {
                    return Err(StoreError::InvalidPart {
                        part_number: part.part_number,
                        reason: "parts must be in ascending order".into(),
                    });
                }
                previous = part.part_number;
                match upload.parts.get(&part.part_number) {
                    Some((token, data)) if *token == part.token => object.extend_from_slice(data),
                    Some(_) => {
                        return Err(StoreError::InvalidPart {
                            part_number: part.part_number,
                            reason: "token mismatch".into(),
                        });
                    }
                    None => {
                        return Err(StoreError::InvalidPart {
                            part_number: part.part_number,
                            reason: "part was never uploaded".into(),
                        });
                    }
                }
            }

            inner.sessions.remove(session_id);
            inner
                .buckets
                .entry(bucket.to_string())
                .or_default()
                .insert(key.to_string(), object);
            debug!(%session_id, bucket, key, parts = parts.len(), "memory store completed session");
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
            self.calls.abort.fetch_add(1, Ordering::SeqCst);
            if self.faults.lock().unwrap().fail_abort {
                return Err(StoreError::Transient("injected abort failure".into()));
            }
            let mut inner = self.inner.lock().unwrap();
            session(&mut inner, bucket, key, session_id)?;
            inner.sessions.remove(session_id);
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
            self.calls.put.fetch_add(1, Ordering::SeqCst);
            let mut inner = self.inner.lock().unwrap();
            let objects = inner
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
            objects.insert(key.to_string(), data);
            Ok(())
        })
    }

    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            check_bucket(&inner, bucket)?;
            inner.buckets[bucket]
                .get(key)
                .map(|d| d.len() as u64)
                .ok_or_else(|| StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ObjectReader> {
        Box::pin(async move {
            self.calls.get.fetch_add(1, Ordering::SeqCst);
            let inner = self.inner.lock().unwrap();
            check_bucket(&inner, bucket)?;
            let data = inner.buckets[bucket]
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;
            Ok(Box::new(Cursor::new(data)) as ObjectReader)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(mut reader: ObjectReader) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn multipart_roundtrip() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        let t2 = store.upload_part("b", "k", &id, 2, b"world".to_vec()).await.unwrap();
        let t1 = store.upload_part("b", "k", &id, 1, b"hello ".to_vec()).await.unwrap();

        let parts = vec![CompletedPart::new(1, t1), CompletedPart::new(2, t2)];
        store.complete_multipart("b", "k", &id, &parts).await.unwrap();

        assert_eq!(store.object("b", "k").unwrap(), b"hello world");
        assert_eq!(store.head_object("b", "k").await.unwrap(), 11);
        assert_eq!(read_all(store.get_object("b", "k").await.unwrap()).await, b"hello world");
        assert_eq!(store.pending_sessions(), 0);
    }

    #[tokio::test]
    async fn complete_requires_ascending_order() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        let t1 = store.upload_part("b", "k", &id, 1, b"a".to_vec()).await.unwrap();
        let t2 = store.upload_part("b", "k", &id, 2, b"b".to_vec()).await.unwrap();

        let parts = vec![CompletedPart::new(2, t2), CompletedPart::new(1, t1)];
        let result = store.complete_multipart("b", "k", &id, &parts).await;
        assert!(matches!(result, Err(StoreError::InvalidPart { part_number: 1, .. })));
    }

    #[tokio::test]
    async fn complete_checks_tokens() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        store.upload_part("b", "k", &id, 1, b"a".to_vec()).await.unwrap();

        let parts = vec![CompletedPart::new(1, "bogus")];
        let result = store.complete_multipart("b", "k", &id, &parts).await;
        assert!(matches!(result, Err(StoreError::InvalidPart { .. })));
        assert!(store.object("b", "k").is_none());
    }

    #[tokio::test]
    async fn abort_discards_parts() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        store.upload_part("b", "k", &id, 1, b"a".to_vec()).await.unwrap();
        assert_eq!(store.staged_parts(&id), vec![1]);

        store.abort_multipart("b", "k", &id).await.unwrap();
        assert_eq!(store.pending_sessions(), 0);

        let result = store.upload_part("b", "k", &id, 2, b"b".to_vec()).await;
        assert!(matches!(result, Err(StoreError::NoSuchUpload(_))));
    }

    #[tokio::test]
    async fn unknown_bucket() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.open_multipart("nope", "k").await,
            Err(StoreError::NoSuchBucket(_))
        ));
        assert!(matches!(
            store.put_object("nope", "k", vec![1]).await,
            Err(StoreError::NoSuchBucket(_))
        ));
    }

    #[tokio::test]
    async fn missing_key() {
        let store = MemoryObjectStore::with_bucket("b");
        assert!(matches!(
            store.head_object("b", "k").await,
            Err(StoreError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn injected_part_failures_are_consumed() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        store.fail_part(1, 2);

        assert!(store.upload_part("b", "k", &id, 1, vec![1]).await.is_err());
        assert!(store.upload_part("b", "k", &id, 1, vec![1]).await.is_err());
        assert!(store.upload_part("b", "k", &id, 1, vec![1]).await.is_ok());
        assert_eq!(store.part_calls(), vec![1, 1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_part_never_reaches_store() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        store.stall_part(1);

        let stalled = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            store.upload_part("b", "k", &id, 1, vec![1]),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(store.upload_part_calls(), 0);

        // The stall is consumed.
        assert!(store.upload_part("b", "k", &id, 1, vec![1]).await.is_ok());
    }

    #[tokio::test]
    async fn corrupt_and_truncate() {
        let store = MemoryObjectStore::with_bucket("b");
        store.put_object("b", "k", vec![0, 1, 2, 3]).await.unwrap();
        store.corrupt_object("b", "k", 1);
        assert_eq!(store.object("b", "k").unwrap(), vec![0, 0xFE, 2, 3]);
        store.truncate_object("b", "k", 3);
        assert_eq!(store.object("b", "k").unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn reject_complete_is_one_shot() {
        let store = MemoryObjectStore::with_bucket("b");
        let id = store.open_multipart("b", "k").await.unwrap();
        let t = store.upload_part("b", "k", &id, 1, b"x".to_vec()).await.unwrap();
        store.reject_complete();

        let parts = vec![CompletedPart::new(1, t)];
        assert!(matches!(
            store.complete_multipart("b", "k", &id, &parts).await,
            Err(StoreError::Rejected(_))
        ));
        store.complete_multipart("b", "k", &id, &parts).await.unwrap();
        assert_eq!(store.complete_calls(), 2);
    }
}
