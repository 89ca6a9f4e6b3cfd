//! Remote object-store collaborator.
//!
//! The upload engine talks to storage only through [`ObjectStore`], which
//! is passed in explicitly by the caller. Two backends ship here:
//! [`MemoryObjectStore`] (with fault injection, for tests) and
//! [`DirObjectStore`] (a local directory laid out like a bucket store).

mod dir;
mod error;
mod memory;

use std::future::Future;
use std::pin::Pin;

use blobsend_protocol::CompletedPart;
use tokio::io::AsyncRead;

pub use dir::DirObjectStore;
pub use error::StoreError;
pub use memory::MemoryObjectStore;

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Byte stream of a stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Primitives required from the remote store.
///
/// Using a trait keeps the upload engine decoupled from any particular
/// backend and testable with mocks.
pub trait ObjectStore: Send + Sync {
    /// Opens a multipart session and returns its identifier.
    fn open_multipart<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, String>;

    /// Uploads one part and returns the store's acknowledgment token.
    fn upload_part<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        session_id: &'a str,
        part_number: u32,
        data: Vec<u8>,
    ) -> StoreFuture<'a, String>;

    /// Concatenates `parts` (sorted by part number) into the final object.
    fn complete_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        session_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, ()>;

    /// Discards every part uploaded for `session_id`.
    fn abort_multipart<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        session_id: &'a str,
    ) -> StoreFuture<'a, ()>;

    /// Stores `data` as the object in a single request.
    fn put_object<'a>(&'a self, bucket: &'a str, key: &'a str, data: Vec<u8>)
    -> StoreFuture<'a, ()>;

    /// Returns the stored object's length in bytes.
    fn head_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, u64>;

    /// Opens the stored object for streaming reads.
    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StoreFuture<'a, ObjectReader>;
}
