//! The `BlobStore` trait: the five operations the pipeline needs from any
//! flat keyed object store.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::error::Result;

/// A stream of object bytes, chunked at the backend's discretion.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload with replace semantics. Implementations take the payload by
    /// value so they can safely re-send it on retry.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Stream an object's contents. Fails with `StorageError::NotFound`
    /// if the key is absent.
    async fn get(&self, key: &str) -> Result<ByteStream>;

    /// Remove an object. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether the key currently exists. Absence is `Ok(false)`, not an
    /// error; only genuine backend failures surface as `Err`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// All keys under a prefix, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Convenience: fetch a whole object into memory.
    async fn get_bytes(&self, key: &str) -> Result<Bytes> {
        let mut stream = self.get(key).await?;
        let mut buf = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }
}
