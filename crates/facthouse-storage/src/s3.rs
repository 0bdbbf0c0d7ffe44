//! S3-compatible backend (AWS S3, MinIO).
//!
//! Built on `object_store`'s AWS implementation with path-style addressing
//! so MinIO endpoints work out of the box. Every operation runs under the
//! retry policy from `retry`; "not found" is terminal and surfaces as
//! `StorageError::NotFound` without retrying.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::{BlobStore, ByteStream};

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

pub struct S3Store {
    store: AmazonS3,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl S3Store {
    /// Connect to an S3-compatible endpoint. The cancellation token stops
    /// in-flight retry loops when the process shuts down.
    pub fn new(config: S3Config, cancel: CancellationToken) -> Result<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint)
            .with_region(config.region)
            .with_bucket_name(config.bucket)
            .with_access_key_id(config.access_key)
            .with_secret_access_key(config.secret_key)
            // MinIO requires path-style requests and usually plain HTTP in
            // local deployments.
            .with_virtual_hosted_style_request(false)
            .with_allow_http(true)
            .build()?;

        Ok(Self {
            store,
            policy: RetryPolicy::default(),
            cancel,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn object_path(&self, key: &str) -> Result<ObjectPath> {
        ObjectPath::parse(key).map_err(|err| StorageError::invalid_key(key, err.to_string()))
    }
}

fn map_backend_error(key: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
        other => StorageError::Backend(other),
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(key)?;
        retry_with_backoff(&self.policy, &self.cancel, "put", || {
            let payload = data.clone();
            let path = path.clone();
            async move {
                self.store
                    .put(&path, payload.into())
                    .await
                    .map(|_| ())
                    .map_err(|err| map_backend_error(key, err))
            }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let path = self.object_path(key)?;
        let result = retry_with_backoff(&self.policy, &self.cancel, "get", || {
            let path = path.clone();
            async move {
                self.store
                    .get(&path)
                    .await
                    .map_err(|err| map_backend_error(key, err))
            }
        })
        .await?;

        let owned_key = key.to_string();
        let stream = result
            .into_stream()
            .map(move |chunk| chunk.map_err(|err| map_backend_error(&owned_key, err)));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        let outcome = retry_with_backoff(&self.policy, &self.cancel, "delete", || {
            let path = path.clone();
            async move {
                self.store
                    .delete(&path)
                    .await
                    .map_err(|err| map_backend_error(key, err))
            }
        })
        .await;

        match outcome {
            Ok(()) => Ok(()),
            // Idempotent: the object is gone either way.
            Err(StorageError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        retry_with_backoff(&self.policy, &self.cancel, "exists", || {
            let path = path.clone();
            async move {
                match self.store.head(&path).await {
                    Ok(_) => Ok(true),
                    // Absence is an answer, not a retryable failure.
                    Err(object_store::Error::NotFound { .. }) => Ok(false),
                    Err(err) => Err(StorageError::Backend(err)),
                }
            }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = self.object_path(prefix)?;
        retry_with_backoff(&self.policy, &self.cancel, "list", || {
            let path = path.clone();
            async move {
                let metas: Vec<_> = self
                    .store
                    .list(Some(&path))
                    .try_collect()
                    .await
                    .map_err(|err| map_backend_error(prefix, err))?;
                Ok(metas
                    .into_iter()
                    .map(|meta| meta.location.to_string())
                    .collect())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            bucket: "facthouse-test".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
        }
    }

    #[test]
    fn builds_against_minio_style_config() {
        let store = S3Store::new(config(), CancellationToken::new());
        assert!(store.is_ok());
    }

    #[test]
    fn key_parsing() {
        let store = S3Store::new(config(), CancellationToken::new()).unwrap();
        assert!(store.object_path("raw/topic/2025-01-15/10/batch.jsonl").is_ok());

        // Traversal and empty segments are invalid keys, not backend errors.
        for key in ["raw/../escape", "raw//double"] {
            let err = store.object_path(key).unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey { .. }), "key {:?}", key);
        }
    }
}
