//! Local-filesystem backend.
//!
//! Keys map to files under a configured base directory. Every key passes
//! `sanitize_key` before touching the filesystem: absolute keys and `..`
//! components are rejected, and the resolved path must stay strictly
//! within the base directory. Writes are synced to stable storage before
//! `put` returns, matching the durability the S3 backend provides.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::error::{Result, StorageError};
use crate::store::{BlobStore, ByteStream};

pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create (if needed) and root the store at `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(base_dir.as_ref())?;
        let base_dir = base_dir.as_ref().canonicalize()?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a key to an absolute path, rejecting anything that would
    /// escape the base directory.
    fn sanitize_key(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "empty key"));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(StorageError::invalid_key(key, "path traversal not allowed"))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::invalid_key(key, "absolute keys not allowed"))
                }
            }
        }
        let full = self.base_dir.join(relative);
        if !full.starts_with(&self.base_dir) {
            return Err(StorageError::invalid_key(
                key,
                "resolves outside base directory",
            ));
        }
        Ok(full)
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.sanitize_key(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ByteStream> {
        let path = self.sanitize_key(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let stream = ReaderStream::new(file).map_err(StorageError::Io);
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.sanitize_key(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.sanitize_key(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.sanitize_key(prefix)?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(&self.base_dir)
                    .map_err(|_| StorageError::invalid_key(prefix, "escaped base directory"))?;
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(keys)
    }
}
