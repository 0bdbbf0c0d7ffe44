//! Durable Sink
//!
//! At-least-once, crash-safe persistence of records grouped by topic, with
//! asynchronous migration from a local buffer to the object store.
//!
//! ## Data path
//!
//! ```text
//! write(topic, bytes)
//!     └─ append + fsync  <bufferDir>/<topic>/current.jsonl      (ack here)
//! rotation (every 60 s)
//!     └─ rename current.jsonl → batch_<ts>_<uuid>.jsonl
//! upload (background task)
//!     └─ put raw/<topic>/<YYYY-MM-DD>/<HH>/<basename>, then delete local
//! ```
//!
//! A record is acknowledged only after its bytes are on stable storage; a
//! batch file is deleted only after its upload succeeded. Anything left
//! behind by a crash between rotation and upload is picked up by the
//! startup scan and re-uploaded.
//!
//! ## Locking
//!
//! One mutex guards the active-file map and every operation on the current
//! files (append, fsync, the rotation rename). Uploads never hold it, so
//! slow object-store calls cannot stall acknowledgements.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use facthouse_core::Topic;
use facthouse_observability::metrics::{
    INGESTION_FSYNC_DURATION_SECONDS, SINK_UPLOADS_TOTAL,
};
use facthouse_storage::BlobStore;

/// The live append-target within a topic directory. Never uploaded as-is.
const ACTIVE_FILE: &str = "current.jsonl";

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("buffer i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Root of the local buffer; one sub-directory per topic.
    pub buffer_dir: PathBuf,
    /// How often active files are rotated into immutable batches.
    pub rotate_interval: Duration,
}

impl SinkConfig {
    pub fn new(buffer_dir: impl Into<PathBuf>) -> Self {
        Self {
            buffer_dir: buffer_dir.into(),
            rotate_interval: Duration::from_secs(60),
        }
    }
}

pub struct DurableSink {
    inner: Arc<SinkInner>,
    rotation: Mutex<Option<JoinHandle<()>>>,
}

struct SinkInner {
    buffer_dir: PathBuf,
    store: Arc<dyn BlobStore>,
    /// Open append handles for each topic's `current.jsonl`.
    active: Mutex<HashMap<String, fs::File>>,
    cancel: CancellationToken,
}

impl DurableSink {
    /// Create the buffer directory, recover any batches a previous process
    /// left behind, and start the rotation loop.
    pub fn new(config: SinkConfig, store: Arc<dyn BlobStore>) -> Result<Self> {
        std::fs::create_dir_all(&config.buffer_dir)?;

        let inner = Arc::new(SinkInner {
            buffer_dir: config.buffer_dir,
            store,
            active: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });

        let scan = inner.clone();
        tokio::spawn(async move { scan.startup_scan().await });

        let rotate = inner.clone();
        let interval = config.rotate_interval;
        let rotation = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // interval() fires immediately; the first real rotation should
            // happen one full interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = rotate.cancel.cancelled() => break,
                    _ = ticker.tick() => rotate.rotate_all().await,
                }
            }
        });

        Ok(Self {
            inner,
            rotation: Mutex::new(Some(rotation)),
        })
    }

    /// Append `data` plus a newline to the topic's active buffer and flush
    /// to stable storage. Returns only after the fsync succeeded; on any
    /// error the record is unacknowledged.
    pub async fn write(&self, topic: Topic, data: &[u8]) -> Result<()> {
        let mut active = self.inner.active.lock().await;

        let file = match active.entry(topic.as_str().to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let topic_dir = self.inner.buffer_dir.join(topic.as_str());
                fs::create_dir_all(&topic_dir).await?;
                let file = fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(topic_dir.join(ACTIVE_FILE))
                    .await?;
                entry.insert(file)
            }
        };

        // One buffer per record so a line can never be fragmented.
        let mut line = Vec::with_capacity(data.len() + 1);
        line.extend_from_slice(data);
        line.push(b'\n');
        file.write_all(&line).await?;

        let sync_start = Instant::now();
        file.sync_all().await?;
        INGESTION_FSYNC_DURATION_SECONDS
            .with_label_values(&[topic.as_str()])
            .observe(sync_start.elapsed().as_secs_f64());

        Ok(())
    }

    /// Rotate every topic's active buffer immediately instead of waiting
    /// for the next tick. Uploads still run in the background.
    pub async fn rotate_now(&self) {
        self.inner.rotate_all().await;
    }

    /// Cancel background work and release all open buffer files.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.rotation.lock().await.take() {
            let _ = handle.await;
        }
        self.inner.active.lock().await.clear();
    }
}

impl SinkInner {
    async fn rotate_all(self: &Arc<Self>) {
        let topics: Vec<String> = self.active.lock().await.keys().cloned().collect();
        for topic in topics {
            self.rotate_topic(&topic).await;
        }
    }

    /// Close and rename the topic's active file, then schedule its upload.
    /// The rename happens under the sink mutex; the upload does not.
    async fn rotate_topic(self: &Arc<Self>, topic: &str) {
        let batch_path = {
            let mut active = self.active.lock().await;
            let Some(file) = active.remove(topic) else {
                return;
            };
            drop(file);

            let topic_dir = self.buffer_dir.join(topic);
            let current = topic_dir.join(ACTIVE_FILE);

            match fs::metadata(&current).await {
                Ok(meta) if meta.len() == 0 => None,
                Ok(_) => {
                    let batch_name = format!(
                        "batch_{}_{}.jsonl",
                        Utc::now().format("%Y%m%d%H%M%S"),
                        Uuid::new_v4()
                    );
                    let batch = topic_dir.join(batch_name);
                    match fs::rename(&current, &batch).await {
                        Ok(()) => Some(batch),
                        Err(err) => {
                            // Data stays in the active file; nothing lost.
                            warn!(topic, error = %err, "rotation rename failed");
                            None
                        }
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => {
                    warn!(topic, error = %err, "could not stat active buffer");
                    None
                }
            }
        };

        if let Some(path) = batch_path {
            let uploader = self.clone();
            let topic = topic.to_string();
            tokio::spawn(async move {
                uploader.upload_batch(&topic, &path, Utc::now()).await;
            });
        }
    }

    /// Stream a rotated batch to the object store. The local file is
    /// removed only after the upload succeeded; on failure it stays in
    /// place for the next startup scan.
    async fn upload_batch(&self, topic: &str, path: &Path, at: DateTime<Utc>) {
        let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(?path, "batch file has no usable name, skipping");
            return;
        };
        let key = format!(
            "raw/{}/{}/{}/{}",
            topic,
            at.format("%Y-%m-%d"),
            at.format("%H"),
            basename
        );

        let data = match fs::read(path).await {
            Ok(data) => Bytes::from(data),
            Err(err) => {
                warn!(?path, error = %err, "could not read batch file for upload");
                return;
            }
        };

        match self.store.put(&key, data).await {
            Ok(()) => {
                SINK_UPLOADS_TOTAL
                    .with_label_values(&[topic, "success"])
                    .inc();
                if let Err(err) = fs::remove_file(path).await {
                    warn!(?path, error = %err, "uploaded batch but failed to remove local file");
                }
                info!(?path, key = %key, "uploaded batch");
            }
            Err(err) => {
                SINK_UPLOADS_TOTAL
                    .with_label_values(&[topic, "failure"])
                    .inc();
                warn!(?path, key = %key, error = %err, "upload failed, batch preserved for retry");
            }
        }
    }

    /// Upload every `batch_*.jsonl` a previous process rotated but never
    /// uploaded. The file's mtime stands in for the upload wall clock it
    /// never got.
    async fn startup_scan(&self) {
        let mut topic_dirs = match fs::read_dir(&self.buffer_dir).await {
            Ok(dirs) => dirs,
            Err(err) => {
                warn!(error = %err, "startup scan could not read buffer dir");
                return;
            }
        };

        loop {
            let entry = match topic_dirs.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "startup scan error");
                    return;
                }
            };
            if !entry.path().is_dir() {
                continue;
            }
            let topic = entry.file_name().to_string_lossy().to_string();
            self.scan_topic_dir(&topic, &entry.path()).await;
        }
    }

    async fn scan_topic_dir(&self, topic: &str, dir: &Path) {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(topic, error = %err, "startup scan could not read topic dir");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(topic, error = %err, "startup scan error");
                    return;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("batch_") || !name.ends_with(".jsonl") {
                continue;
            }

            let modified = entry
                .metadata()
                .await
                .and_then(|meta| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            debug!(topic, file = %name, "found orphaned batch file");
            self.upload_batch(topic, &entry.path(), modified).await;
        }
    }
}
