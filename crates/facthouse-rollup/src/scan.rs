//! Line-oriented streaming over raw JSONL blobs.

use futures::{StreamExt, TryStreamExt};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::warn;

use facthouse_storage::BlobStore;

/// Generous per-line ceiling; records are far smaller, so anything longer
/// is corruption.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Feed every line of a JSONL blob to `handle`. An oversized or
/// undecodable line abandons the remainder of that blob with a warning;
/// the caller's run continues with the next blob.
pub async fn for_each_line<F>(
    store: &dyn BlobStore,
    key: &str,
    mut handle: F,
) -> facthouse_storage::Result<()>
where
    F: FnMut(&str),
{
    let stream = store.get(key).await?;
    let reader = StreamReader::new(stream.map_err(std::io::Error::other));
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    while let Some(next) = lines.next().await {
        match next {
            Ok(line) => {
                if !line.is_empty() {
                    handle(&line);
                }
            }
            Err(err) => {
                warn!(key, error = %err, "stopping scan of blob");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use facthouse_storage::LocalStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn yields_each_non_empty_line() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        store
            .put("blob.jsonl", Bytes::from("a\n\nb\nc"))
            .await
            .unwrap();

        let mut lines = Vec::new();
        for_each_line(&store, "blob.jsonl", |line| lines.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn missing_blob_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        let result = for_each_line(&store, "missing.jsonl", |_| {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn oversized_line_stops_the_blob_but_keeps_earlier_lines() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        let mut data = b"first\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES + 10));
        data.extend(b"\nlast\n");
        store.put("blob.jsonl", Bytes::from(data)).await.unwrap();

        let mut lines = Vec::new();
        for_each_line(&store, "blob.jsonl", |line| lines.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(lines, vec!["first"]);
    }
}
