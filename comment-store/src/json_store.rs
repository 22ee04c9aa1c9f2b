use crate::{write_atomic, CommentSink};
use async_trait::async_trait;
use commentwatch_core::{CommentRecord, PersistenceError};
use std::path::PathBuf;
use tracing::debug;

/// Writes each post's comments to `<dir>/comments_<id>.json` as a
/// pretty-printed UTF-8 JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, resource_id: &str) -> PathBuf {
        let safe: String = resource_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("comments_{}.json", safe))
    }

    /// Reads back the last flushed snapshot for `resource_id`.
    pub async fn read(&self, resource_id: &str) -> Result<Vec<CommentRecord>, PersistenceError> {
        let path = self.path_for(resource_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PersistenceError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl CommentSink for JsonFileStore {
    async fn flush(
        &self,
        resource_id: &str,
        records: &[CommentRecord],
    ) -> Result<(), PersistenceError> {
        let encoded =
            serde_json::to_vec_pretty(records).map_err(|e| PersistenceError::EncodeFailed {
                resource_id: resource_id.to_string(),
                reason: e.to_string(),
            })?;

        let path = self.path_for(resource_id);
        write_atomic(&path, &encoded).await?;

        debug!(
            resource_id,
            records = records.len(),
            path = %path.display(),
            "Flushed comments"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> CommentRecord {
        CommentRecord::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_flush_writes_pretty_utf8_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let records = vec![record(json!({"pk": 1, "text": "Привет 👋"}))];

        store.flush("3141", &records).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("comments_3141.json")).unwrap();
        assert!(written.contains("Привет 👋"));
        assert!(written.starts_with("[\n  {"));
        assert_eq!(store.read("3141").await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_flush_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let first: Vec<_> = (0..3).map(|i| record(json!({ "pk": i }))).collect();
        store.flush("7", &first).await.unwrap();
        store.flush("7", &first[..1]).await.unwrap();

        assert_eq!(store.read("7").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reflush_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let records = vec![
            record(json!({"pk": "17", "text": "one", "user": {"username": "a"}})),
            record(json!({"pk": "18", "text": "two"})),
        ];

        store.flush("9", &records).await.unwrap();
        let before = std::fs::read(store.path_for("9")).unwrap();
        store.flush("9", &records).await.unwrap();
        let after = std::fs::read(store.path_for("9")).unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_empty_set_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.flush("0", &[]).await.unwrap();

        assert_eq!(std::fs::read_to_string(store.path_for("0")).unwrap(), "[]");
    }

    #[test]
    fn test_path_sanitizes_resource_id() {
        let store = JsonFileStore::new("/out");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/out/comments____etc_passwd.json")
        );
    }

    #[tokio::test]
    async fn test_unwritable_directory_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let store = JsonFileStore::new(&blocker);

        let err = store.flush("1", &[]).await.unwrap_err();
        assert!(matches!(err, PersistenceError::CreateDirFailed { .. }));
    }
}
