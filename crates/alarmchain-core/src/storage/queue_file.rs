use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::data_dir;
use crate::error::PersistenceError;
use crate::queue::{QueueState, QueueStore};

const FILE_NAME: &str = "queue_state.json";

/// Queue snapshot stored as a JSON file.
///
/// Writes go to a sibling temp file first and are renamed over the
/// snapshot, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/queue_state.json`.
    pub fn in_data_dir() -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::DataDir(e.to_string()))?;
        Ok(Self::new(dir.join(FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn save(&self, state: &QueueState) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(
            path = %self.path.display(),
            registered = state.registered_identifiers.len(),
            "queue snapshot saved"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<QueueState>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::new(dir.path().join(FILE_NAME));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::new(dir.path().join("nested").join(FILE_NAME));

        let state = QueueState {
            registered_identifiers: ["a-once-0".to_string(), "a-mon-3".to_string()].into(),
            version: 7,
            last_sync_timestamp: Some(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()),
        };
        store.save(&QueueState::default()).await.unwrap();
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(state));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(&path, b"{ not json").unwrap();
        let store = FileQueueStore::new(path);
        assert!(matches!(
            store.load().await,
            Err(PersistenceError::Encode(_))
        ));
    }
}
