//! JSON file persistence, one file per user

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::backend::{
    persistence_error, validate_user_id, MemorySnapshot, PersistenceBackend, SNAPSHOT_VERSION,
};
use crate::error::Result;

/// Stores each user's snapshot as `<data_dir>/<user_id>.json`.
///
/// Writes go to a temporary file that is then renamed over the old one, so a
/// crash mid-save leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    data_dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Get the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File holding `user_id`'s snapshot.
    pub fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.data_dir.join(format!("{}.json", user_id)))
    }
}

#[async_trait]
impl PersistenceBackend for JsonFileBackend {
    async fn load(&self, user_id: &str) -> Result<Option<MemorySnapshot>> {
        let path = self.path_for(user_id)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(persistence_error(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let snapshot: MemorySnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            persistence_error(format!("failed to parse {}: {}", path.display(), e))
        })?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(persistence_error(format!(
                "{} has snapshot version {}, newest supported is {}",
                path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            )));
        }

        tracing::debug!(
            "Loaded snapshot for {} from {} ({} episodes)",
            user_id,
            path.display(),
            snapshot.episodes.len()
        );
        Ok(Some(snapshot))
    }

    async fn save(&self, user_id: &str, snapshot: &MemorySnapshot) -> Result<()> {
        let path = self.path_for(user_id)?;

        tokio::fs::create_dir_all(&self.data_dir).await.map_err(|e| {
            persistence_error(format!(
                "failed to create {}: {}",
                self.data_dir.display(),
                e
            ))
        })?;

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| persistence_error(format!("serialization failed: {}", e)))?;

        // Write a temp file unique to this save, then rename over the target
        let tmp_path = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| persistence_error(format!("failed to write {}: {}", tmp_path.display(), e)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| persistence_error(format!("failed to rename {}: {}", tmp_path.display(), e)))?;

        tracing::debug!("Saved snapshot for {} to {}", user_id, path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MnemosError;
    use crate::memory::LongTermProfile;
    use crate::session::Session;
    use tempfile::TempDir;

    fn snapshot(user_id: &str) -> MemorySnapshot {
        let session = Session::builder("Explain traits", "Traits are...")
            .id("s1")
            .build()
            .unwrap();
        MemorySnapshot::new(user_id, vec![session], LongTermProfile::default())
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("users"));

        backend.save("alice", &snapshot("alice")).await.unwrap();
        let loaded = backend.load("alice").await.unwrap().unwrap();

        assert_eq!(loaded.user_id, "alice");
        assert_eq!(loaded.episodes.len(), 1);
        assert!(dir.path().join("users/alice.json").exists());
        assert_eq!(std::fs::read_dir(dir.path().join("users")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_saves_leave_one_complete_file() {
        let dir = TempDir::new().unwrap();
        let backend = std::sync::Arc::new(JsonFileBackend::new(dir.path()));

        let saves: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                tokio::spawn(async move { backend.save("alice", &snapshot("alice")).await })
            })
            .collect();
        for save in saves {
            save.await.unwrap().unwrap();
        }

        assert_eq!(backend.load("alice").await.unwrap().unwrap().episodes.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path());

        assert!(backend.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_collaborator_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("alice.json"), b"{ not json").unwrap();
        let backend = JsonFileBackend::new(dir.path());

        let err = backend.load("alice").await.unwrap_err();
        assert!(err.is_collaborator_failure());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(dir.path());

        let err = backend.save("../escape", &snapshot("x")).await.unwrap_err();
        assert!(matches!(err, MnemosError::Validation(_)));
    }
}
