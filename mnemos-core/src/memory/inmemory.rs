//! In-memory backend for testing and lightweight deployments
//!
//! Snapshots live in a map for the lifetime of the backend. Sharing one backend
//! between two memory systems simulates a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{validate_user_id, MemorySnapshot, PersistenceBackend};
use crate::error::Result;

/// In-memory backend for testing and lightweight use
#[derive(Default)]
pub struct InMemoryBackend {
    snapshots: RwLock<HashMap<String, MemorySnapshot>>,
    saves: AtomicUsize,
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all saved snapshots
    pub async fn clear(&self) {
        self.snapshots.write().await.clear();
    }

    /// Number of users with a saved snapshot
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }

    /// Total successful saves, across all users
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    async fn load(&self, user_id: &str) -> Result<Option<MemorySnapshot>> {
        validate_user_id(user_id)?;
        Ok(self.snapshots.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, snapshot: &MemorySnapshot) -> Result<()> {
        validate_user_id(user_id)?;
        self.snapshots
            .write()
            .await
            .insert(user_id.to_string(), snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
