//! Persistence backend trait for pluggable storage implementations
//!
//! A backend stores one [`MemorySnapshot`] per user. The memory system decides
//! when to load and save; backends only move snapshots in and out of storage.
//! Implementations:
//!
//! - [`InMemoryBackend`](super::InMemoryBackend) for tests
//! - [`JsonFileBackend`](super::JsonFileBackend), one JSON file per user

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::long_term::LongTermProfile;
use crate::error::{MnemosError, Result};
use crate::session::Session;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Longest accepted user id.
const MAX_USER_ID_LEN: usize = 128;

/// Persisted state for one user: the episodic log and long-term memory.
///
/// Working memory is never part of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub user_id: String,
    #[serde(default)]
    pub episodes: Vec<Session>,
    #[serde(default)]
    pub long_term: LongTermProfile,
    pub saved_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl MemorySnapshot {
    pub fn new(user_id: impl Into<String>, episodes: Vec<Session>, long_term: LongTermProfile) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            user_id: user_id.into(),
            episodes,
            long_term,
            saved_at: Utc::now(),
        }
    }
}

/// Check that a user id is safe to use as a storage key.
///
/// Ids are limited to ASCII letters, digits, `_`, `.` and `-`, and may not
/// consist of dots only.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
        return Err(MnemosError::validation(format!(
            "user id must be 1-{} characters",
            MAX_USER_ID_LEN
        )));
    }
    if let Some(bad) = user_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(MnemosError::validation(format!(
            "user id '{}' contains invalid character '{}'",
            user_id, bad
        )));
    }
    if user_id.chars().all(|c| c == '.') {
        return Err(MnemosError::validation(format!(
            "user id '{}' is not allowed",
            user_id
        )));
    }
    Ok(())
}

/// Wrap a backend failure as a persistence collaborator error.
pub(crate) fn persistence_error(err: impl std::fmt::Display) -> MnemosError {
    MnemosError::unavailable("persistence", err.to_string())
}

/// The core persistence backend trait
///
/// Implementors provide storage of per-user snapshots. Calls may be slow; the
/// memory system never holds a tier lock while one is in flight.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Load the last saved snapshot, or `None` if the user has none
    async fn load(&self, user_id: &str) -> Result<Option<MemorySnapshot>>;

    /// Replace the user's saved snapshot
    async fn save(&self, user_id: &str, snapshot: &MemorySnapshot) -> Result<()>;

    /// Short backend name for logging
    fn name(&self) -> &str;
}
