//! Per-user memory tiers: working, episodic and long-term
//!
//! A [`MemorySystem`] owns one user's state behind a single async read/write
//! lock. Writes are serialized; reads run concurrently and never observe a
//! half-applied merge. Collaborator calls (embedding, reasoning, persistence)
//! are made with no lock held: state is copied out under a read lock, the
//! collaborator runs, and a write lock is taken only to apply the result.

pub mod backend;
pub mod file;
pub mod inmemory;
pub mod long_term;
pub mod retrieval;
pub mod working;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::consolidation::{ConfidenceCurve, ConsolidationEngine, Insights, Pattern, Reflection};
use crate::error::{MnemosError, Result};
use crate::session::Session;

pub use backend::{validate_user_id, MemorySnapshot, PersistenceBackend, SNAPSHOT_VERSION};
pub use file::JsonFileBackend;
pub use inmemory::InMemoryBackend;
pub use long_term::{LongTermProfile, LongTermUpdate, MemoryCategory, MergeStats};
pub use retrieval::{
    EmbeddingScorer, LexicalOverlapScorer, RelevanceScorer, RetrievedContext, ScoredFact,
    ScoredPattern,
};
pub use working::WorkingMemory;

use backend::persistence_error;
use retrieval::{pattern_text, rank_facts, rank_patterns};

/// Lifecycle of a memory system's persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStatus {
    /// No state loaded from or saved to a backend yet
    Created,
    /// Changed since the last load or save
    Active,
    /// In sync with the backend
    Persisted,
}

struct MemoryState {
    working: WorkingMemory,
    episodes: Vec<Session>,
    long_term: LongTermProfile,
    /// Bumped on every persisted-tier change
    revision: u64,
    /// Revision last loaded or saved, if any
    saved_revision: Option<u64>,
}

impl MemoryState {
    fn fresh() -> Self {
        Self {
            working: WorkingMemory::new(),
            episodes: Vec::new(),
            long_term: LongTermProfile::new(),
            revision: 0,
            saved_revision: None,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision.unwrap_or(0)
    }
}

/// Result of [`MemorySystem::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub session_id: String,

    /// What consolidation produced; `insights.unavailable` is set when the
    /// matcher's collaborator failed
    pub insights: Insights,

    /// Present when the engine has a reasoner and reflection is enabled
    pub reflection: Option<Reflection>,

    pub merged: MergeStats,
}

/// Result count used by [`MemorySystem::retrieve_default`] unless configured.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Builder for [`MemorySystem`]
pub struct MemorySystemBuilder {
    user_id: String,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    backend: Option<Arc<dyn PersistenceBackend>>,
    curve: ConfidenceCurve,
    default_max_results: usize,
}

impl MemorySystemBuilder {
    /// Relevance scorer for retrieval (default: lexical overlap)
    pub fn scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn PersistenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Confidence curve used when merging patterns into long-term memory
    pub fn curve(mut self, curve: ConfidenceCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Result count for [`MemorySystem::retrieve_default`] (default: 5)
    pub fn default_max_results(mut self, max_results: usize) -> Self {
        self.default_max_results = max_results;
        self
    }

    /// Build with empty tiers, without touching the backend.
    pub fn build(self) -> Result<MemorySystem> {
        validate_user_id(&self.user_id)?;
        Ok(self.into_system(MemoryState::fresh()))
    }

    /// Build and restore the user's saved state from the backend, if any.
    pub async fn open(self) -> Result<MemorySystem> {
        validate_user_id(&self.user_id)?;

        let Some(backend) = self.backend.clone() else {
            return Ok(self.into_system(MemoryState::fresh()));
        };

        let loaded = backend
            .load(&self.user_id)
            .await
            .map_err(as_persistence_error)?;

        let state = match loaded {
            Some(snapshot) => {
                let state = restore(&self.user_id, snapshot, &self.curve)?;
                tracing::info!(
                    "Loaded memory for {} from {} backend ({} episodes, {} patterns)",
                    self.user_id,
                    backend.name(),
                    state.episodes.len(),
                    state.long_term.patterns.len()
                );
                state
            }
            None => {
                tracing::debug!("No saved memory for {}, starting fresh", self.user_id);
                MemoryState::fresh()
            }
        };

        Ok(self.into_system(state))
    }

    fn into_system(self, state: MemoryState) -> MemorySystem {
        MemorySystem {
            user_id: self.user_id,
            state: RwLock::new(state),
            scorer: self
                .scorer
                .unwrap_or_else(|| Arc::new(LexicalOverlapScorer::new())),
            backend: self.backend,
            save_lock: Mutex::new(()),
            curve: self.curve,
            default_max_results: self.default_max_results,
        }
    }
}

fn as_persistence_error(err: MnemosError) -> MnemosError {
    match err {
        MnemosError::Validation(_) | MnemosError::CollaboratorUnavailable { .. } => err,
        other => persistence_error(other),
    }
}

fn restore(user_id: &str, snapshot: MemorySnapshot, curve: &ConfidenceCurve) -> Result<MemoryState> {
    if snapshot.user_id != user_id {
        return Err(MnemosError::validation(format!(
            "snapshot belongs to '{}', not '{}'",
            snapshot.user_id, user_id
        )));
    }
    for episode in &snapshot.episodes {
        episode.validate()?;
    }

    Ok(MemoryState {
        working: WorkingMemory::new(),
        episodes: snapshot.episodes,
        long_term: snapshot.long_term.normalized(curve),
        revision: 0,
        saved_revision: Some(0),
    })
}

/// Memory for a single user.
///
/// # Example
///
/// ```rust,ignore
/// use mnemos_core::prelude::*;
///
/// let memory = MemorySystem::new("alice")?;
/// let engine = ConsolidationEngine::with_lexical_defaults()?;
///
/// memory.ingest(session, &engine).await?;
/// let context = memory.retrieve("How should I respond?", 5).await?;
/// ```
pub struct MemorySystem {
    user_id: String,
    state: RwLock<MemoryState>,
    scorer: Arc<dyn RelevanceScorer>,
    backend: Option<Arc<dyn PersistenceBackend>>,
    /// Orders saves; never taken by tier readers or writers
    save_lock: Mutex<()>,
    curve: ConfidenceCurve,
    default_max_results: usize,
}

impl MemorySystem {
    /// Fresh, unpersisted memory with lexical retrieval.
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        Self::builder(user_id).build()
    }

    pub fn builder(user_id: impl Into<String>) -> MemorySystemBuilder {
        MemorySystemBuilder {
            user_id: user_id.into(),
            scorer: None,
            backend: None,
            curve: ConfidenceCurve::default(),
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Restore `user_id`'s memory from `backend`, or start fresh if nothing is saved.
    pub async fn load(user_id: impl Into<String>, backend: Arc<dyn PersistenceBackend>) -> Result<Self> {
        Self::builder(user_id).backend(backend).open().await
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn curve(&self) -> &ConfidenceCurve {
        &self.curve
    }

    /// Append a session to the episodic log.
    pub async fn store_session(&self, session: Session) -> Result<()> {
        session.validate()?;

        let mut state = self.state.write().await;
        tracing::debug!("Storing session {} for {}", session.id, self.user_id);
        state.episodes.push(session);
        state.touch();
        Ok(())
    }

    /// Merge untyped data into a long-term category.
    ///
    /// `category` is one of `profile` (or `user_profile`), `patterns` or
    /// `facts`; `data` is one record or an array of records.
    ///
    /// # Errors
    ///
    /// `InvalidCategory` for an unknown category and `Validation` for data of
    /// the wrong shape. Nothing is applied on error.
    pub async fn update_long_term(&self, category: &str, data: Value) -> Result<()> {
        let update = LongTermUpdate::from_json(category, data)?;
        self.merge_long_term(update).await.map(|_| ())
    }

    /// Merge a typed update into long-term memory as one atomic step.
    pub async fn merge_long_term(&self, update: LongTermUpdate) -> Result<MergeStats> {
        update.validate()?;
        let category = update.category();

        let mut state = self.state.write().await;
        let stats = state.long_term.apply(update, &self.curve);
        if stats.total() > 0 {
            state.touch();
        }

        tracing::debug!(
            "Merged {} update for {}: {} added, {} merged",
            category,
            self.user_id,
            stats.added,
            stats.merged
        );
        Ok(stats)
    }

    /// Assemble context relevant to `query`.
    ///
    /// Patterns and facts are ranked by the configured scorer; episodes are
    /// the most recent `max_results` sessions, oldest first. With
    /// `max_results == 0` only the profile is returned. Read-only.
    ///
    /// If the scorer fails, ranking falls back to lexical overlap and
    /// [`RetrievedContext::degraded`] is set.
    pub async fn retrieve(&self, query: &str, max_results: usize) -> Result<RetrievedContext> {
        if query.trim().is_empty() {
            return Err(MnemosError::validation("query must not be empty"));
        }

        let (profile, patterns, facts, episodes) = {
            let state = self.state.read().await;
            let profile = state.long_term.profile.clone();
            if max_results == 0 {
                return Ok(RetrievedContext {
                    profile,
                    ..RetrievedContext::default()
                });
            }
            let start = state.episodes.len().saturating_sub(max_results);
            (
                profile,
                state.long_term.patterns.clone(),
                state.long_term.facts.clone(),
                state.episodes[start..].to_vec(),
            )
        };

        let candidates: Vec<String> = patterns
            .iter()
            .map(pattern_text)
            .chain(facts.iter().map(|f| f.statement.clone()))
            .collect();

        let mut degraded = false;
        let scores = match self.scorer.score(query, &candidates).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                tracing::warn!(
                    "{} scorer returned {} scores for {} candidates, falling back to lexical ranking",
                    self.scorer.name(),
                    scores.len(),
                    candidates.len()
                );
                degraded = true;
                LexicalOverlapScorer.score_sync(query, &candidates)
            }
            Err(e) => {
                tracing::warn!(
                    "{} scorer failed, falling back to lexical ranking: {}",
                    self.scorer.name(),
                    e
                );
                degraded = true;
                LexicalOverlapScorer.score_sync(query, &candidates)
            }
        };

        let (pattern_scores, fact_scores) = scores.split_at(patterns.len());

        Ok(RetrievedContext {
            profile,
            patterns: rank_patterns(&patterns, pattern_scores, max_results),
            facts: rank_facts(&facts, fact_scores, max_results),
            episodes,
            degraded,
        })
    }

    /// [`retrieve`](Self::retrieve) with the configured default result count.
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievedContext> {
        self.retrieve(query, self.default_max_results).await
    }

    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    /// Consolidate a session and record it.
    ///
    /// Consolidation and reflection run without holding the lock; the session
    /// is then appended and the insights merged in one write. A failing
    /// matcher collaborator does not lose the session: it is stored and the
    /// report carries [`Insights::unavailable`].
    pub async fn ingest(&self, session: Session, engine: &ConsolidationEngine) -> Result<IngestReport> {
        session.validate()?;

        let insights = match engine.consolidate(&session).await {
            Ok(insights) => insights,
            Err(e) if e.is_collaborator_failure() => {
                tracing::warn!("Insights unavailable for session {}: {}", session.id, e);
                Insights::unavailable(e.to_string())
            }
            Err(e) => return Err(e),
        };

        let reflection = if engine.config().reflect_on_ingest && engine.has_reasoner() {
            Some(engine.reflect(&session).await?)
        } else {
            None
        };

        let updates: Vec<LongTermUpdate> = insights.clone().into();
        let session_id = session.id.clone();

        let mut merged = MergeStats::default();
        {
            let mut state = self.state.write().await;
            state.episodes.push(session);
            for update in updates {
                merged += state.long_term.apply(update, &self.curve);
            }
            state.touch();
        }

        tracing::debug!(
            "Ingested session {} for {}: {} long-term records touched",
            session_id,
            self.user_id,
            merged.total()
        );

        Ok(IngestReport {
            session_id,
            insights,
            reflection,
            merged,
        })
    }

    /// Re-extract patterns from the whole episodic log and merge the
    /// corroborated ones into long-term memory.
    ///
    /// Returns the extracted patterns. Running it twice changes nothing the
    /// second time.
    pub async fn consolidate_episodes(&self, engine: &ConsolidationEngine) -> Result<Vec<Pattern>> {
        let episodes = self.state.read().await.episodes.clone();

        let patterns = engine.extract_patterns(&episodes).await?;

        if !patterns.is_empty() {
            let mut state = self.state.write().await;
            let stats = state.long_term.merge_patterns(patterns.clone(), &self.curve);
            state.touch();
            tracing::info!(
                "Consolidated {} episodes for {}: {} patterns added, {} merged",
                episodes.len(),
                self.user_id,
                stats.added,
                stats.merged
            );
        }

        Ok(patterns)
    }

    /// Put a value in working memory, returning the one it replaced.
    pub async fn remember_working(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.write().await.working.set(key, value)
    }

    pub async fn working_value(&self, key: &str) -> Option<Value> {
        self.state.read().await.working.get(key).cloned()
    }

    /// End the current session: working memory is cleared, the other tiers are kept.
    pub async fn end_session(&self) {
        let mut state = self.state.write().await;
        tracing::debug!(
            "Ending session for {}, dropping {} working entries",
            self.user_id,
            state.working.len()
        );
        state.working.clear();
    }

    /// Save the episodic and long-term tiers to the backend.
    ///
    /// # Errors
    ///
    /// `Configuration` if no backend is set; `CollaboratorUnavailable` if the
    /// save fails, in which case in-memory state is untouched.
    ///
    /// Concurrent calls save one at a time, each snapshotting after the
    /// previous save finished, so the backend always ends up with the newest
    /// state that was persisted.
    pub async fn persist(&self) -> Result<()> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            MnemosError::Configuration("no persistence backend configured".to_string())
        })?;

        let _saving = self.save_lock.lock().await;

        let (snapshot, revision) = {
            let state = self.state.read().await;
            (
                MemorySnapshot::new(
                    self.user_id.clone(),
                    state.episodes.clone(),
                    state.long_term.clone(),
                ),
                state.revision,
            )
        };

        if let Err(e) = backend.save(&self.user_id, &snapshot).await {
            let err = as_persistence_error(e);
            tracing::warn!("Failed to persist memory for {}: {}", self.user_id, err);
            return Err(err);
        }

        let mut state = self.state.write().await;
        state.saved_revision = Some(revision);

        tracing::info!(
            "Persisted memory for {} to {} backend ({} episodes)",
            self.user_id,
            backend.name(),
            snapshot.episodes.len()
        );
        Ok(())
    }

    /// Whether there are changes not yet saved.
    pub async fn is_dirty(&self) -> bool {
        self.state.read().await.is_dirty()
    }

    pub async fn status(&self) -> MemoryStatus {
        let state = self.state.read().await;
        match state.saved_revision {
            None if state.revision == 0 => MemoryStatus::Created,
            Some(saved) if saved == state.revision => MemoryStatus::Persisted,
            _ => MemoryStatus::Active,
        }
    }

    /// Copy of the episodic log, oldest first.
    pub async fn episodes(&self) -> Vec<Session> {
        self.state.read().await.episodes.clone()
    }

    pub async fn episode_count(&self) -> usize {
        self.state.read().await.episodes.len()
    }

    /// Copy of long-term memory.
    pub async fn long_term(&self) -> LongTermProfile {
        self.state.read().await.long_term.clone()
    }

    /// Current persistable state.
    pub async fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.read().await;
        MemorySnapshot::new(
            self.user_id.clone(),
            state.episodes.clone(),
            state.long_term.clone(),
        )
    }
}
