//! Relevance scoring and ranking for retrieval

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consolidation::{Fact, Pattern};
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::error::{MnemosError, Result};
use crate::session::Session;
use crate::text::token_set;

/// Scores candidate texts against a query.
///
/// Must return exactly one score per candidate, in candidate order. Higher is
/// more relevant; scores are expected in `[0, 1]`.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>>;

    /// Short scorer name for logging.
    fn name(&self) -> &str;
}

/// Fraction of the query's terms that appear in the candidate.
///
/// Both sides are tokenized with stop words removed. A query made only of stop
/// words scores every candidate zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOverlapScorer;

impl LexicalOverlapScorer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous scoring, shared with the fallback path.
    pub fn score_sync(&self, query: &str, candidates: &[String]) -> Vec<f64> {
        let query_terms = token_set(query);
        if query_terms.is_empty() {
            return vec![0.0; candidates.len()];
        }

        candidates
            .iter()
            .map(|candidate| {
                let terms = token_set(candidate);
                let hits = query_terms.iter().filter(|t| terms.contains(*t)).count();
                hits as f64 / query_terms.len() as f64
            })
            .collect()
    }
}

#[async_trait]
impl RelevanceScorer for LexicalOverlapScorer {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>> {
        Ok(self.score_sync(query, candidates))
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// Cosine similarity between query and candidate embeddings.
pub struct EmbeddingScorer {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let as_unavailable = |e: MnemosError| {
            if e.is_collaborator_failure() {
                e
            } else {
                MnemosError::unavailable("embedding", e.to_string())
            }
        };

        let query_vector = self.embedder.embed(query).await.map_err(as_unavailable)?;
        let texts: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(as_unavailable)?;

        Ok(vectors
            .iter()
            .map(|v| cosine_similarity(&query_vector, v).max(0.0))
            .collect())
    }

    fn name(&self) -> &str {
        "embedding"
    }
}

/// A pattern with its relevance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPattern {
    pub pattern: Pattern,
    pub score: f64,
}

/// A fact with its relevance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFact {
    pub fact: Fact,
    pub score: f64,
}

/// Context assembled for a new interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub profile: BTreeMap<String, Value>,

    /// Most relevant patterns first
    pub patterns: Vec<ScoredPattern>,

    /// Most relevant facts first
    pub facts: Vec<ScoredFact>,

    /// Most recent sessions, oldest first
    pub episodes: Vec<Session>,

    /// Set when the configured scorer failed and lexical ranking was used instead
    #[serde(default)]
    pub degraded: bool,
}

impl RetrievedContext {
    /// Principles in rank order.
    pub fn principles(&self) -> Vec<&str> {
        self.patterns
            .iter()
            .map(|p| p.pattern.principle.as_str())
            .collect()
    }
}

/// Text a pattern is scored on: the principle plus its topic words.
pub(crate) fn pattern_text(pattern: &Pattern) -> String {
    format!("{} {}", pattern.principle, pattern.topic.replace('_', " "))
}

fn by_score(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Rank patterns: score, then confidence, evidence and recency, all descending.
pub(crate) fn rank_patterns(patterns: &[Pattern], scores: &[f64], limit: usize) -> Vec<ScoredPattern> {
    let mut ranked: Vec<ScoredPattern> = patterns
        .iter()
        .zip(scores)
        .map(|(pattern, &score)| ScoredPattern {
            pattern: pattern.clone(),
            score: sanitize(score),
        })
        .collect();

    ranked.sort_by(|a, b| {
        by_score(a.score, b.score)
            .then_with(|| by_score(a.pattern.confidence, b.pattern.confidence))
            .then_with(|| b.pattern.evidence_count.cmp(&a.pattern.evidence_count))
            .then_with(|| b.pattern.last_evidence_at.cmp(&a.pattern.last_evidence_at))
            .then_with(|| a.pattern.principle.cmp(&b.pattern.principle))
    });
    ranked.truncate(limit);
    ranked
}

/// Rank facts: score, then confidence and corroboration, all descending.
pub(crate) fn rank_facts(facts: &[Fact], scores: &[f64], limit: usize) -> Vec<ScoredFact> {
    let mut ranked: Vec<ScoredFact> = facts
        .iter()
        .zip(scores)
        .map(|(fact, &score)| ScoredFact {
            fact: fact.clone(),
            score: sanitize(score),
        })
        .collect();

    ranked.sort_by(|a, b| {
        by_score(a.score, b.score)
            .then_with(|| by_score(a.fact.confidence, b.fact.confidence))
            .then_with(|| b.fact.provenance.len().cmp(&a.fact.provenance.len()))
            .then_with(|| a.fact.statement.cmp(&b.fact.statement))
    });
    ranked.truncate(limit);
    ranked
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
