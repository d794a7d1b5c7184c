use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::{Observation, ObservationKind, PatternMatcher};
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::error::{MnemosError, Result};
use crate::session::{Outcome, Session};

/// A principle described by example phrasings of the feedback that implies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub topic: String,
    pub principle: String,
    pub exemplars: Vec<String>,

    /// Only match sessions with this outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl Prototype {
    pub fn new(
        topic: impl Into<String>,
        principle: impl Into<String>,
        exemplars: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            principle: principle.into(),
            exemplars: exemplars.into_iter().map(Into::into).collect(),
            outcome: None,
        }
    }

    pub fn when_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// Built-in prototypes mirroring the default lexical rules.
pub fn default_prototypes() -> Vec<Prototype> {
    vec![
        Prototype::new(
            "response_length",
            "User prefers concise answers",
            [
                "too long",
                "way too long, make it shorter",
                "too verbose, be more concise",
                "get to the point",
            ],
        )
        .when_outcome(Outcome::Negative),
        Prototype::new(
            "response_length",
            "User prefers detailed answers",
            ["too short", "needs more detail", "too brief, explain more"],
        )
        .when_outcome(Outcome::Negative),
        Prototype::new(
            "tone",
            "User prefers a casual tone",
            ["too formal", "sounds robotic and stiff"],
        )
        .when_outcome(Outcome::Negative),
        Prototype::new(
            "tone",
            "User prefers a formal tone",
            ["too casual", "too informal and chatty"],
        )
        .when_outcome(Outcome::Negative),
        Prototype::new(
            "examples",
            "User values concrete examples",
            ["the examples helped", "thanks for the examples", "great example"],
        )
        .when_outcome(Outcome::Positive),
    ]
}

fn as_embedding_failure(err: MnemosError) -> MnemosError {
    if err.is_collaborator_failure() {
        err
    } else {
        MnemosError::unavailable("embedding", err.to_string())
    }
}

/// Matcher comparing session feedback to prototype phrases by cosine similarity.
///
/// At most one principle per topic is reported: the prototype with the highest
/// similarity at or above the threshold.
pub struct EmbeddingSimilarityMatcher {
    embedder: Arc<dyn EmbeddingProvider>,
    prototypes: Vec<Prototype>,
    threshold: f64,
    exemplar_vectors: OnceCell<Vec<Vec<Vec<f32>>>>,
}

impl EmbeddingSimilarityMatcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        prototypes: Vec<Prototype>,
        threshold: f64,
    ) -> Result<Self> {
        if let Some(bad) = prototypes
            .iter()
            .find(|p| p.exemplars.is_empty() || p.principle.trim().is_empty())
        {
            return Err(MnemosError::Configuration(format!(
                "prototype '{}' needs a principle and at least one exemplar",
                bad.principle
            )));
        }
        Ok(Self {
            embedder,
            prototypes,
            threshold,
            exemplar_vectors: OnceCell::new(),
        })
    }

    /// Exemplar embeddings, computed on first use.
    async fn exemplar_vectors(&self) -> Result<&Vec<Vec<Vec<f32>>>> {
        self.exemplar_vectors
            .get_or_try_init(|| async {
                let mut all = Vec::with_capacity(self.prototypes.len());
                for prototype in &self.prototypes {
                    let texts: Vec<&str> = prototype.exemplars.iter().map(String::as_str).collect();
                    let vectors = self
                        .embedder
                        .embed_batch(&texts)
                        .await
                        .map_err(as_embedding_failure)?;
                    all.push(vectors);
                }
                Ok(all)
            })
            .await
    }
}

#[async_trait]
impl PatternMatcher for EmbeddingSimilarityMatcher {
    async fn observe(&self, session: &Session) -> Result<Vec<Observation>> {
        if session.feedback.trim().is_empty() {
            return Ok(Vec::new());
        }

        let exemplar_vectors = self.exemplar_vectors().await?;
        let feedback = self
            .embedder
            .embed(&session.feedback)
            .await
            .map_err(as_embedding_failure)?;

        // topic -> (similarity, prototype index)
        let mut best: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for (idx, prototype) in self.prototypes.iter().enumerate() {
            if prototype.outcome.is_some_and(|required| required != session.outcome) {
                continue;
            }

            let similarity = exemplar_vectors[idx]
                .iter()
                .map(|v| cosine_similarity(&feedback, v))
                .fold(f64::MIN, f64::max);
            if similarity < self.threshold {
                continue;
            }

            let entry = best.entry(prototype.topic.as_str()).or_insert((similarity, idx));
            if similarity > entry.0 {
                *entry = (similarity, idx);
            }
        }

        let mut winners: Vec<(f64, usize)> = best.into_values().collect();
        winners.sort_by_key(|(_, idx)| *idx);

        Ok(winners
            .into_iter()
            .map(|(similarity, idx)| {
                let prototype = &self.prototypes[idx];
                Observation {
                    kind: ObservationKind::Pattern,
                    topic: prototype.topic.clone(),
                    statement: prototype.principle.clone(),
                    strength: similarity.clamp(0.0, 1.0),
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "embedding"
    }
}
