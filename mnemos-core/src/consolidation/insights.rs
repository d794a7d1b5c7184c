use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::confidence::ConfidenceCurve;
use crate::error::{MnemosError, Result};

fn default_topic() -> String {
    "general".to_string()
}

/// Normalized comparison key for principle and fact text.
pub(crate) fn text_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Append ids from `incoming` that `provenance` does not already hold.
fn union_provenance(provenance: &mut Vec<String>, incoming: Vec<String>) {
    for id in incoming {
        if !provenance.contains(&id) {
            provenance.push(id);
        }
    }
}

fn dedup_provenance(provenance: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(provenance.len());
    union_provenance(&mut out, provenance);
    out
}

fn check_confidence(confidence: f64, what: &str) -> Result<()> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(MnemosError::validation(format!(
            "{} confidence must be within [0, 1], got {}",
            what, confidence
        )));
    }
    Ok(())
}

/// A generalized principle learned from one or more sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Human-readable principle, e.g. "User prefers concise answers"
    pub principle: String,

    /// Scenario family; principles sharing a topic can contradict each other
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    /// Number of independent sessions supporting the principle
    #[serde(default)]
    pub evidence_count: usize,

    /// Ids of the sessions that produced the principle, oldest first
    #[serde(default)]
    pub provenance: Vec<String>,

    /// Timestamp of the most recent supporting session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evidence_at: Option<DateTime<Utc>>,
}

impl Pattern {
    /// Create a pattern whose evidence count is its provenance length.
    pub fn new(
        principle: impl Into<String>,
        topic: impl Into<String>,
        confidence: f64,
        provenance: Vec<String>,
    ) -> Result<Self> {
        let provenance = dedup_provenance(provenance);
        let pattern = Self {
            principle: principle.into(),
            topic: topic.into(),
            confidence,
            evidence_count: provenance.len(),
            provenance,
            last_evidence_at: None,
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Set the most recent evidence timestamp.
    pub fn with_last_evidence_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_evidence_at = Some(at);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.principle.trim().is_empty() {
            return Err(MnemosError::validation("pattern principle must not be empty"));
        }
        if self.topic.trim().is_empty() {
            return Err(MnemosError::validation(format!(
                "pattern '{}' has an empty topic",
                self.principle
            )));
        }
        check_confidence(self.confidence, "pattern")
    }

    /// Comparison key: principle text with case and spacing normalized.
    pub fn key(&self) -> String {
        text_key(&self.principle)
    }

    /// Whether both patterns cite at least one common session.
    pub fn overlaps(&self, other: &Pattern) -> bool {
        self.provenance.iter().any(|id| other.provenance.contains(id))
    }

    /// Sessions counted in `evidence_count` that have no id in `provenance`.
    fn untracked_evidence(&self) -> usize {
        self.evidence_count.saturating_sub(self.provenance.len())
    }

    /// Repair counts after deserialization and enforce the evidence floor.
    pub fn normalized(mut self, curve: &ConfidenceCurve) -> Self {
        self.provenance = dedup_provenance(std::mem::take(&mut self.provenance));
        self.evidence_count = self.evidence_count.max(self.provenance.len());
        self.confidence = curve.cap(self.confidence, self.evidence_count);
        self
    }

    /// Fold another observation of the same principle into this one.
    ///
    /// Provenance is unioned, so absorbing a pattern whose sessions are
    /// already known leaves the counts unchanged. Evidence counted without
    /// session ids is kept on top of the union, taking the larger side.
    pub fn absorb(&mut self, other: Pattern, curve: &ConfidenceCurve) {
        let untracked = self.untracked_evidence().max(other.untracked_evidence());
        let other_confidence = other.confidence;

        union_provenance(&mut self.provenance, other.provenance);
        self.evidence_count = self.provenance.len() + untracked;

        let merged = self
            .confidence
            .max(other_confidence)
            .max(curve.score(self.evidence_count));
        self.confidence = curve.cap(merged, self.evidence_count);

        self.last_evidence_at = match (self.last_evidence_at, other.last_evidence_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// An atomic statement believed to be true about the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub statement: String,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    #[serde(default)]
    pub provenance: Vec<String>,
}

impl Fact {
    pub fn new(statement: impl Into<String>, confidence: f64, provenance: Vec<String>) -> Result<Self> {
        let fact = Self {
            statement: statement.into(),
            confidence,
            provenance: dedup_provenance(provenance),
        };
        fact.validate()?;
        Ok(fact)
    }

    pub fn validate(&self) -> Result<()> {
        if self.statement.trim().is_empty() {
            return Err(MnemosError::validation("fact statement must not be empty"));
        }
        check_confidence(self.confidence, "fact")
    }

    pub fn key(&self) -> String {
        text_key(&self.statement)
    }

    pub fn absorb(&mut self, other: Fact) {
        self.confidence = self.confidence.max(other.confidence);
        union_provenance(&mut self.provenance, other.provenance);
    }
}

/// Output of consolidating a single session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    /// Patterns that already clear the evidence floor on their own
    pub patterns: Vec<Pattern>,

    /// Single-session observations, confidence capped below the reporting threshold
    pub candidates: Vec<Pattern>,

    /// Extracted facts
    pub facts: Vec<Fact>,

    /// Set when a collaborator failed and no insight could be computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

impl Insights {
    /// An explicitly empty result carrying the reason consolidation could not run.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    /// True when nothing was learned.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.candidates.is_empty() && self.facts.is_empty()
    }
}

/// Result of asking the reasoning provider why an outcome occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reflection {
    Available { analysis: String },
    Unavailable { reason: String },
}

impl Reflection {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    pub fn analysis(&self) -> Option<&str> {
        match self {
            Self::Available { analysis } => Some(analysis),
            Self::Unavailable { .. } => None,
        }
    }
}
