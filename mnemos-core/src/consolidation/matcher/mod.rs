//! Pluggable strategies that turn a session into observations.
//!
//! A matcher looks at one session at a time and reports what it noticed: a
//! candidate principle ("User prefers concise answers") or a fact ("User's
//! name is Ada"). The engine aggregates observations across sessions; matchers
//! never see more than one session.

use std::borrow::Cow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::Session;

pub mod embedding;
pub mod factory;
pub mod lexical;

pub use embedding::{EmbeddingSimilarityMatcher, Prototype};
pub use factory::PatternMatcherFactory;
pub use lexical::{LexicalRule, LexicalRuleMatcher};

/// What kind of knowledge an observation proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    #[default]
    Pattern,
    Fact,
}

/// Something a matcher noticed in a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,

    /// Scenario family the statement belongs to
    pub topic: String,

    /// Principle or fact text
    pub statement: String,

    /// Match strength (0.0-1.0)
    pub strength: f64,
}

/// Which part of a session a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionField {
    #[default]
    Feedback,
    UserUtterance,
    AgentResponse,
    Any,
}

impl SessionField {
    pub fn text<'a>(&self, session: &'a Session) -> Cow<'a, str> {
        match self {
            Self::Feedback => Cow::Borrowed(&session.feedback),
            Self::UserUtterance => Cow::Borrowed(&session.user_utterance),
            Self::AgentResponse => Cow::Borrowed(&session.agent_response),
            Self::Any => Cow::Owned(session.text()),
        }
    }
}

/// Core trait for pattern matching strategies.
///
/// Implementations must be deterministic: the same session always yields the
/// same observations in the same order.
#[async_trait]
pub trait PatternMatcher: Send + Sync {
    /// Report observations for a single, already validated session.
    async fn observe(&self, session: &Session) -> Result<Vec<Observation>>;

    /// Short strategy name for logging.
    fn name(&self) -> &str;
}

/// Strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatcherStrategy {
    /// Regex rules over session text
    #[default]
    Lexical,
    /// Cosine similarity against prototype phrases
    Embedding,
}

/// Configuration for pattern matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default)]
    pub strategy: MatcherStrategy,

    /// Rules used by the lexical strategy
    #[serde(default = "lexical::default_rules")]
    pub rules: Vec<LexicalRule>,

    /// Prototypes used by the embedding strategy
    #[serde(default = "embedding::default_prototypes")]
    pub prototypes: Vec<Prototype>,

    /// Minimum cosine similarity for the embedding strategy (default: 0.6)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    0.6
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            strategy: MatcherStrategy::Lexical,
            rules: lexical::default_rules(),
            prototypes: embedding::default_prototypes(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl MatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: MatcherStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the lexical rule set.
    pub fn with_rules(mut self, rules: Vec<LexicalRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the embedding prototypes.
    pub fn with_prototypes(mut self, prototypes: Vec<Prototype>) -> Self {
        self.prototypes = prototypes;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(-1.0, 1.0);
        self
    }
}
