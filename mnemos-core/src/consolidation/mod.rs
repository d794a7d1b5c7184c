//! Consolidation of sessions into long-term knowledge.
//!
//! The engine reads sessions, asks a [`PatternMatcher`] what each one says about
//! the user, and aggregates the answers into principles whose confidence grows
//! with independent evidence. Reflection is delegated to an injected reasoning
//! provider.

pub mod confidence;
pub mod config;
pub mod engine;
pub mod insights;
pub mod matcher;

pub use confidence::ConfidenceCurve;
pub use config::ConsolidationConfig;
pub use engine::ConsolidationEngine;
pub use insights::{Fact, Insights, Pattern, Reflection};
pub use matcher::{
    EmbeddingSimilarityMatcher, LexicalRule, LexicalRuleMatcher, MatcherConfig, MatcherStrategy,
    Observation, ObservationKind, PatternMatcher, PatternMatcherFactory, Prototype, SessionField,
};

// Re-export reasoning types from top-level llm module
pub use crate::llm::{LLMProvider, ReasoningContext};

pub mod prelude {
    pub use crate::consolidation::{
        ConsolidationConfig, ConsolidationEngine, Fact, Insights, LLMProvider, Pattern,
        PatternMatcher, Reflection,
    };
}
