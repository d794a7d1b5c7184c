//! Factory for creating pattern matchers from configuration

use std::sync::Arc;

use super::{
    EmbeddingSimilarityMatcher, LexicalRuleMatcher, MatcherConfig, MatcherStrategy, PatternMatcher,
};
use crate::embeddings::EmbeddingProvider;
use crate::error::{MnemosError, Result};

/// Factory for creating pattern matchers
pub struct PatternMatcherFactory;

impl PatternMatcherFactory {
    /// Create a pattern matcher from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Matcher configuration
    /// * `embedder` - Embedding provider, required by the embedding strategy
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a rule or prototype is invalid, or if
    /// the embedding strategy is selected without an embedder.
    pub fn create(
        config: &MatcherConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Arc<dyn PatternMatcher>> {
        match config.strategy {
            MatcherStrategy::Lexical => {
                let matcher = LexicalRuleMatcher::new(config.rules.clone())?;
                tracing::debug!("Created lexical matcher with {} rules", matcher.rule_count());
                Ok(Arc::new(matcher))
            }
            MatcherStrategy::Embedding => {
                let embedder = embedder.ok_or_else(|| {
                    MnemosError::Configuration(
                        "embedding matcher requires an embedding provider".to_string(),
                    )
                })?;
                let matcher = EmbeddingSimilarityMatcher::new(
                    embedder,
                    config.prototypes.clone(),
                    config.similarity_threshold,
                )?;
                tracing::debug!(
                    "Created embedding matcher with {} prototypes",
                    config.prototypes.len()
                );
                Ok(Arc::new(matcher))
            }
        }
    }
}
