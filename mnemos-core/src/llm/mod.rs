//! Reasoning collaborator interface
//!
//! Mnemos never talks to a model API directly. Callers inject an [`LLMProvider`]
//! and the consolidation engine uses it only for reflection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MnemosError, Result};

pub mod retry;

pub use retry::{with_retry, RetryConfig, RetryError};

/// Structured context passed alongside a reasoning prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningContext {
    pub entries: BTreeMap<String, String>,
}

impl ReasoningContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// Trait for reasoning provider implementations.
///
/// Implementors handle the actual model call (hosted API, local model, rules).
/// Latency is unbounded and failures may be transient; callers wrap calls in
/// [`with_retry`] and treat a final failure as "no reflection this round".
/// Dropping the returned future cancels the request.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate text for `prompt` given structured `context`.
    async fn generate(&self, prompt: &str, context: &ReasoningContext) -> Result<String>;

    /// Get model information
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "unknown".to_string(),
            model_name: "unknown".to_string(),
        }
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
}

/// Placeholder provider that always reports itself unavailable.
pub struct StubLLMProvider;

#[async_trait]
impl LLMProvider for StubLLMProvider {
    async fn generate(&self, _prompt: &str, _context: &ReasoningContext) -> Result<String> {
        Err(MnemosError::unavailable(
            "reasoning",
            "LLM provider not configured. Implement the LLMProvider trait for your model",
        ))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "stub".to_string(),
            model_name: "none".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_context() {
        let context = ReasoningContext::new()
            .with("session_id", "s-1")
            .with("outcome", "negative");

        assert_eq!(context.get("outcome"), Some("negative"));
        assert_eq!(context.get("missing"), None);
    }

    #[tokio::test]
    async fn test_stub_provider_is_unavailable() {
        let provider = StubLLMProvider;
        let err = provider
            .generate("why?", &ReasoningContext::new())
            .await
            .unwrap_err();

        assert!(err.is_collaborator_failure());
        assert_eq!(provider.model_info().provider, "stub");
    }
}
