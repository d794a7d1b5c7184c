//! Configuration types for Mnemos

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::consolidation::{ConsolidationConfig, ConsolidationEngine, MatcherConfig, PatternMatcherFactory};
use crate::embeddings::EmbeddingProvider;
use crate::error::{MnemosError, Result};
use crate::llm::{LLMProvider, RetryConfig};
use crate::memory::{
    DEFAULT_MAX_RESULTS, EmbeddingScorer, InMemoryBackend, JsonFileBackend, LexicalOverlapScorer,
    MemorySystem, PersistenceBackend, RelevanceScorer,
};

/// Backend behind every `storage.type = "memory"` configuration in this process.
static PROCESS_MEMORY_BACKEND: Lazy<Arc<InMemoryBackend>> =
    Lazy::new(|| Arc::new(InMemoryBackend::new()));

/// Main configuration for Mnemos
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MnemosConfig {
    /// Thresholds for pattern extraction
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    /// Pattern matching strategy
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Retrieval ranking
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reasoning provider usage
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Where memory is persisted
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Relevance scorer selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Query term overlap
    #[default]
    Lexical,
    /// Cosine similarity through the embedding provider
    Embedding,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub scorer: ScorerKind,

    /// Result count callers use when they have no preference (default: 5)
    pub default_max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::Lexical,
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl RetrievalConfig {
    pub fn with_scorer(mut self, scorer: ScorerKind) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_default_max_results(mut self, max_results: usize) -> Self {
        self.default_max_results = max_results;
        self
    }
}

/// Reasoning provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Attach the reasoning provider to the engine when one is supplied
    pub enabled: bool,

    /// Retry policy for reasoning calls
    pub retry: RetryConfig,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: RetryConfig::default(),
        }
    }
}

impl ReasoningConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Persistence backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Shared by every configuration in the process, lost on exit
    #[default]
    Memory,
    /// One JSON file per user
    File {
        /// Directory holding `<user_id>.json` files
        data_dir: PathBuf,
    },
}

impl StorageConfig {
    /// Build the configured backend.
    ///
    /// `Memory` always yields the same process-wide backend, so memory
    /// persisted through one opened system can be reopened by the next.
    pub fn build_backend(&self) -> Arc<dyn PersistenceBackend> {
        match self {
            Self::Memory => Arc::<InMemoryBackend>::clone(&PROCESS_MEMORY_BACKEND),
            Self::File { data_dir } => Arc::new(JsonFileBackend::new(data_dir.clone())),
        }
    }
}

impl MnemosConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Loads in this order, later layers overriding earlier ones:
    /// 1. Default configuration
    /// 2. `mnemos.toml` in the working directory
    /// 3. The file named by `MNEMOS_CONFIG_PATH`
    /// 4. `MNEMOS_*` environment variables, nested with `__`
    ///    (e.g. `MNEMOS_CONSOLIDATION__MIN_EVIDENCE=3`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or a value is out of range.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Toml},
        };

        let mut figment = Figment::new().merge(Toml::file("mnemos.toml"));

        // Check for custom config path
        if let Ok(path) = std::env::var("MNEMOS_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("MNEMOS_").split("__"));

        let config: MnemosConfig = figment.extract().map_err(|e| {
            MnemosError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let config: MnemosConfig = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                MnemosError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a threshold or retry setting is out of range.
    pub fn validate(&self) -> Result<()> {
        self.consolidation.validate()?;

        if !(-1.0..=1.0).contains(&self.matcher.similarity_threshold) {
            return Err(MnemosError::Configuration(format!(
                "matcher.similarity_threshold must be within [-1, 1], got {}",
                self.matcher.similarity_threshold
            )));
        }
        if self.reasoning.retry.max_attempts == 0 {
            return Err(MnemosError::Configuration(
                "reasoning.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reasoning.retry.backoff_multiplier < 1.0 {
            return Err(MnemosError::Configuration(format!(
                "reasoning.retry.backoff_multiplier must be at least 1.0, got {}",
                self.reasoning.retry.backoff_multiplier
            )));
        }
        if self.retrieval.default_max_results == 0 {
            return Err(MnemosError::Configuration(
                "retrieval.default_max_results must be at least 1".to_string(),
            ));
        }
        if let StorageConfig::File { data_dir } = &self.storage {
            if data_dir.as_os_str().is_empty() {
                return Err(MnemosError::Configuration(
                    "storage.data_dir must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Wire a consolidation engine from this configuration.
    ///
    /// `embedder` is required by the embedding matcher; `reasoner` is attached
    /// when reasoning is enabled.
    pub fn build_engine(
        &self,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        reasoner: Option<Arc<dyn LLMProvider>>,
    ) -> Result<ConsolidationEngine> {
        self.validate()?;

        let matcher = PatternMatcherFactory::create(&self.matcher, embedder)?;
        let mut engine = ConsolidationEngine::new(matcher, self.consolidation.clone())
            .with_retry(self.reasoning.retry.clone());

        match reasoner {
            Some(llm) if self.reasoning.enabled => {
                tracing::debug!("Reasoning enabled with {} provider", llm.model_info().provider);
                engine = engine.with_reasoner(llm);
            }
            Some(_) => tracing::debug!("Reasoning provider supplied but disabled by configuration"),
            None => {}
        }

        Ok(engine)
    }

    /// Build the configured relevance scorer.
    pub fn build_scorer(
        &self,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Arc<dyn RelevanceScorer>> {
        match self.retrieval.scorer {
            ScorerKind::Lexical => Ok(Arc::new(LexicalOverlapScorer::new())),
            ScorerKind::Embedding => {
                let embedder = embedder.ok_or_else(|| {
                    MnemosError::Configuration(
                        "embedding scorer requires an embedding provider".to_string(),
                    )
                })?;
                Ok(Arc::new(EmbeddingScorer::new(embedder)))
            }
        }
    }

    /// Open `user_id`'s memory with the configured scorer, curve and backend.
    pub async fn open_memory(
        &self,
        user_id: impl Into<String>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<MemorySystem> {
        self.validate()?;

        MemorySystem::builder(user_id)
            .scorer(self.build_scorer(embedder)?)
            .curve(self.consolidation.curve())
            .default_max_results(self.retrieval.default_max_results)
            .backend(self.storage.build_backend())
            .open()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::MatcherStrategy;
    use crate::embeddings::HashingEmbeddings;
    use crate::llm::StubLLMProvider;
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let config = MnemosConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.retrieval.default_max_results, 5);
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "mnemos.toml",
                r#"
                [consolidation]
                min_evidence = 3

                [matcher]
                strategy = "embedding"

                [storage]
                type = "file"
                data_dir = "./data/users"

                [reasoning.retry]
                initial_delay = "250ms"
                "#,
            )?;
            jail.set_env("MNEMOS_RETRIEVAL__DEFAULT_MAX_RESULTS", "8");
            jail.set_env("MNEMOS_CONSOLIDATION__BASE_RATE", "0.5");

            let config = MnemosConfig::load().expect("config should load");

            assert_eq!(config.consolidation.min_evidence, 3);
            assert_eq!(config.consolidation.base_rate, 0.5);
            assert_eq!(config.consolidation.min_confidence, 0.3);
            assert_eq!(config.matcher.strategy, MatcherStrategy::Embedding);
            assert!(!config.matcher.rules.is_empty());
            assert_eq!(config.retrieval.default_max_results, 8);
            assert_eq!(
                config.storage,
                StorageConfig::File {
                    data_dir: PathBuf::from("./data/users")
                }
            );
            assert_eq!(config.reasoning.retry.initial_delay, Duration::from_millis(250));
            assert_eq!(config.reasoning.retry.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_custom_config_path() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[retrieval]\nscorer = \"embedding\"\n")?;
            jail.set_env("MNEMOS_CONFIG_PATH", "custom.toml");

            let config = MnemosConfig::load().expect("config should load");
            assert_eq!(config.retrieval.scorer, ScorerKind::Embedding);
            Ok(())
        });
    }

    #[test]
    fn test_out_of_range_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("mnemos.toml", "[consolidation]\nmin_confidence = 1.5\n")?;

            let result = MnemosConfig::load();
            assert!(matches!(result, Err(MnemosError::Configuration(_))));
            Ok(())
        });
    }

    #[test]
    fn test_from_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("other.toml", "[reasoning]\nenabled = false\n")?;

            let config = MnemosConfig::from_file("other.toml").expect("config should load");
            assert!(!config.reasoning.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_build_engine() {
        let config = MnemosConfig::default();
        let engine = config
            .build_engine(None, Some(Arc::new(StubLLMProvider)))
            .unwrap();
        assert!(engine.has_reasoner());

        let mut disabled = MnemosConfig::default();
        disabled.reasoning = ReasoningConfig::default().with_enabled(false);
        let engine = disabled
            .build_engine(None, Some(Arc::new(StubLLMProvider)))
            .unwrap();
        assert!(!engine.has_reasoner());
    }

    #[test]
    fn test_embedding_strategy_needs_embedder() {
        let mut config = MnemosConfig::default();
        config.matcher = MatcherConfig::new().with_strategy(MatcherStrategy::Embedding);

        assert!(config.build_engine(None, None).is_err());
        assert!(config
            .build_engine(Some(Arc::new(HashingEmbeddings::default())), None)
            .is_ok());
    }

    #[tokio::test]
    async fn test_open_memory() {
        let config = MnemosConfig {
            retrieval: RetrievalConfig::default().with_scorer(ScorerKind::Embedding),
            ..MnemosConfig::default()
        };

        assert!(config.open_memory("alice", None).await.is_err());

        let memory = config
            .open_memory("alice", Some(Arc::new(HashingEmbeddings::default())))
            .await
            .unwrap();
        assert_eq!(memory.user_id(), "alice");
    }

    #[tokio::test]
    async fn test_open_memory_applies_default_max_results() {
        let config = MnemosConfig {
            retrieval: RetrievalConfig::default().with_default_max_results(2),
            ..MnemosConfig::default()
        };

        let memory = config.open_memory("config-max-results", None).await.unwrap();
        assert_eq!(memory.default_max_results(), 2);

        let zero = MnemosConfig {
            retrieval: RetrievalConfig::default().with_default_max_results(0),
            ..MnemosConfig::default()
        };
        assert!(matches!(zero.validate(), Err(MnemosError::Configuration(_))));
    }

    #[test]
    fn test_memory_storage_shares_one_backend() {
        let a = StorageConfig::Memory.build_backend();
        let b = StorageConfig::default().build_backend();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
