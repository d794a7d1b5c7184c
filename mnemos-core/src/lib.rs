//! # Mnemos - Memory engineering for AI agents
//!
//! Mnemos gives an agent three memory tiers per user and a consolidation
//! engine that turns raw interactions into reusable knowledge:
//! - **Working memory**: a scratchpad cleared at the end of each session
//! - **Episodic memory**: an append-only log of recorded sessions
//! - **Long-term memory**: profile attributes, learned patterns and facts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mnemos_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let memory = MemorySystem::new("alice")?;
//!     let engine = ConsolidationEngine::with_lexical_defaults()?;
//!
//!     for _ in 0..2 {
//!         let session = Session::builder("Explain async Rust", "Async Rust is...")
//!             .feedback("too long")
//!             .outcome(Outcome::Negative)
//!             .build()?;
//!         memory.ingest(session, &engine).await?;
//!     }
//!
//!     let context = memory.retrieve("How should I respond?", 5).await?;
//!     for scored in &context.patterns {
//!         println!("{} ({:.2})", scored.pattern.principle, scored.pattern.confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Consolidation**: pluggable pattern matchers (regex rules or embedding
//!   similarity) feed an evidence-weighted confidence curve
//! - **Retrieval**: injectable relevance scoring with lexical fallback
//! - **Collaborators**: reasoning, embedding and persistence are traits;
//!   their failures degrade results instead of corrupting memory
//! - **Configuration**: layered TOML and environment loading via figment

pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod memory;
pub mod session;
pub mod text;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{MnemosConfig, ReasoningConfig, RetrievalConfig, ScorerKind, StorageConfig};
    pub use crate::consolidation::{
        ConfidenceCurve, ConsolidationConfig, ConsolidationEngine, Fact, Insights, LexicalRule,
        LexicalRuleMatcher, MatcherConfig, MatcherStrategy, Pattern, PatternMatcher,
        PatternMatcherFactory, Reflection,
    };
    pub use crate::embeddings::{EmbeddingProvider, HashingEmbeddings};
    pub use crate::error::{MnemosError, Result};
    pub use crate::llm::{LLMProvider, ReasoningContext, RetryConfig};
    pub use crate::memory::{
        IngestReport, InMemoryBackend, JsonFileBackend, LexicalOverlapScorer, LongTermProfile,
        LongTermUpdate, MemoryCategory, MemorySnapshot, MemorySystem, PersistenceBackend,
        RelevanceScorer, RetrievedContext,
    };
    pub use crate::session::{Outcome, Session};
}
