//! Embedding providers for similarity-based matching and retrieval.

pub mod providers;

pub use providers::{cosine_similarity, EmbeddingProvider, HashingEmbeddings};

pub mod prelude {
    pub use crate::embeddings::{EmbeddingProvider, HashingEmbeddings};
}
