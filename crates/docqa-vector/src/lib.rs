//! docqa-vector
//!
//! Exact cosine search over L2-normalized chunk embeddings, plus a
//! content-addressed embedding cache so unchanged chunks are not re-embedded.
pub mod cache;
pub mod search;

pub use cache::{content_hash, EmbeddingCache};
pub use search::FlatVectorIndex;
