use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::{Chunk, SourceInfo};

/// Lazy sequence of text fragments produced by a streaming completion.
pub type TextStream = BoxStream<'static, anyhow::Result<String>>;

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Returns one L2-normalized vector of length `dim()` per input text.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Shared chunk collection with hybrid search over it.
///
/// Reads may run concurrently; `add` and `remove_by_source` are serialized by
/// the implementation and must leave both indices consistent.
pub trait DocumentStore: Send + Sync {
    /// Inserts (or replaces, by `chunk_id`) the given chunks. Returns the number stored.
    fn add(&self, chunks: Vec<Chunk>) -> anyhow::Result<usize>;
    /// Removes every chunk whose `source` or `file_name` equals `identifier`.
    fn remove_by_source(&self, identifier: &str) -> anyhow::Result<usize>;
    /// Best-first candidates, at most `k`.
    fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<Chunk>>;
    /// Every indexed file, sorted by source.
    fn sources(&self) -> Vec<SourceInfo>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Second-pass relevance ordering over an already retrieved candidate set.
///
/// Output is a reordered, truncated subset of `candidates` with content and
/// metadata untouched; `len <= min(top_n, candidates.len())`.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_n: usize) -> anyhow::Result<Vec<Chunk>>;
}

/// Streaming chat completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> anyhow::Result<TextStream>;
}

/// Translation-only view of a language model, used by query classification.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate_to_english(&self, text: &str) -> anyhow::Result<String>;
}

/// Turns files into chunks carrying the required provenance metadata.
pub trait DocumentProcessor: Send + Sync {
    fn process(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Chunk>>;
}
