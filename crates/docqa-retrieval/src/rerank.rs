//! Second-pass relevance ordering.
//!
//! Every reranker returns a reordered, truncated subset of its input with
//! content and metadata untouched.
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use docqa_core::traits::{Embedder, Reranker};
use docqa_core::types::Chunk;

const QUERY_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on", "or",
    "the", "to", "was", "with", "what", "which", "who", "how", "me", "my", "about",
];

const SEMANTIC_BLEND: f32 = 0.7;
const COVERAGE_BLEND: f32 = 0.3;

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .filter(|t| !QUERY_STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Fraction of distinct query terms present in `content`.
pub fn term_coverage(query: &str, content: &str) -> f32 {
    let wanted: HashSet<String> = terms(query).into_iter().collect();
    if wanted.is_empty() {
        return 0.0;
    }
    let present: HashSet<String> = terms(content).into_iter().collect();
    wanted.iter().filter(|t| present.contains(*t)).count() as f32 / wanted.len() as f32
}

/// Sorts by score (desc), keeping the incoming order for equal scores, then truncates.
fn order_by_scores(candidates: Vec<Chunk>, scores: &[f32], top_n: usize) -> Vec<Chunk> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    let mut slots: Vec<Option<Chunk>> = candidates.into_iter().map(Some).collect();
    indexed.into_iter().take(top_n).filter_map(|(i, _)| slots[i].take()).collect()
}

/// The "model unavailable" fallback: the first `top_n` candidates as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughReranker;

impl Reranker for PassthroughReranker {
    fn rerank(&self, _query: &str, mut candidates: Vec<Chunk>, top_n: usize) -> Result<Vec<Chunk>> {
        candidates.truncate(top_n);
        Ok(candidates)
    }
}

/// Deterministic query-term coverage scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalReranker;

impl Reranker for LexicalReranker {
    fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_n: usize) -> Result<Vec<Chunk>> {
        let scores: Vec<f32> = candidates.iter().map(|c| term_coverage(query, &c.content)).collect();
        Ok(order_by_scores(candidates, &scores, top_n))
    }
}

/// Query/candidate cosine from the configured embedder, blended with term coverage.
///
/// If embedding fails the candidates come back in their incoming order.
pub struct EmbeddingReranker {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingReranker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    fn scores(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<f32>> {
        let mut inputs = Vec::with_capacity(candidates.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(candidates.iter().map(|c| c.content.clone()));
        let vectors = self.embedder.embed_batch(&inputs)?;
        if vectors.len() != inputs.len() {
            anyhow::bail!("embedding size mismatch: {} != {}", vectors.len(), inputs.len());
        }
        let q = &vectors[0];
        Ok(vectors[1..]
            .iter()
            .zip(candidates)
            .map(|(v, c)| {
                let cosine: f32 = q.iter().zip(v).map(|(a, b)| a * b).sum();
                SEMANTIC_BLEND * cosine + COVERAGE_BLEND * term_coverage(query, &c.content)
            })
            .collect())
    }
}

impl Reranker for EmbeddingReranker {
    fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_n: usize) -> Result<Vec<Chunk>> {
        if candidates.len() < 2 || query.trim().is_empty() {
            return PassthroughReranker.rerank(query, candidates, top_n);
        }
        match self.scores(query, &candidates) {
            Ok(scores) => Ok(order_by_scores(candidates, &scores, top_n)),
            Err(e) => {
                tracing::warn!("Embedding rerank unavailable, keeping retrieval order: {:#}", e);
                PassthroughReranker.rerank(query, candidates, top_n)
            }
        }
    }
}
