//! docqa-hybrid
//!
//! The chunk store plus its two indices, kept consistent behind one writer.
//!
//! Readers clone an `Arc<Snapshot>` and search it without holding any lock.
//! Writers (`add`, `remove_by_source`) are serialized by `write_lock`, build a
//! complete new snapshot (chunk map, vector rows, freshly built BM25 index)
//! and publish it with a single pointer swap. A failed lexical rebuild leaves
//! the previous snapshot in place.
use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use docqa_core::config::{HybridSettings, RetrievalSettings};
use docqa_core::error::Error;
use docqa_core::metrics::MetricsCollector;
use docqa_core::traits::{DocumentStore, Embedder};
use docqa_core::types::{Chunk, ChunkId, SourceInfo};
use docqa_text::LexicalIndex;
use docqa_vector::{EmbeddingCache, FlatVectorIndex};

pub mod fusion;

use fusion::weighted_rrf;

const EMBED_CACHE_CAPACITY: usize = 50_000;
const EMBED_BATCH_SIZE: usize = 32;

type LexicalBuilder = fn(&HashMap<ChunkId, Chunk>) -> Result<LexicalIndex>;

struct Snapshot {
    chunks: HashMap<ChunkId, Chunk>,
    vectors: FlatVectorIndex,
    lexical: LexicalIndex,
}

impl Snapshot {
    fn empty(dim: usize) -> Result<Self> {
        Ok(Self { chunks: HashMap::new(), vectors: FlatVectorIndex::new(dim), lexical: LexicalIndex::empty()? })
    }
}

pub struct HybridIndex {
    snapshot: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
    embedder: Arc<dyn Embedder>,
    embed_cache: EmbeddingCache,
    build_lexical: LexicalBuilder,
    metrics: Arc<MetricsCollector>,
    weights: HybridSettings,
    min_candidates: usize,
    retry_ceiling: usize,
}

impl HybridIndex {
    pub fn new(embedder: Arc<dyn Embedder>, metrics: Arc<MetricsCollector>, weights: HybridSettings) -> Result<Self> {
        let defaults = RetrievalSettings::default();
        Ok(Self {
            snapshot: RwLock::new(Arc::new(Snapshot::empty(embedder.dim())?)),
            write_lock: Mutex::new(()),
            embed_cache: EmbeddingCache::new(EMBED_CACHE_CAPACITY, EMBED_BATCH_SIZE),
            build_lexical: Self::rebuild_lexical,
            embedder,
            metrics,
            weights,
            min_candidates: defaults.min_candidates,
            retry_ceiling: defaults.retry_ceiling,
        })
    }

    /// Overrides the recall safeguard thresholds (`min_candidates`, `retry_ceiling`).
    pub fn with_recall_safeguard(mut self, min_candidates: usize, retry_ceiling: usize) -> Self {
        self.min_candidates = min_candidates;
        self.retry_ceiling = retry_ceiling;
        self
    }

    #[cfg(test)]
    fn with_lexical_builder(mut self, build: LexicalBuilder) -> Self {
        self.build_lexical = build;
        self
    }

    fn current(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, next: Snapshot) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(next);
    }

    fn rebuild_lexical(chunks: &HashMap<ChunkId, Chunk>) -> Result<LexicalIndex> {
        // Stable doc order keeps BM25 ties reproducible across rebuilds.
        let ordered: BTreeMap<&ChunkId, &Chunk> = chunks.iter().collect();
        LexicalIndex::build(ordered.into_values())
    }

    fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let mut batch: Vec<Chunk> = Vec::with_capacity(chunks.len());
        let mut positions: HashMap<ChunkId, usize> = HashMap::new();
        for c in chunks {
            match positions.get(c.id()) {
                Some(&i) => batch[i] = c,
                None => {
                    positions.insert(c.id().to_string(), batch.len());
                    batch.push(c);
                }
            }
        }
        if batch.is_empty() {
            return Ok(0);
        }

        // Embedding is the slow part and needs no index state.
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embed_cache
            .embed_all(self.embedder.as_ref(), &texts)
            .map_err(|e| Error::Embedding(format!("{:#}", e)))?;

        let _writer = self.write_lock.lock().map_err(|_| Error::IndexRebuild("writer lock poisoned".into()))?;
        let base = self.current();
        let mut vectors_next = if base.vectors.is_empty() {
            tracing::info!("Creating vector index from batch of {} chunks", batch.len());
            FlatVectorIndex::new(self.embedder.dim())
        } else {
            base.vectors.clone()
        };
        let mut chunks_next = base.chunks.clone();
        for (chunk, vector) in batch.iter().zip(&vectors) {
            vectors_next.upsert(chunk.id(), vector)?;
            chunks_next.insert(chunk.id().to_string(), chunk.clone());
        }
        let lexical = match (self.build_lexical)(&chunks_next) {
            Ok(index) => index,
            Err(e) => {
                tracing::error!("Lexical rebuild failed during add; {} chunks not published: {:#}", batch.len(), e);
                return Err(Error::IndexRebuild(format!("{:#}", e)).into());
            }
        };
        let stored = batch.len();
        let total = chunks_next.len();
        self.publish(Snapshot { chunks: chunks_next, vectors: vectors_next, lexical });
        tracing::info!("Indexed {} chunks ({} total)", stored, total);
        Ok(stored)
    }

    fn remove_source(&self, identifier: &str) -> Result<usize> {
        let _writer = self.write_lock.lock().map_err(|_| Error::IndexRebuild("writer lock poisoned".into()))?;
        let base = self.current();
        let doomed: HashSet<ChunkId> =
            base.chunks.values().filter(|c| c.belongs_to(identifier)).map(|c| c.id().to_string()).collect();
        if doomed.is_empty() {
            tracing::debug!("No chunks belong to '{}'", identifier);
            return Ok(0);
        }
        let mut chunks_next = base.chunks.clone();
        chunks_next.retain(|id, _| !doomed.contains(id));
        let mut vectors_next = base.vectors.clone();
        let removed_vectors = vectors_next.remove_ids(&doomed);
        let lexical = match (self.build_lexical)(&chunks_next) {
            Ok(index) => index,
            Err(e) => {
                tracing::error!(
                    "Lexical rebuild failed while removing '{}'; vector removal discarded, index unchanged: {:#}",
                    identifier,
                    e
                );
                return Err(Error::IndexRebuild(format!("{:#}", e)).into());
            }
        };
        if removed_vectors != doomed.len() {
            tracing::warn!("Removed {} chunks but only {} vectors for '{}'", doomed.len(), removed_vectors, identifier);
        }
        self.publish(Snapshot { chunks: chunks_next, vectors: vectors_next, lexical });
        tracing::info!("Removed {} chunks for '{}'", doomed.len(), identifier);
        Ok(doomed.len())
    }

    /// One fused pass over a single snapshot. Reports the pass to metrics.
    fn search_pass(&self, snap: &Snapshot, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let start = Instant::now();
        if k == 0 || snap.chunks.is_empty() {
            self.metrics.record_retrieval(start.elapsed(), 0, Vec::new());
            return Ok(vec![]);
        }
        let dense = if self.weights.semantic_weight > 0.0 {
            let q = self
                .embedder
                .embed_batch(&[query.to_string()])?
                .pop()
                .ok_or_else(|| Error::Embedding("embedder returned no query vector".into()))?;
            snap.vectors.search_vec(&q, k)?
        } else {
            vec![]
        };
        let sparse = if self.weights.keyword_weight > 0.0 { snap.lexical.search(query, k)? } else { vec![] };
        let fused = weighted_rrf(
            &[(dense.as_slice(), self.weights.semantic_weight), (sparse.as_slice(), self.weights.keyword_weight)],
            self.weights.rrf_k,
        );
        let results: Vec<Chunk> = fused.iter().filter_map(|h| snap.chunks.get(&h.id).cloned()).take(k).collect();
        let sources: Vec<String> = results.iter().map(|c| c.display_name().to_string()).collect();
        tracing::debug!(dense = dense.len(), sparse = sparse.len(), returned = results.len(), "hybrid pass k={}", k);
        self.metrics.record_retrieval(start.elapsed(), results.len(), sources);
        Ok(results)
    }

    fn search_with_safeguard(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let snap = self.current();
        let results = self.search_pass(&snap, query, k)?;
        if k == 0 || results.len() >= self.min_candidates || k >= self.retry_ceiling {
            return Ok(results);
        }
        let widened = self.retry_ceiling.min((3 * k).max(25));
        tracing::debug!("Only {} candidates for k={}, retrying once with k={}", results.len(), k, widened);
        match self.search_pass(&snap, query, widened) {
            Ok(mut retry) => {
                retry.truncate(k);
                if retry.len() > results.len() { Ok(retry) } else { Ok(results) }
            }
            Err(e) => {
                tracing::warn!("Widened retry failed, keeping first pass: {:#}", e);
                Ok(results)
            }
        }
    }
}

impl DocumentStore for HybridIndex {
    fn add(&self, chunks: Vec<Chunk>) -> Result<usize> { self.add_chunks(chunks) }

    fn remove_by_source(&self, identifier: &str) -> Result<usize> { self.remove_source(identifier) }

    fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> { self.search_with_safeguard(query, k) }

    fn sources(&self) -> Vec<SourceInfo> {
        let snap = self.current();
        let mut by_source: BTreeMap<&str, SourceInfo> = BTreeMap::new();
        for c in snap.chunks.values() {
            by_source
                .entry(c.metadata.source.as_str())
                .or_insert_with(|| SourceInfo {
                    source: c.metadata.source.clone(),
                    file_name: c.metadata.file_name.clone(),
                    chunk_count: 0,
                })
                .chunk_count += 1;
        }
        by_source.into_values().collect()
    }

    fn len(&self) -> usize { self.current().chunks.len() }
}
