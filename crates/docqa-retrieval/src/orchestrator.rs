//! Query-to-chunks orchestration.
//!
//! `CLASSIFY -> (SINGLE_PASS | MULTI_ENTITY) -> MERGE -> RETURN`. Component
//! failures (search, rerank, translation) are logged and contribute nothing;
//! `retrieve` and `get_relevant_context` never fail.
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use docqa_core::config::RetrievalSettings;
use docqa_core::error::Error;
use docqa_core::metrics::MetricsCollector;
use docqa_core::traits::{DocumentStore, Reranker, Translator};
use docqa_core::types::Chunk;

use crate::context::{assemble, assemble_without_images};
use crate::intent::{classify, QueryIntent};
use crate::resume::{is_excluded, looks_like_resume, subject_from_file_name};

/// Results below this count always trigger the single-pass fill.
const MIN_RESULT_FLOOR: usize = 3;

/// One comparison target: a name from the query, or a resume file found by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntityTarget {
    name: String,
    file_name: Option<String>,
}

/// Final result plus how the query was understood.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    /// The query as the user sent it.
    pub original_query: String,
    /// The query used for retrieval (translated when needed).
    pub effective_query: String,
    pub intent: QueryIntent,
    pub chunks: Vec<Chunk>,
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    reranker: Arc<dyn Reranker>,
    translator: Option<Arc<dyn Translator>>,
    metrics: Arc<MetricsCollector>,
    settings: Arc<RetrievalSettings>,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reranker: Arc<dyn Reranker>,
        metrics: Arc<MetricsCollector>,
        settings: RetrievalSettings,
    ) -> Self {
        Self { store, reranker, translator: None, metrics, settings: Arc::new(settings) }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Ranked chunks for `query`, at most `top_n`, no duplicate ids.
    pub async fn retrieve(&self, query: &str) -> Vec<Chunk> {
        self.retrieve_with_intent(query).await.chunks
    }

    /// Context string for the generation prompt. Empty means nothing relevant was found.
    pub async fn get_relevant_context(&self, query: &str) -> String {
        let retrieval = self.retrieve_with_intent(query).await;
        render_context(&retrieval)
    }

    /// Translates when needed, then classifies the query used for retrieval.
    pub async fn understand(&self, query: &str) -> (String, QueryIntent) {
        let needs_translation = !query.is_ascii();
        let effective = if needs_translation { self.translate(query).await } else { query.to_string() };
        let mut intent = classify(&effective, &self.settings);
        intent.needs_translation = needs_translation;
        (effective, intent)
    }

    pub async fn retrieve_with_intent(&self, query: &str) -> Retrieval {
        let start = Instant::now();
        let (effective_query, intent) = self.understand(query).await;
        let chunks = if intent.wants_multi_entity() {
            self.multi_entity(&effective_query, &intent).await
        } else {
            self.single_pass(&effective_query, &intent).await
        };
        let chunks = finalize(chunks, self.settings.top_n);
        tracing::info!(
            "Retrieved {} chunks in {:?} (comparison={}, visual={}, resume={})",
            chunks.len(),
            start.elapsed(),
            intent.is_comparison,
            intent.is_visual,
            intent.is_resume_scoped
        );
        if self.settings.debug {
            tracing::debug!("Final sources: {:?}", source_names(&chunks));
        }
        Retrieval { original_query: query.to_string(), effective_query, intent, chunks }
    }

    async fn translate(&self, query: &str) -> String {
        let Some(translator) = &self.translator else {
            return query.to_string();
        };
        let timeout = Duration::from_secs(self.settings.translation_timeout_secs);
        match tokio::time::timeout(timeout, translator.translate_to_english(query)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                tracing::info!("Translated query for retrieval: '{}' -> '{}'", query, text);
                text
            }
            Ok(Ok(_)) => query.to_string(),
            Ok(Err(e)) => {
                tracing::warn!("Translation failed, using original query: {:#}", e);
                query.to_string()
            }
            Err(_) => {
                tracing::warn!("Translation timed out after {:?}, using original query", timeout);
                query.to_string()
            }
        }
    }

    async fn single_pass(&self, query: &str, intent: &QueryIntent) -> Vec<Chunk> {
        let store = Arc::clone(&self.store);
        let reranker = Arc::clone(&self.reranker);
        let metrics = Arc::clone(&self.metrics);
        let settings = Arc::clone(&self.settings);
        let query = query.to_string();
        let intent = intent.clone();
        match tokio::task::spawn_blocking(move || {
            single_pass_blocking(store.as_ref(), reranker.as_ref(), &metrics, &settings, &query, &intent)
        })
        .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Single-pass retrieval task failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn multi_entity(&self, query: &str, intent: &QueryIntent) -> Vec<Chunk> {
        let targets = self.entity_targets(intent);
        if targets.is_empty() {
            tracing::info!("No comparison targets found, falling back to single pass");
            return self.single_pass(query, intent).await;
        }
        tracing::info!(
            "Multi-entity retrieval for {:?}",
            targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        let passes = targets.iter().cloned().map(|target| {
            let store = Arc::clone(&self.store);
            let reranker = Arc::clone(&self.reranker);
            let metrics = Arc::clone(&self.metrics);
            let settings = Arc::clone(&self.settings);
            let resume = intent.is_resume_scoped;
            tokio::task::spawn_blocking(move || {
                entity_pass(store.as_ref(), reranker.as_ref(), &metrics, &settings, &target, resume)
            })
        });
        // join_all keeps input order, so merging is deterministic for a given target list.
        let results = join_all(passes).await;

        let mut seen: HashSet<String> = HashSet::new();
        let mut merged: Vec<Chunk> = Vec::new();
        for (target, result) in targets.iter().zip(results) {
            let chunks = match result {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(e)) => {
                    tracing::warn!("Entity '{}' contributed nothing: {:#}", target.name, e);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Entity '{}' task failed: {}", target.name, e);
                    continue;
                }
            };
            let before = merged.len();
            for c in chunks {
                if seen.insert(c.dedup_key()) {
                    merged.push(c);
                }
            }
            tracing::debug!("Entity '{}' added {} chunks", target.name, merged.len() - before);
        }

        let wanted = self.settings.top_n.max(MIN_RESULT_FLOOR);
        if merged.len() < wanted {
            tracing::info!("Multi-entity produced {} chunks, filling from a single pass", merged.len());
            for c in self.single_pass(query, intent).await {
                if merged.len() >= wanted {
                    break;
                }
                if seen.insert(c.dedup_key()) {
                    merged.push(c);
                }
            }
        }
        merged
    }

    fn entity_targets(&self, intent: &QueryIntent) -> Vec<EntityTarget> {
        let mut seen: HashSet<String> = HashSet::new();
        let named: Vec<EntityTarget> = intent
            .entities
            .iter()
            .filter(|e| seen.insert(e.to_lowercase()))
            .map(|e| EntityTarget { name: e.clone(), file_name: None })
            .collect();
        if !named.is_empty() || !intent.is_resume_scoped {
            return named;
        }
        self.store
            .sources()
            .into_iter()
            .filter(|s| looks_like_resume(&s.file_name, &self.settings.non_resume_patterns))
            .map(|s| EntityTarget { name: subject_from_file_name(&s.file_name), file_name: Some(s.file_name) })
            .collect()
    }
}

/// Context for an already computed retrieval, honoring visual suppression.
pub fn render_context(retrieval: &Retrieval) -> String {
    if retrieval.intent.visual_suppressed {
        assemble_without_images(&retrieval.chunks)
    } else {
        assemble(&retrieval.chunks)
    }
}

fn source_names(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.display_name()).collect()
}

/// Stable partition: chunks with an image reference first.
fn images_first(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let (mut with, without): (Vec<Chunk>, Vec<Chunk>) =
        chunks.into_iter().partition(|c| c.metadata.image_url.as_deref().is_some_and(|u| !u.is_empty()));
    with.extend(without);
    with
}

fn dedup(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks.into_iter().filter(|c| seen.insert(c.dedup_key())).collect()
}

fn finalize(chunks: Vec<Chunk>, top_n: usize) -> Vec<Chunk> {
    let mut out = dedup(chunks);
    out.truncate(top_n);
    out
}

fn single_pass_blocking(
    store: &dyn DocumentStore,
    reranker: &dyn Reranker,
    metrics: &MetricsCollector,
    settings: &RetrievalSettings,
    query: &str,
    intent: &QueryIntent,
) -> Vec<Chunk> {
    let k = if intent.is_visual || intent.is_resume_scoped { settings.wide_k } else { settings.top_k };
    let mut candidates = match store.search(query, k) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("{}", Error::retrieval(format!("single-pass search: {:#}", e)));
            return Vec::new();
        }
    };
    if settings.debug {
        tracing::debug!("Single pass k={} pre-rerank sources: {:?}", k, source_names(&candidates));
    }
    if intent.is_resume_scoped {
        candidates.retain(|c| !is_excluded(&c.metadata.file_name, &settings.non_resume_patterns));
    }
    if intent.is_visual {
        candidates = images_first(candidates);
    }
    let candidates = dedup(candidates);
    if candidates.is_empty() {
        return Vec::new();
    }

    let start = Instant::now();
    let reranked = match reranker.rerank(query, candidates.clone(), settings.top_n) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("{}; keeping retrieval order", Error::retrieval(format!("rerank: {:#}", e)));
            candidates.into_iter().take(settings.top_n).collect()
        }
    };
    metrics.record_rerank(start.elapsed());
    if settings.debug {
        tracing::debug!("Single pass post-rerank sources: {:?}", source_names(&reranked));
    }
    if intent.is_visual { images_first(reranked) } else { reranked }
}

fn entity_query(name: &str, resume: bool) -> String {
    if resume {
        format!("{name} resume CV experience skills education projects certifications")
    } else {
        format!("{name} experience skills background")
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect()
}

/// Whole-word match: every word of `needle`, in order, in the content, path or file name.
fn mentions(chunk: &Chunk, needle: &str) -> bool {
    let needle = words(needle);
    if needle.is_empty() {
        return false;
    }
    [&chunk.content, &chunk.metadata.source, &chunk.metadata.file_name]
        .iter()
        .any(|field| words(field).windows(needle.len()).any(|w| w == needle.as_slice()))
}

fn entity_pass(
    store: &dyn DocumentStore,
    reranker: &dyn Reranker,
    metrics: &MetricsCollector,
    settings: &RetrievalSettings,
    target: &EntityTarget,
    resume: bool,
) -> anyhow::Result<Vec<Chunk>> {
    let query = entity_query(&target.name, resume);
    let candidates = store
        .search(&query, settings.entity_k)
        .map_err(|e| Error::retrieval(format!("search for '{}': {:#}", target.name, e)))?;
    let total = candidates.len();

    let is_own = |c: &Chunk| {
        mentions(c, &target.name) || target.file_name.as_deref().is_some_and(|f| c.belongs_to(f))
    };
    let filtered: Vec<Chunk> = candidates
        .into_iter()
        .filter(|c| {
            is_own(c) || (resume && looks_like_resume(&c.metadata.file_name, &settings.non_resume_patterns))
        })
        .collect();
    if settings.debug {
        tracing::debug!("Entity '{}': {} of {} candidates kept by hard filter", target.name, filtered.len(), total);
    }
    if filtered.is_empty() {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let reranked = reranker
        .rerank(&query, filtered, settings.entity_rerank_n)
        .map_err(|e| Error::retrieval(format!("rerank for '{}': {:#}", target.name, e)))?;
    metrics.record_rerank(start.elapsed());

    // Chunks that are actually about this entity outrank other resume-looking files.
    let (own, other): (Vec<Chunk>, Vec<Chunk>) = reranked.into_iter().partition(|c| is_own(c));
    let mut ordered = own;
    ordered.extend(other);
    ordered.truncate(settings.per_entity_cap);
    if settings.debug {
        tracing::debug!("Entity '{}' post-rerank sources: {:?}", target.name, source_names(&ordered));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_queries_carry_resume_terms() {
        assert_eq!(entity_query("Alice", true), "Alice resume CV experience skills education projects certifications");
        assert_eq!(entity_query("Rust", false), "Rust experience skills background");
    }

    #[test]
    fn images_first_is_stable() {
        let a = Chunk::from_text("/d/a.pdf", 0, "a");
        let b = Chunk::from_text("/d/b.pdf", 0, "b").with_image_url("/static/b.png");
        let c = Chunk::from_text("/d/c.pdf", 0, "c");
        let d = Chunk::from_text("/d/d.pdf", 0, "d").with_image_url("/static/d.png");
        let out = images_first(vec![a, b, c, d]);
        assert_eq!(out.iter().map(|c| c.display_name()).collect::<Vec<_>>(), vec!["b.pdf", "d.pdf", "a.pdf", "c.pdf"]);
    }

    #[test]
    fn finalize_dedups_then_truncates() {
        let a = Chunk::from_text("/d/a.txt", 0, "a");
        let b = Chunk::from_text("/d/b.txt", 0, "b");
        let out = finalize(vec![a.clone(), a, b.clone(), b], 5);
        assert_eq!(out.len(), 2);
        let out = finalize(out, 1);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn mentions_checks_content_and_names() {
        let c = Chunk::from_text("/uploads/resume_alice.txt", 0, "5 years ML");
        assert!(mentions(&c, "Alice"));
        assert!(!mentions(&c, "Bob"));
        let c = Chunk::from_text("/uploads/x.txt", 0, "Bob, 3 years data engineering");
        assert!(mentions(&c, "bob"));
    }

    #[test]
    fn mentions_needs_whole_words() {
        let c = Chunk::from_text("/uploads/plan.txt", 0, "The annual planning budget applies to every team.");
        assert!(!mentions(&c, "Ann"));
        assert!(!mentions(&c, "Eve"));
        assert!(mentions(&c, "budget"));
        let c = Chunk::from_text("/uploads/resume_alice_2024.pdf", 0, "Skills: Python");
        assert!(mentions(&c, "alice 2024"));
        assert!(!mentions(&c, "2024 alice"));
        assert!(!mentions(&c, ""));
    }
}
