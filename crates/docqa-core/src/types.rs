//! Domain types shared by the index, retrieval, and answer layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ChunkId = String;

/// Provenance attached to every chunk.
///
/// - `source`: origin path or id, identical for every chunk of one file
/// - `file_name`: basename of the source
/// - `document_type`: extension including the dot (e.g. `.pdf`)
/// - `indexed_at`: when ingestion produced the chunk
/// - `chunk_id`: globally unique, stable across reindexing
/// - `chunk_index`: position within the parent file
/// - `page`/`image_url`: present for paged documents with rendered previews
/// - `extra`: open extension map for anything else an ingester wants to carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub file_name: String,
    pub document_type: String,
    pub indexed_at: DateTime<Utc>,
    pub chunk_id: ChunkId,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Immutable unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Builds a chunk for `source` with derived file name, type and a stable id.
    pub fn from_text(source: &str, chunk_index: usize, content: impl Into<String>) -> Self {
        let content = content.into();
        let path = std::path::Path::new(source);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.to_string());
        let document_type = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        Chunk {
            metadata: ChunkMetadata {
                source: source.to_string(),
                file_name,
                document_type,
                indexed_at: Utc::now(),
                chunk_id: stable_chunk_id(source, chunk_index, &content),
                chunk_index,
                page: None,
                image_url: None,
                extra: BTreeMap::new(),
            },
            content,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.metadata.page = Some(page);
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.image_url = Some(url.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.metadata.chunk_id
    }

    /// Key used to collapse duplicates before they reach the LLM.
    ///
    /// `chunk_id` when present; otherwise source + page + the first 64 chars
    /// of content.
    pub fn dedup_key(&self) -> String {
        if !self.metadata.chunk_id.is_empty() {
            return self.metadata.chunk_id.clone();
        }
        let prefix: String = self.content.chars().take(64).collect();
        let page = self.metadata.page.map(|p| p.to_string()).unwrap_or_default();
        format!("{}#{}#{}", self.metadata.source, page, prefix)
    }

    /// True when `identifier` names this chunk's file, by full source or by basename.
    pub fn belongs_to(&self, identifier: &str) -> bool {
        self.metadata.source == identifier || self.metadata.file_name == identifier
    }

    /// File name if set, otherwise the source.
    pub fn display_name(&self) -> &str {
        if self.metadata.file_name.is_empty() {
            &self.metadata.source
        } else {
            &self.metadata.file_name
        }
    }
}

/// BLAKE3 over (source, position, content): unchanged text keeps its id on reindex.
pub fn stable_chunk_id(source: &str, chunk_index: usize, content: &str) -> ChunkId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    hasher.update(&[0]);
    hasher.update(chunk_index.to_string().as_bytes());
    hasher.update(&[0]);
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
    Hybrid,
}

/// The minimal surface returned by all engines.
///
/// `id` matches `ChunkMetadata::chunk_id`. `score` is engine-specific but
/// higher is always better. `source` labels the origin engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// One indexed file as seen through the chunk store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source: String,
    pub file_name: String,
    pub chunk_count: usize,
}
