//! Baseline document ingestion: plain-text-ish files into provenance-tagged chunks.
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::IngestSettings;
use crate::traits::DocumentProcessor;
use crate::types::{stable_chunk_id, Chunk, ChunkMetadata};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "py", "html", "htm", "ipynb"];
const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        let s = IngestSettings::default();
        Self { chunk_size: s.chunk_size, chunk_overlap: s.chunk_overlap }
    }
}

impl From<&IngestSettings> for ChunkingConfig {
    fn from(s: &IngestSettings) -> Self {
        Self { chunk_size: s.chunk_size.max(1), chunk_overlap: s.chunk_overlap.min(s.chunk_size.saturating_sub(1)) }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    /// Every supported file under `data_dir`, chunked, in path order.
    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Chunk>> {
        let files = self.supported_files(data_dir);
        if files.is_empty() {
            tracing::warn!("No supported files found under {}", data_dir.display());
            return Ok(vec![]);
        }
        self.process(&files)
    }

    fn load_file(&self, file_path: &Path) -> Result<Option<String>> {
        let ext = extension_of(file_path);
        let raw = self.read_file_content(file_path)?;
        let text = match ext.as_str() {
            "txt" | "md" | "csv" | "py" => raw,
            "json" => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(raw),
                Err(e) => {
                    tracing::warn!("Invalid JSON in {}: {}", file_path.display(), e);
                    return Ok(None);
                }
            },
            "html" | "htm" => strip_html_tags(&raw),
            "ipynb" => match notebook_text(&raw) {
                Some(text) => text,
                None => {
                    tracing::warn!("Unreadable notebook {}", file_path.display());
                    return Ok(None);
                }
            },
            other => {
                tracing::warn!("Unsupported extension: .{}", other);
                return Ok(None);
            }
        };
        Ok(Some(text))
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => {
                let bytes = fs::read(file_path).with_context(|| format!("reading {}", file_path.display()))?;
                Ok(String::from_utf8_lossy(&bytes).to_string())
            }
        }
    }

    fn chunk_content(&self, content: &str, file_path: &Path) -> Vec<Chunk> {
        let source = file_path.to_string_lossy().to_string();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.clone());
        let document_type = format!(".{}", extension_of(file_path));
        let indexed_at = Utc::now();
        self.split_text(content)
            .into_iter()
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(chunk_index, piece)| Chunk {
                metadata: ChunkMetadata {
                    source: source.clone(),
                    file_name: file_name.clone(),
                    document_type: document_type.clone(),
                    indexed_at,
                    chunk_id: stable_chunk_id(&source, chunk_index, &piece),
                    chunk_index,
                    page: None,
                    image_url: None,
                    extra: BTreeMap::new(),
                },
                content: piece,
            })
            .collect()
    }

    /// Recursive character splitting: paragraphs, then lines, then words, then raw characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() { return vec![]; }
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let size = self.chunking_config.chunk_size;
        if char_len(text) <= size { return vec![text.to_string()]; }
        let Some(idx) = separators.iter().position(|s| text.contains(*s)) else {
            return self.split_chars(text);
        };
        let sep = separators[idx];
        let rest = &separators[idx + 1..];
        let mut pieces = Vec::new();
        for part in text.split(sep) {
            if part.trim().is_empty() { continue; }
            if char_len(part) > size { pieces.extend(self.split_recursive(part, rest)); } else { pieces.push(part.to_string()); }
        }
        self.merge_pieces(pieces, sep)
    }

    fn merge_pieces(&self, pieces: Vec<String>, sep: &str) -> Vec<String> {
        let size = self.chunking_config.chunk_size;
        let overlap = self.chunking_config.chunk_overlap;
        let sep_len = char_len(sep);
        let mut chunks = Vec::new();
        let mut window: VecDeque<String> = VecDeque::new();
        let mut window_len = 0usize;
        for piece in pieces {
            let piece_len = char_len(&piece);
            if !window.is_empty() && window_len + sep_len + piece_len > size {
                chunks.push(window.iter().map(String::as_str).collect::<Vec<_>>().join(sep));
                // Keep a tail of at most `overlap` chars that still leaves room for `piece`.
                while !window.is_empty() && (window_len > overlap || window_len + sep_len + piece_len > size) {
                    if let Some(front) = window.pop_front() {
                        let removed = char_len(&front) + if window.is_empty() { 0 } else { sep_len };
                        window_len = window_len.saturating_sub(removed);
                    }
                }
            }
            window_len = if window.is_empty() { piece_len } else { window_len + sep_len + piece_len };
            window.push_back(piece);
        }
        if !window.is_empty() {
            chunks.push(window.iter().map(String::as_str).collect::<Vec<_>>().join(sep));
        }
        chunks
    }

    fn split_chars(&self, text: &str) -> Vec<String> {
        let size = self.chunking_config.chunk_size;
        let step = size.saturating_sub(self.chunking_config.chunk_overlap).max(1);
        let chars: Vec<char> = text.chars().collect();
        let mut out = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() { break; }
            start += step;
        }
        out
    }

    /// Supported files under `root`, sorted by path.
    pub fn supported_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str()) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        files
    }
}

impl DocumentProcessor for DataProcessor {
    fn process(&self, paths: &[PathBuf]) -> Result<Vec<Chunk>> {
        let mut all_chunks = Vec::new();
        for (file_index, file_path) in paths.iter().enumerate() {
            tracing::debug!("Processing file {}/{}: {}", file_index + 1, paths.len(), file_path.display());
            let content = match self.load_file(file_path) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Error loading {}: {:#}", file_path.display(), e);
                    continue;
                }
            };
            all_chunks.extend(self.chunk_content(&content, file_path));
        }
        if all_chunks.is_empty() {
            tracing::warn!("No documents were loaded");
        } else {
            tracing::info!("Created {} chunks from {} files", all_chunks.len(), paths.len());
        }
        Ok(all_chunks)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).unwrap_or_default()
}

fn char_len(s: &str) -> usize { s.chars().count() }

fn notebook_text(raw: &str) -> Option<String> {
    let notebook: serde_json::Value = serde_json::from_str(raw).ok()?;
    let cells = notebook.get("cells")?.as_array()?;
    let mut parts = Vec::new();
    for cell in cells {
        let source = match cell.get("source") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(lines)) => lines.iter().filter_map(|l| l.as_str()).collect::<String>(),
            _ => continue,
        };
        match cell.get("cell_type").and_then(|t| t.as_str()) {
            Some("markdown") => parts.push(source),
            Some("code") => parts.push(format!("Code:\n{}", source)),
            _ => {}
        }
    }
    Some(parts.join("\n\n"))
}

/// Drops tags plus `<script>`/`<style>` bodies and blank lines.
fn strip_html_tags(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;
    let bytes = html.as_bytes();
    while i < bytes.len() {
        if lower[i..].starts_with("<script") || lower[i..].starts_with("<style") {
            let close = if lower[i..].starts_with("<script") { "</script>" } else { "</style>" };
            match lower[i..].find(close) {
                Some(pos) => { i += pos + close.len(); continue; }
                None => break,
            }
        }
        if bytes[i] == b'<' {
            match html[i..].find('>') {
                Some(pos) => { i += pos + 1; out.push('\n'); continue; }
                None => break,
            }
        }
        // Advance by a whole char so multi-byte text survives.
        let ch = html[i..].chars().next().unwrap_or(' ');
        out.push(ch);
        i += ch.len_utf8();
    }
    out.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(size: usize, overlap: usize) -> DataProcessor {
        DataProcessor::with_config(ChunkingConfig { chunk_size: size, chunk_overlap: overlap })
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(processor(100, 10).split_text("hello world"), vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_respects_size_and_overlaps() {
        let text = (0..200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = processor(100, 30).split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks { assert!(c.chars().count() <= 100, "chunk too long: {}", c.len()); }
        let first_tail = chunks[0].split(' ').last().expect("tail");
        assert!(chunks[1].split(' ').any(|w| w == first_tail), "consecutive chunks overlap");
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let a = "a".repeat(60);
        let b = "b".repeat(60);
        let chunks = processor(100, 0).split_text(&format!("{a}\n\n{b}"));
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn unbroken_text_falls_back_to_char_windows() {
        let chunks = processor(10, 2).split_text(&"x".repeat(25));
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![10, 10, 9]);
    }

    #[test]
    fn html_strips_tags_and_scripts() {
        let text = strip_html_tags("<html><head><script>var x = 1;</script></head><body><h1>Hello</h1><p>World</p></body></html>");
        assert_eq!(text, "Hello\nWorld");
    }

    #[test]
    fn notebook_keeps_markdown_and_code_cells() {
        let raw = r##"{"cells":[{"cell_type":"markdown","source":["# Title\n","Intro"]},{"cell_type":"code","source":"print(1)"}]}"##;
        assert_eq!(notebook_text(raw).expect("cells"), "# Title\nIntro\n\nCode:\nprint(1)");
    }

    #[test]
    fn chunk_ids_are_stable() {
        assert_eq!(stable_chunk_id("a.txt", 0, "x"), stable_chunk_id("a.txt", 0, "x"));
        assert_ne!(stable_chunk_id("a.txt", 0, "x"), stable_chunk_id("a.txt", 1, "x"));
    }
}
