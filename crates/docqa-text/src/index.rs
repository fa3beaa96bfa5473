use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument};

use docqa_core::types::{Chunk, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, has_indexed_terms, register_tokenizer, sanitize_query};

const WRITER_BUDGET: usize = 20_000_000;

/// BM25 over a fixed set of chunks.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	id_field: Field,
	text_field: Field,
	doc_count: usize,
}

impl LexicalIndex {
	pub fn empty() -> Result<Self> {
		Self::build(std::iter::empty())
	}

	/// Builds a fresh RAM index over `chunks`. Nothing is shared with any previous index.
	pub fn build<'a, I>(chunks: I) -> Result<Self>
	where
		I: IntoIterator<Item = &'a Chunk>,
	{
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field("id")?;
		let source_field = schema.get_field("source")?;
		let text_field = schema.get_field("text")?;

		// One thread keeps a single segment, so BM25 statistics are collection-wide.
		let mut writer = index.writer_with_num_threads(1, WRITER_BUDGET)?;
		let mut doc_count = 0usize;
		for c in chunks {
			writer.add_document(doc!(
				id_field => c.metadata.chunk_id.clone(),
				source_field => c.metadata.source.clone(),
				text_field => c.content.clone(),
			))?;
			doc_count += 1;
		}
		writer.commit()?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		tracing::debug!("Lexical index built over {} chunks", doc_count);
		Ok(Self { index, reader, id_field, text_field, doc_count })
	}

	pub fn len(&self) -> usize { self.doc_count }

	pub fn is_empty(&self) -> bool { self.doc_count == 0 }

	/// Top `k` chunk ids by BM25, best first. Queries with no usable terms return nothing.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
		let terms = sanitize_query(query);
		if terms.is_empty() || k == 0 || self.doc_count == 0 { return Ok(vec![]); }
		if !has_indexed_terms(&self.index, &terms) {
			tracing::debug!("Query '{}' has only stop words", terms);
			return Ok(vec![]);
		}
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (q, errors) = qp.parse_query_lenient(&terms);
		if !errors.is_empty() {
			tracing::debug!("Lenient parse dropped {} clause(s) of '{}'", errors.len(), terms);
		}
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) else { continue };
			hits.push(SearchHit { id: id.to_string(), score, source: SourceKind::Text });
		}
		Ok(hits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tantivy_utils::sanitize_query;

	#[test]
	fn sanitize_strips_query_syntax() {
		assert_eq!(sanitize_query("title:\"rust\" AND (c++ -java)"), "title rust AND c java");
		assert_eq!(sanitize_query("?!"), "");
	}

	#[test]
	fn stop_word_only_query_matches_nothing() {
		let chunks = vec![
			Chunk::from_text("/a.txt", 0, "The history of the river."),
			Chunk::from_text("/b.txt", 0, "Notes on water and fire."),
		];
		let idx = LexicalIndex::build(&chunks).unwrap();
		assert!(idx.search("the of and", 5).unwrap().is_empty());
		assert!(idx.search("What is it?", 5).unwrap().is_empty());
		let hits = idx.search("the river", 5).unwrap();
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].id, chunks[0].metadata.chunk_id);
	}

	#[test]
	fn empty_index_returns_nothing() {
		let idx = LexicalIndex::empty().unwrap();
		assert!(idx.is_empty());
		assert!(idx.search("anything", 10).unwrap().is_empty());
	}
}
