//! docqa-text
//!
//! In-memory Tantivy BM25 index over chunk content. The index is immutable
//! once built; the hybrid layer rebuilds it over the full collection after
//! every mutation and swaps it in.
pub mod tantivy_utils;
pub mod index;

pub use index::LexicalIndex;
