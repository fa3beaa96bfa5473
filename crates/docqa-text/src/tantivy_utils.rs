use tantivy::schema::{Schema, TextFieldIndexing, TextOptions, IndexRecordOption, STRING, STORED};
use tantivy::tokenizer::{TextAnalyzer, SimpleTokenizer, LowerCaser, StopWordFilter, TokenStream};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("source", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field("text", text_options);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}

/// Reduces free text to bare terms so query syntax (`:`, `"`, `-`, `(`...) in user input never reaches the parser.
pub fn sanitize_query(query: &str) -> String {
	query
		.split(|c: char| !c.is_alphanumeric())
		.filter(|t| !t.is_empty())
		.collect::<Vec<_>>()
		.join(" ")
}

/// Whether `text` keeps any token after the registered analyzer runs.
/// A query of stop words alone parses to a match-all query, so callers check this first.
pub fn has_indexed_terms(index: &Index, text: &str) -> bool {
	let Some(mut analyzer) = index.tokenizers().get(TOKENIZER_NAME) else { return !text.trim().is_empty() };
	let mut stream = analyzer.token_stream(text);
	stream.advance()
}
