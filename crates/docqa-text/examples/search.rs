use std::env;
use std::path::PathBuf;

use docqa_core::data_processor::DataProcessor;
use docqa_text::LexicalIndex;

// Chunk a directory, build a throwaway BM25 index, and print the top hits.
// Usage:
//   cargo run -p docqa-text --example search -- "your query" [--dir ./docs] [--limit 10]

fn main() -> anyhow::Result<()> {
	let args: Vec<String> = env::args().skip(1).collect();
	let mut query = String::new();
	let mut data_dir = PathBuf::from(".");
	let mut limit: usize = 10;

	let mut i = 0;
	while i < args.len() {
		match args[i].as_str() {
			"--dir" => {
				if i + 1 >= args.len() { eprintln!("--dir requires a path"); std::process::exit(2); }
				data_dir = PathBuf::from(&args[i + 1]);
				i += 2; continue;
			}
			"--limit" => {
				if i + 1 >= args.len() { eprintln!("--limit requires a number"); std::process::exit(2); }
				limit = args[i + 1].parse().unwrap_or(limit);
				i += 2; continue;
			}
			s if s.starts_with('-') => { eprintln!("Unknown flag: {}", s); std::process::exit(2); }
			s => { if query.is_empty() { query = s.to_string(); } i += 1; }
		}
	}
	if query.is_empty() {
		eprintln!("Usage: cargo run -p docqa-text --example search -- <query> [--dir DIR] [--limit N]");
		std::process::exit(1);
	}

	let chunks = DataProcessor::new().process_directory(&data_dir)?;
	let index = LexicalIndex::build(&chunks)?;
	println!("Indexed {} chunks from {}", index.len(), data_dir.display());
	for (rank, hit) in index.search(&query, limit)?.iter().enumerate() {
		let source = chunks.iter().find(|c| c.metadata.chunk_id == hit.id).map(|c| c.display_name()).unwrap_or("?");
		println!("{:>2}. score={:.3} {} ({})", rank + 1, hit.score, source, hit.id);
	}
	Ok(())
}
