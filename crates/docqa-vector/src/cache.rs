//! In-process embedding cache keyed by a BLAKE3 hash of the chunk content.
//!
//! Consulted before calling the embedder and written through on misses.
//! Entries are evicted oldest-first once `capacity` is exceeded.
use anyhow::{bail, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use docqa_core::traits::Embedder;

pub fn content_hash(s: &str) -> String {
	blake3::hash(s.as_bytes()).to_hex().to_string()
}

#[derive(Default)]
struct Entries {
	vectors: HashMap<String, Vec<f32>>,
	order: VecDeque<String>,
}

pub struct EmbeddingCache {
	entries: Mutex<Entries>,
	capacity: usize,
	batch_size: usize,
}

impl EmbeddingCache {
	pub fn new(capacity: usize, batch_size: usize) -> Self {
		Self { entries: Mutex::new(Entries::default()), capacity, batch_size: batch_size.max(1) }
	}

	pub fn len(&self) -> usize {
		self.entries.lock().map(|e| e.vectors.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// One vector per text, in order. Misses are embedded in batches of `batch_size`.
	pub fn embed_all(&self, embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
		let mut out: Vec<Option<Vec<f32>>> = {
			let entries = match self.entries.lock() {
				Ok(guard) => guard,
				Err(poisoned) => poisoned.into_inner(),
			};
			hashes.iter().map(|h| entries.vectors.get(h).cloned()).collect()
		};

		let misses: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
		tracing::debug!("Embedding cache: {} hits, {} misses", texts.len() - misses.len(), misses.len());
		for batch in misses.chunks(self.batch_size) {
			let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
			let vectors = embedder.embed_batch(&batch_texts)?;
			if vectors.len() != batch.len() {
				bail!("embedder returned {} vectors for {} texts", vectors.len(), batch.len());
			}
			for (&i, v) in batch.iter().zip(vectors) { out[i] = Some(v); }
		}

		let mut result = Vec::with_capacity(texts.len());
		for (i, v) in out.into_iter().enumerate() {
			match v {
				Some(v) => result.push(v),
				None => bail!("no embedding produced for text #{}", i),
			}
		}
		self.put_many(misses.iter().map(|&i| (hashes[i].clone(), result[i].clone())));
		Ok(result)
	}

	fn put_many<I: IntoIterator<Item = (String, Vec<f32>)>>(&self, items: I) {
		if self.capacity == 0 { return; }
		let mut entries = match self.entries.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		for (hash, vector) in items {
			if entries.vectors.insert(hash.clone(), vector).is_none() {
				entries.order.push_back(hash);
			}
		}
		while entries.vectors.len() > self.capacity {
			let Some(oldest) = entries.order.pop_front() else { break };
			entries.vectors.remove(&oldest);
		}
	}
}
