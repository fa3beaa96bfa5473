use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use docqa_core::types::{ChunkId, SearchHit, SourceKind};

/// Brute-force inner-product index. With normalized inputs the score is cosine similarity.
///
/// Rows are stored contiguously; removal swaps the last row into the hole.
#[derive(Debug, Clone)]
pub struct FlatVectorIndex {
	dim: usize,
	ids: Vec<ChunkId>,
	data: Vec<f32>,
	positions: HashMap<ChunkId, usize>,
}

impl FlatVectorIndex {
	pub fn new(dim: usize) -> Self {
		Self { dim, ids: Vec::new(), data: Vec::new(), positions: HashMap::new() }
	}

	pub fn dim(&self) -> usize { self.dim }
	pub fn len(&self) -> usize { self.ids.len() }
	pub fn is_empty(&self) -> bool { self.ids.is_empty() }
	pub fn contains(&self, id: &str) -> bool { self.positions.contains_key(id) }

	/// Inserts or replaces the vector stored under `id`.
	pub fn upsert(&mut self, id: &str, vector: &[f32]) -> Result<()> {
		if vector.len() != self.dim {
			bail!("vector for {} has dim {}, index expects {}", id, vector.len(), self.dim);
		}
		match self.positions.get(id) {
			Some(&row) => {
				self.data[row * self.dim..(row + 1) * self.dim].copy_from_slice(vector);
			}
			None => {
				self.positions.insert(id.to_string(), self.ids.len());
				self.ids.push(id.to_string());
				self.data.extend_from_slice(vector);
			}
		}
		Ok(())
	}

	/// Drops every listed id that is present. Returns how many rows were removed.
	pub fn remove_ids(&mut self, ids: &HashSet<ChunkId>) -> usize {
		let mut removed = 0;
		for id in ids {
			let Some(row) = self.positions.remove(id) else { continue };
			let last = self.ids.len() - 1;
			if row != last {
				let (head, tail) = self.data.split_at_mut(last * self.dim);
				head[row * self.dim..(row + 1) * self.dim].copy_from_slice(&tail[..self.dim]);
				let moved = self.ids[last].clone();
				self.positions.insert(moved.clone(), row);
				self.ids[row] = moved;
			}
			self.ids.pop();
			self.data.truncate(last * self.dim);
			removed += 1;
		}
		removed
	}

	/// Top `k` rows by inner product with `query`, best first; ties go to the smaller id.
	pub fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		if query.len() != self.dim {
			bail!("query has dim {}, index expects {}", query.len(), self.dim);
		}
		if k == 0 || self.is_empty() { return Ok(vec![]); }
		let mut scored: Vec<(f32, usize)> = self
			.data
			.chunks_exact(self.dim)
			.enumerate()
			.map(|(row, v)| (dot(v, query), row))
			.collect();
		scored.sort_by(|a, b| {
			b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then_with(|| self.ids[a.1].cmp(&self.ids[b.1]))
		});
		scored.truncate(k);
		Ok(scored
			.into_iter()
			.map(|(score, row)| SearchHit { id: self.ids[row].clone(), score, source: SourceKind::Vector })
			.collect())
	}
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| x * y).sum()
}
