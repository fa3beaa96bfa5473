use std::cmp::Ordering;
use std::collections::HashMap;

use docqa_core::types::{ChunkId, SearchHit, SourceKind};

/// Weighted reciprocal rank fusion.
///
/// Each ranked list contributes `weight / (rrf_k + rank)` per item, with
/// 1-based ranks. Raw engine scores are ignored, so BM25 and cosine scales never
/// have to be reconciled. Output is best first; equal scores order by id.
pub fn weighted_rrf(lists: &[(&[SearchHit], f32)], rrf_k: usize) -> Vec<SearchHit> {
    let mut scores: HashMap<&ChunkId, f32> = HashMap::new();
    for (hits, weight) in lists {
        if *weight <= 0.0 { continue; }
        for (i, hit) in hits.iter().enumerate() {
            let contribution = weight / (rrf_k as f32 + (i + 1) as f32);
            *scores.entry(&hit.id).or_insert(0.0) += contribution;
        }
    }
    let mut fused: Vec<SearchHit> = scores
        .into_iter()
        .map(|(id, score)| SearchHit { id: id.clone(), score, source: SourceKind::Hybrid })
        .collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(ids: &[&str], source: SourceKind) -> Vec<SearchHit> {
        ids.iter().map(|id| SearchHit { id: id.to_string(), score: 1.0, source }).collect()
    }

    #[test]
    fn item_in_both_lists_wins() {
        let v = hits(&["a", "b", "c"], SourceKind::Vector);
        let t = hits(&["c", "d"], SourceKind::Text);
        let fused = weighted_rrf(&[(v.as_slice(), 0.8), (t.as_slice(), 0.2)], 60);
        assert_eq!(fused[0].id, "c");
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn semantic_weight_dominates_single_list_items() {
        let v = hits(&["a"], SourceKind::Vector);
        let t = hits(&["b"], SourceKind::Text);
        let fused = weighted_rrf(&[(v.as_slice(), 0.8), (t.as_slice(), 0.2)], 60);
        assert_eq!(fused.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert!((fused[0].score - 0.8 / 61.0).abs() < 1e-7);
        assert!(fused.iter().all(|h| h.source == SourceKind::Hybrid));
    }

    #[test]
    fn exact_ties_order_by_id() {
        let v = hits(&["z"], SourceKind::Vector);
        let t = hits(&["y"], SourceKind::Text);
        let fused = weighted_rrf(&[(v.as_slice(), 0.5), (t.as_slice(), 0.5)], 60);
        assert_eq!(fused[0].id, "y");
    }

    #[test]
    fn zero_weight_list_is_ignored() {
        let v = hits(&["a"], SourceKind::Vector);
        let t = hits(&["b"], SourceKind::Text);
        let fused = weighted_rrf(&[(v.as_slice(), 1.0), (t.as_slice(), 0.0)], 60);
        assert_eq!(fused.len(), 1);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        let none: Vec<SearchHit> = Vec::new();
        assert!(weighted_rrf(&[(none.as_slice(), 0.8), (none.as_slice(), 0.2)], 60).is_empty());
    }
}
