use docqa_core::traits::Embedder;
use docqa_embed::HashingEmbedder;
use docqa_vector::{EmbeddingCache, FlatVectorIndex};

#[test]
fn hashing_embeddings_find_overlapping_text() {
    let embedder = HashingEmbedder::new(256);
    let cache = EmbeddingCache::new(1_000, 32);
    let docs = vec![
        ("fire", "how to build a fire with tinder"),
        ("water", "boil water before drinking"),
        ("net", "computer networking and routing"),
    ];
    let texts: Vec<String> = docs.iter().map(|(_, t)| t.to_string()).collect();
    let vectors = cache.embed_all(&embedder, &texts).expect("embed");

    let mut index = FlatVectorIndex::new(embedder.dim());
    for ((id, _), v) in docs.iter().zip(&vectors) { index.upsert(id, v).expect("upsert"); }

    let q = embedder.embed_batch(&["build a fire".to_string()]).expect("query")[0].clone();
    let hits = index.search_vec(&q, 3).expect("search");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "fire");
    assert!(hits[0].score > hits[1].score);
}
