use std::sync::Arc;

use docqa_core::store::{DocumentStore, JsonDocumentStore};
use docqa_core::traits::Embedder;
use docqa_core::types::Chunk;
use docqa_embed::HashEmbedder;
use docqa_vector::{Retriever, VectorIndex};

fn chunk(doc: &str, idx: usize, text: &str) -> Chunk {
    Chunk {
        chunk_id: Chunk::make_id(doc, idx),
        document_id: doc.into(),
        chunk_index: idx,
        text: text.into(),
        word_count: text.split_whitespace().count(),
        char_count: text.chars().count(),
        page_number: None,
        section: None,
        key_phrases: vec![],
    }
}

fn setup(chunks: Vec<Chunk>) -> (Retriever, Arc<VectorIndex>, Arc<JsonDocumentStore>) {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
    let index = Arc::new(VectorIndex::new(64).unwrap());
    let store = Arc::new(JsonDocumentStore::in_memory());
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).unwrap();
    let items: Vec<_> = chunks.iter().map(|c| c.chunk_ref()).zip(vectors).collect();
    index.add(&items).unwrap();
    store.put_chunks(chunks).unwrap();
    let retriever = Retriever::new(embedder, Arc::clone(&index), store.clone());
    (retriever, index, store)
}

#[test]
fn query_embedding_is_unit_length() {
    let (retriever, _, _) = setup(vec![]);
    let v = retriever.embed_query("flood damage").unwrap();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn best_match_comes_first() {
    let (retriever, _, _) = setup(vec![
        chunk("a", 0, "flood damage to the basement is covered"),
        chunk("a", 1, "parking rules for visitors"),
        chunk("b", 0, "fire damage requires a police report"),
    ]);
    let hits = retriever.search("flood damage basement", 2, None).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.chunk_id, "a_0");
    assert!((hits[0].combined_score - hits[0].similarity_score).abs() < 1e-6);
}

#[test]
fn document_filter_never_pads_with_other_documents() {
    let mut chunks = vec![chunk("target", 0, "water damage claim")];
    for i in 0..6 {
        chunks.push(chunk("noise", i, &format!("water damage claim variant {i}")));
    }
    let (retriever, _, _) = setup(chunks);
    let hits = retriever.search("water damage claim", 3, Some("target")).unwrap();
    assert!(hits.len() <= 3);
    assert!(hits.iter().all(|h| h.chunk.document_id == "target"));
}

#[test]
fn deleted_documents_and_missing_chunks_are_not_returned() {
    let (retriever, index, store) = setup(vec![
        chunk("a", 0, "theft of bicycles is covered"),
        chunk("b", 0, "theft of cars is excluded"),
        chunk("c", 0, "theft reporting deadline"),
    ]);
    index.mark_deleted("a").unwrap();
    store.remove_document("c").unwrap();
    let hits = retriever.search("theft", 10, None).unwrap();
    let docs: Vec<&str> = hits.iter().map(|h| h.chunk.document_id.as_str()).collect();
    assert_eq!(docs, vec!["b"]);
}
