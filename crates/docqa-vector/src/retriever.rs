use std::sync::Arc;

use anyhow::Result;

use docqa_core::store::DocumentStore;
use docqa_core::traits::Embedder;
use docqa_core::types::{IndexHit, ScoredCandidate};

use crate::index::{l2_normalize, VectorIndex};

/// First-pass search: embed the query, scan the index, resolve chunk text.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    store: Arc<dyn DocumentStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, store: Arc<dyn DocumentStore>) -> Self {
        Self { embedder, index, store }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// Unit-length query embedding.
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self.embedder.embed(text)?;
        l2_normalize(&mut v);
        Ok(v)
    }

    /// Index hits for `query_text`. With `document_id`, fetches `2 * top_k`
    /// hits, keeps the ones from that document and truncates; a short result
    /// is returned as is.
    pub fn search_hits(&self, query_text: &str, top_k: usize, document_id: Option<&str>) -> Result<Vec<IndexHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embed_query(query_text)?;
        let hits = match document_id {
            None => self.index.search(&query, top_k)?,
            Some(doc) => {
                let mut hits = self.index.search(&query, top_k.saturating_mul(2))?;
                hits.retain(|h| h.document_id == doc);
                hits.truncate(top_k);
                hits
            }
        };
        Ok(hits)
    }

    /// Ranked candidates with their chunks loaded from the document store.
    /// Hits whose chunk is gone from the store are dropped.
    pub fn search(&self, query_text: &str, top_k: usize, document_id: Option<&str>) -> Result<Vec<ScoredCandidate>> {
        let hits = self.search_hits(query_text, top_k, document_id)?;
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get_chunk(&hit.chunk_id)? {
                Some(chunk) => out.push(ScoredCandidate::new(chunk, hit.score)),
                None => tracing::warn!(chunk_id = %hit.chunk_id, slot_id = hit.slot_id, "live index entry without stored chunk"),
            }
        }
        tracing::debug!(candidates = out.len(), top_k, scoped = document_id.is_some(), "retrieval done");
        Ok(out)
    }
}
