//! Second-pass reranking of retrieved candidates.
//!
//! The scoring mode is picked once from what is available at startup:
//! a pairwise relevance model when one loaded, otherwise separate query and
//! document embeddings compared by inner product. Each mode carries its own
//! fixed fusion weights.

use std::fmt;
use std::sync::Arc;

use anyhow::{ensure, Result};

use docqa_core::traits::{Embedder, PairScorer};
use docqa_core::types::ScoredCandidate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub similarity: f32,
    pub rerank: f32,
}

impl FusionWeights {
    pub fn combine(self, similarity: f32, rerank: f32) -> f32 {
        self.similarity * similarity + self.rerank * rerank
    }
}

pub const PAIRWISE_WEIGHTS: FusionWeights = FusionWeights { similarity: 0.3, rerank: 0.7 };
pub const EMBEDDING_WEIGHTS: FusionWeights = FusionWeights { similarity: 0.5, rerank: 0.5 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankMode {
    Pairwise,
    EmbeddingSimilarity,
}

impl fmt::Display for RerankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RerankMode::Pairwise => write!(f, "pairwise"),
            RerankMode::EmbeddingSimilarity => write!(f, "embedding-similarity"),
        }
    }
}

#[derive(Clone)]
pub enum Reranker {
    Pairwise(Arc<dyn PairScorer>),
    EmbeddingSimilarity(Arc<dyn Embedder>),
}

impl Reranker {
    /// Pairwise when a scorer is supplied, embedding similarity otherwise.
    pub fn select(pair_scorer: Option<Arc<dyn PairScorer>>, embedder: Arc<dyn Embedder>) -> Self {
        let reranker = match pair_scorer {
            Some(scorer) => Reranker::Pairwise(scorer),
            None => Reranker::EmbeddingSimilarity(embedder),
        };
        tracing::info!(mode = %reranker.mode(), "reranker ready");
        reranker
    }

    pub fn mode(&self) -> RerankMode {
        match self {
            Reranker::Pairwise(_) => RerankMode::Pairwise,
            Reranker::EmbeddingSimilarity(_) => RerankMode::EmbeddingSimilarity,
        }
    }

    pub fn weights(&self) -> FusionWeights {
        match self {
            Reranker::Pairwise(_) => PAIRWISE_WEIGHTS,
            Reranker::EmbeddingSimilarity(_) => EMBEDDING_WEIGHTS,
        }
    }

    /// Score, fuse, stable-sort by `combined_score` descending and keep `top_k`.
    /// A non-finite fused score becomes `f32::NEG_INFINITY`.
    pub fn rerank(&self, query: &str, mut candidates: Vec<ScoredCandidate>, top_k: usize) -> Result<Vec<ScoredCandidate>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let docs: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        let scores = self.scores(query, &docs)?;
        ensure!(
            scores.len() == candidates.len(),
            "{} scorer returned {} scores for {} candidates",
            self.mode(),
            scores.len(),
            candidates.len()
        );

        let weights = self.weights();
        for (c, s) in candidates.iter_mut().zip(scores) {
            c.rerank_score = s;
            let combined = weights.combine(c.similarity_score, s);
            // NaN from the scorer sorts last
            c.combined_score = if combined.is_finite() { combined } else { f32::NEG_INFINITY };
        }
        candidates.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        candidates.truncate(top_k);
        Ok(candidates)
    }

    pub fn score_pair(&self, query: &str, document: &str) -> Result<f32> {
        let scores = self.scores(query, &[document])?;
        scores.into_iter().next().ok_or_else(|| anyhow::anyhow!("scorer returned no score"))
    }

    /// Scores for independent `(query, document)` pairs.
    pub fn batch_score(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        match self {
            Reranker::Pairwise(scorer) => pairs
                .iter()
                .map(|(q, d)| {
                    scorer
                        .score_pairs(q, &[*d])?
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("scorer returned no score"))
                })
                .collect(),
            Reranker::EmbeddingSimilarity(embedder) => {
                let queries: Vec<String> = pairs.iter().map(|(q, _)| q.to_string()).collect();
                let docs: Vec<String> = pairs.iter().map(|(_, d)| d.to_string()).collect();
                let qv = embedder.embed_batch(&queries)?;
                let dv = embedder.embed_batch(&docs)?;
                ensure!(qv.len() == pairs.len() && dv.len() == pairs.len(), "embedder returned a short batch");
                Ok(qv.iter().zip(&dv).map(|(q, d)| dot(q, d)).collect())
            }
        }
    }

    fn scores(&self, query: &str, docs: &[&str]) -> Result<Vec<f32>> {
        match self {
            Reranker::Pairwise(scorer) => scorer.score_pairs(query, docs),
            Reranker::EmbeddingSimilarity(embedder) => {
                let q = embedder.embed(query)?;
                let texts: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
                let vectors = embedder.embed_batch(&texts)?;
                Ok(vectors.iter().map(|v| dot(&q, v)).collect())
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
