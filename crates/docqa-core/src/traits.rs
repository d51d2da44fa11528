use crate::types::{ClauseType, GeneratedAnswer, ScoredCandidate, StructuredQuery};

/// Dense text encoder. Implementations must return L2-normalized vectors of
/// length `dim()`, and identical input must produce identical output.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Direct query/document relevance model (cross-encoder). Scores carry no
/// normalization guarantee.
pub trait PairScorer: Send + Sync {
    fn score_pairs(&self, query: &str, documents: &[&str]) -> anyhow::Result<Vec<f32>>;
}

/// Raw text generation backend used by the prompt-driven adapters.
pub trait TextCompletion: Send + Sync {
    fn complete(&self, prompt: &str) -> anyhow::Result<Completion>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: usize,
}

pub trait IntentExtractor: Send + Sync {
    fn extract(&self, query: &str, domain: Option<&str>) -> anyhow::Result<StructuredQuery>;
}

pub trait AnswerGenerator: Send + Sync {
    fn generate(
        &self,
        query: &str,
        evidence: &[ScoredCandidate],
        domain: Option<&str>,
    ) -> anyhow::Result<GeneratedAnswer>;
}

/// Labels one sentence; returns the clause type and an importance in `[0, 1]`.
pub trait ClauseClassifier: Send + Sync {
    fn classify(&self, sentence: &str, domain: Option<&str>) -> anyhow::Result<(ClauseType, f32)>;
}
