//! Domain types shared by the chunker, vector index, reranker and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChunkId = String;
pub type DocumentId = String;
pub type SlotId = u64;

/// Output of the chunker before a chunk is attached to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub chunk_index: usize,
    pub text: String,
    pub word_count: usize,
    pub char_count: usize,
}

/// A chunk of a source document; the atomic retrieval unit.
///
/// - `chunk_id`: `"{document_id}_{chunk_index}"`
/// - `chunk_index`: 0-based, contiguous within the document
/// - `page_number`: best-effort estimate, never relied upon for correctness
/// - `section`: nearest heading-like line inside the chunk, if any
/// - `key_phrases`: up to ten rule-extracted phrases
///
/// Chunks are immutable once stored and only disappear with their document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub text: String,
    pub word_count: usize,
    pub char_count: usize,
    pub page_number: Option<u32>,
    pub section: Option<String>,
    pub key_phrases: Vec<String>,
}

impl Chunk {
    pub fn make_id(document_id: &str, chunk_index: usize) -> ChunkId {
        format!("{document_id}_{chunk_index}")
    }

    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef { chunk_id: self.chunk_id.clone(), document_id: self.document_id.clone() }
    }
}

/// The slice of chunk identity the vector index keeps next to each embedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRef {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
}

/// One ranked result of a vector index search. Higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub slot_id: SlotId,
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub score: f32,
}

/// A retrieved chunk flowing through reranking. Created per query, never persisted.
///
/// `similarity_score` is the cosine score from the index. `rerank_score` and
/// `combined_score` are filled in by the reranker; until then `combined_score`
/// mirrors the similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub chunk: Chunk,
    pub similarity_score: f32,
    pub rerank_score: f32,
    pub combined_score: f32,
}

impl ScoredCandidate {
    pub fn new(chunk: Chunk, similarity_score: f32) -> Self {
        Self { chunk, similarity_score, rerank_score: 0.0, combined_score: similarity_score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Failed,
}

/// Canonical record of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: DocumentId,
    pub filename: String,
    pub domain: Option<String>,
    pub upload_timestamp: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub total_chunks: usize,
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseType {
    Coverage,
    Exclusion,
    Condition,
    General,
}

/// A sentence-level clause extracted from a chunk at ingest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseRecord {
    pub clause_id: String,
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
    pub clause_type: ClauseType,
    pub summary: String,
    pub key_terms: Vec<String>,
    pub importance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    CoverageCheck,
    ExclusionCheck,
    ConditionCheck,
    GeneralInquiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    YesNo,
    Conditional,
    Explanatory,
}

/// Coarse structure pulled out of a natural-language question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub intent: QueryIntent,
    pub subject: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub question_type: QuestionType,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub context_clues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Yes,
    No,
    Partial,
    Unclear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: usize,
}

/// What the answer-generation collaborator hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default)]
    pub decision: Option<Decision>,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default)]
    pub conflicting_evidence: Vec<String>,
    #[serde(default)]
    pub key_factors: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
}
