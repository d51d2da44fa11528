use std::sync::Arc;

use docqa_core::chunker::ChunkStrategy;
use docqa_core::config::Settings;
use docqa_core::query_log::{MemoryQueryLog, QueryLog};
use docqa_core::store::{DocumentStore, JsonDocumentStore};
use docqa_core::traits::{AnswerGenerator, Completion, Embedder, IntentExtractor, PairScorer, TextCompletion};
use docqa_core::types::{Decision, GeneratedAnswer, QueryIntent, ScoredCandidate, StructuredQuery};
use docqa_embed::HashEmbedder;
use docqa_query::answer::INSUFFICIENT_INFORMATION;
use docqa_query::{DegradedStage, DocQa, IngestRequest, QueryOrchestrator, QueryRequest};
use docqa_rerank::Reranker;
use docqa_vector::{Retriever, VectorIndex};

const DIM: usize = 64;

struct DownEmbedder;

impl Embedder for DownEmbedder {
    fn dim(&self) -> usize { DIM }
    fn max_len(&self) -> usize { 128 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding model not loaded")
    }
}

struct DownScorer;

impl PairScorer for DownScorer {
    fn score_pairs(&self, _query: &str, _documents: &[&str]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("cross-encoder not loaded")
    }
}

struct DownIntent;

impl IntentExtractor for DownIntent {
    fn extract(&self, _query: &str, _domain: Option<&str>) -> anyhow::Result<StructuredQuery> {
        anyhow::bail!("generation backend unreachable")
    }
}

struct DownAnswers;

impl AnswerGenerator for DownAnswers {
    fn generate(&self, _q: &str, _e: &[ScoredCandidate], _d: Option<&str>) -> anyhow::Result<GeneratedAnswer> {
        anyhow::bail!("generation backend unreachable")
    }
}

/// Answers intent prompts and answer prompts with fixed JSON.
struct CannedCompletion;

impl TextCompletion for CannedCompletion {
    fn complete(&self, prompt: &str) -> anyhow::Result<Completion> {
        let text = if prompt.contains("Extract structured information") {
            r#"Here is the JSON: {"intent": "coverage_check", "subject": "dental", "keywords": ["dental"], "question_type": "yes_no"}"#
        } else {
            r#"{"answer": "Yes, dental treatment is covered.", "decision": "Yes", "confidence": 0.9,
               "reasoning": "Clause 1 says so.", "supporting_evidence": ["dental treatment is covered"],
               "key_factors": ["explicit coverage clause"]}"#
        };
        Ok(Completion { text: text.to_string(), total_tokens: 42 })
    }
}

struct GarbageCompletion;

impl TextCompletion for GarbageCompletion {
    fn complete(&self, _prompt: &str) -> anyhow::Result<Completion> {
        Ok(Completion { text: "I am not able to answer in JSON today.".into(), total_tokens: 7 })
    }
}

fn settings() -> Settings {
    let mut s = Settings::default();
    s.chunking.chunk_size = 40;
    s.chunking.overlap = 4;
    s.chunking.strategy = ChunkStrategy::Words;
    s.embedding.dimension = DIM;
    s.rerank.cross_encoder_dir = None;
    s
}

fn service(log: Option<Arc<dyn QueryLog>>) -> DocQa {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(VectorIndex::new(DIM).unwrap());
    let store: Arc<dyn DocumentStore> = Arc::new(JsonDocumentStore::in_memory());
    DocQa::from_parts(&settings(), embedder, None, index, store, log).unwrap()
}

fn ingest(qa: &DocQa, id: &str, text: &str) {
    let mut req = IngestRequest::new(format!("{id}.txt"), text);
    req.document_id = Some(id.to_string());
    qa.ingestor().ingest(req).unwrap();
}

#[test]
fn every_collaborator_down_still_answers() {
    let embedder: Arc<dyn Embedder> = Arc::new(DownEmbedder);
    let index = Arc::new(VectorIndex::new(DIM).unwrap());
    let store: Arc<dyn DocumentStore> = Arc::new(JsonDocumentStore::in_memory());
    let retriever = Retriever::new(Arc::clone(&embedder), index, store);
    let reranker = Reranker::select(Some(Arc::new(DownScorer)), embedder);
    let orchestrator = QueryOrchestrator::new(retriever, reranker, 20, 5)
        .with_intent_extractor(Arc::new(DownIntent))
        .with_answer_generator(Arc::new(DownAnswers));

    let resp = orchestrator.process_query(&QueryRequest::new("Does the policy cover flood damage?"));
    assert_eq!(resp.answer, INSUFFICIENT_INFORMATION);
    assert_eq!(resp.decision, Some(Decision::Unclear));
    assert!(resp.matched_clauses.is_empty());
    assert!(resp.rationale.confidence_score <= 0.1 + 1e-6);
    assert!(!resp.rationale.reasoning.is_empty());
    assert!(!resp.rationale.key_factors.is_empty());
    assert_eq!(resp.structured_query.intent, QueryIntent::CoverageCheck);
    assert_eq!(
        resp.degraded_stages,
        vec![DegradedStage::Intent, DegradedStage::Retrieval, DegradedStage::Answer]
    );
    assert!(!resp.query_id.is_empty());
}

#[test]
fn rerank_failure_yields_empty_evidence() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(VectorIndex::new(DIM).unwrap());
    let store: Arc<dyn DocumentStore> = Arc::new(JsonDocumentStore::in_memory());
    let qa = DocQa::from_parts(&settings(), Arc::clone(&embedder), None, Arc::clone(&index), Arc::clone(&store), None).unwrap();
    ingest(&qa, "policy", "Flood damage to the basement is covered.");

    let retriever = Retriever::new(Arc::clone(&embedder), index, store);
    let reranker = Reranker::select(Some(Arc::new(DownScorer)), embedder);
    let orchestrator = QueryOrchestrator::new(retriever, reranker, 20, 5);
    let resp = orchestrator.process_query(&QueryRequest::new("flood damage"));
    assert!(resp.matched_clauses.is_empty());
    assert!(resp.degraded_stages.contains(&DegradedStage::Rerank));
    assert_eq!(resp.answer, INSUFFICIENT_INFORMATION);
}

#[test]
fn empty_index_reports_insufficient_information() {
    let qa = service(None);
    let resp = qa.orchestrator().process_query(&QueryRequest::new("What is the grace period?"));
    assert_eq!(resp.answer, INSUFFICIENT_INFORMATION);
    assert!(resp.matched_clauses.is_empty());
    assert!(!resp.degraded_stages.contains(&DegradedStage::Retrieval));
}

#[test]
fn scoped_query_uses_only_that_document() {
    let qa = service(None);
    ingest(&qa, "dental", "Dental treatment is covered up to the annual limit.");
    ingest(&qa, "travel", "Dental treatment abroad is excluded from travel benefits.");

    let resp = qa
        .orchestrator()
        .process_query(&QueryRequest::new("Is dental treatment covered?").for_document("dental"));
    assert_eq!(resp.matched_clauses.len(), 1);
    assert_eq!(resp.matched_clauses[0].clause_id, "dental_0");
    assert_eq!(resp.decision, Some(Decision::Yes));
    assert!(resp.rationale.confidence_score <= 0.7 + 1e-6);
    assert!(resp.answer.starts_with("Based on the most relevant document section"));
}

#[test]
fn max_results_bounds_the_evidence() {
    let qa = service(None);
    for i in 0..4 {
        ingest(&qa, &format!("doc{i}"), &format!("Water damage claim number {i} must be filed within thirty days."));
    }
    let resp = qa.orchestrator().process_query(&QueryRequest::new("water damage claim").with_max_results(2));
    assert_eq!(resp.matched_clauses.len(), 2);
    let scores: Vec<f32> = resp.matched_clauses.iter().map(|m| m.relevance_score).collect();
    assert!(scores[0] >= scores[1]);
}

#[test]
fn deleted_document_is_never_evidence() {
    let qa = service(None);
    ingest(&qa, "old", "Theft of bicycles is covered when locked.");
    ingest(&qa, "new", "Theft of bicycles is excluded.");
    assert!(qa.ingestor().delete_document("old").unwrap());

    let resp = qa.orchestrator().process_query(&QueryRequest::new("theft of bicycles"));
    assert!(!resp.matched_clauses.is_empty());
    assert!(resp.matched_clauses.iter().all(|m| m.clause_id.starts_with("new_")));
}

#[test]
fn llm_backend_drives_intent_and_answer() {
    let qa = service(None).with_completion(Arc::new(CannedCompletion));
    ingest(&qa, "dental", "Dental treatment is covered up to the annual limit.");

    let resp = qa.orchestrator().process_query(&QueryRequest::new("Is dental covered?").in_domain("insurance"));
    assert_eq!(resp.answer, "Yes, dental treatment is covered.");
    assert_eq!(resp.decision, Some(Decision::Yes));
    assert!((resp.rationale.confidence_score - 0.9).abs() < 1e-6);
    assert_eq!(resp.token_usage.map(|t| t.total_tokens), Some(42));
    assert_eq!(resp.structured_query.subject, "dental");
    assert!(resp.degraded_stages.is_empty());
}

#[test]
fn unparseable_completion_falls_back_to_rules() {
    let qa = service(None).with_completion(Arc::new(GarbageCompletion));
    let resp = qa.orchestrator().process_query(&QueryRequest::new("Is dental covered?"));
    assert_eq!(resp.degraded_stages, vec![DegradedStage::Intent, DegradedStage::Answer]);
    assert_eq!(resp.structured_query.intent, QueryIntent::CoverageCheck);
    assert_eq!(resp.answer, INSUFFICIENT_INFORMATION);
}

#[test]
fn answered_queries_are_logged() {
    let log = Arc::new(MemoryQueryLog::default());
    let qa = service(Some(log.clone() as Arc<dyn QueryLog>));
    ingest(&qa, "dental", "Dental treatment is covered up to the annual limit.");

    let resp = qa
        .orchestrator()
        .process_query(&QueryRequest::new("dental limit").for_document("dental").in_domain("insurance"));
    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].query_id, resp.query_id);
    assert_eq!(entries[0].query_text, "dental limit");
    assert_eq!(entries[0].document_id.as_deref(), Some("dental"));
    assert_eq!(entries[0].response["answer"], resp.answer.as_str());
}

#[test]
fn batch_questions_answer_in_order() {
    let qa = service(None);
    ingest(&qa, "policy", "Emergency dental treatment is covered. Cosmetic surgery is excluded.");
    let questions = vec!["Is dental covered?".to_string(), "Who is the insurer?".to_string()];
    let answers = qa.orchestrator().answer_questions("policy", &questions, Some("insurance"));
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().all(|a| a.starts_with("Based on the most relevant document section")));
}
