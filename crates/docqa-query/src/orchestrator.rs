use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docqa_core::fallback::WithFallback;
use docqa_core::query_log::{QueryLog, QueryLogEntry};
use docqa_core::traits::{AnswerGenerator, IntentExtractor};
use docqa_core::types::{Decision, ScoredCandidate, StructuredQuery, TokenUsage};
use docqa_rerank::Reranker;
use docqa_vector::Retriever;

use crate::answer::rule_based_answer;
use crate::intent::rule_based_intent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    /// Evidence list length; the orchestrator's default `top_k` when absent.
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), document_id: None, domain: None, max_results: None }
    }

    pub fn for_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn in_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = Some(n);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseMatch {
    pub clause_id: String,
    pub clause_text: String,
    pub relevance_score: f32,
    pub page_number: Option<u32>,
    pub section: Option<String>,
}

impl From<&ScoredCandidate> for ClauseMatch {
    fn from(c: &ScoredCandidate) -> Self {
        Self {
            clause_id: c.chunk.chunk_id.clone(),
            clause_text: c.chunk.text.clone(),
            relevance_score: c.combined_score,
            page_number: c.chunk.page_number,
            section: c.chunk.section.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRationale {
    pub reasoning: String,
    pub supporting_clauses: Vec<String>,
    pub conflicting_clauses: Vec<String>,
    pub confidence_score: f32,
    pub key_factors: Vec<String>,
}

/// Pipeline stages that did not run on their primary path for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedStage {
    Intent,
    Retrieval,
    Rerank,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: String,
    pub query: String,
    pub answer: String,
    pub decision: Option<Decision>,
    pub matched_clauses: Vec<ClauseMatch>,
    pub rationale: DecisionRationale,
    pub structured_query: StructuredQuery,
    pub processing_time_ms: u64,
    pub token_usage: Option<TokenUsage>,
    pub degraded_stages: Vec<DegradedStage>,
    pub timestamp: DateTime<Utc>,
}

impl QueryResponse {
    pub fn is_degraded(&self) -> bool { !self.degraded_stages.is_empty() }
}

/// Runs one query through intent extraction, retrieval, reranking and answer
/// generation. Every stage with an external dependency has a rule-based
/// fallback, so [`QueryOrchestrator::process_query`] always returns a response.
pub struct QueryOrchestrator {
    retriever: Retriever,
    reranker: Reranker,
    intent: WithFallback<dyn IntentExtractor>,
    answers: WithFallback<dyn AnswerGenerator>,
    query_log: Option<Arc<dyn QueryLog>>,
    candidate_pool: usize,
    top_k: usize,
}

impl QueryOrchestrator {
    /// Rule-based intent and answers until collaborators are attached.
    pub fn new(retriever: Retriever, reranker: Reranker, candidate_pool: usize, top_k: usize) -> Self {
        Self {
            retriever,
            reranker,
            intent: WithFallback::fallback_only("intent"),
            answers: WithFallback::fallback_only("answer"),
            query_log: None,
            candidate_pool,
            top_k,
        }
    }

    pub fn with_intent_extractor(mut self, extractor: Arc<dyn IntentExtractor>) -> Self {
        self.intent = WithFallback::new("intent", extractor);
        self
    }

    pub fn with_answer_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.answers = WithFallback::new("answer", generator);
        self
    }

    pub fn with_query_log(mut self, log: Arc<dyn QueryLog>) -> Self {
        self.query_log = Some(log);
        self
    }

    pub fn reranker(&self) -> &Reranker { &self.reranker }

    pub fn process_query(&self, request: &QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let query_id = Uuid::new_v4().to_string();
        let query = request.query.as_str();
        let domain = request.domain.as_deref();
        let top_k = request.max_results.unwrap_or(self.top_k);
        let mut degraded = Vec::new();

        let (structured_query, provenance) =
            self.intent.run(|x| x.extract(query, domain), || rule_based_intent(query, domain));
        if provenance.is_fallback() {
            degraded.push(DegradedStage::Intent);
        }

        let evidence = self.ranked_evidence(query, request.document_id.as_deref(), top_k, &mut degraded);

        let (generated, provenance) =
            self.answers.run(|g| g.generate(query, &evidence, domain), || rule_based_answer(query, &evidence));
        if provenance.is_fallback() {
            degraded.push(DegradedStage::Answer);
        }

        let response = QueryResponse {
            query_id,
            query: query.to_string(),
            answer: generated.answer,
            decision: generated.decision,
            matched_clauses: evidence.iter().map(ClauseMatch::from).collect(),
            rationale: DecisionRationale {
                reasoning: generated.reasoning,
                supporting_clauses: generated.supporting_evidence,
                conflicting_clauses: generated.conflicting_evidence,
                confidence_score: generated.confidence,
                key_factors: generated.key_factors,
            },
            structured_query,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            token_usage: generated.token_usage,
            degraded_stages: degraded,
            timestamp: Utc::now(),
        };
        tracing::info!(
            query_id = %response.query_id,
            evidence = response.matched_clauses.len(),
            degraded = ?response.degraded_stages,
            elapsed_ms = response.processing_time_ms,
            "query answered"
        );
        self.record(request, &response);
        response
    }

    /// Answers for several questions against one document, in order.
    pub fn answer_questions(&self, document_id: &str, questions: &[String], domain: Option<&str>) -> Vec<String> {
        questions
            .iter()
            .map(|q| {
                let mut request = QueryRequest::new(q.as_str()).for_document(document_id);
                request.domain = domain.map(str::to_string);
                self.process_query(&request).answer
            })
            .collect()
    }

    fn ranked_evidence(
        &self,
        query: &str,
        document_id: Option<&str>,
        top_k: usize,
        degraded: &mut Vec<DegradedStage>,
    ) -> Vec<ScoredCandidate> {
        if top_k == 0 {
            return Vec::new();
        }
        let pool = self.candidate_pool.max(top_k);
        let candidates = match self.retriever.search(query, pool, document_id) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed; answering without evidence");
                degraded.push(DegradedStage::Retrieval);
                return Vec::new();
            }
        };
        match self.reranker.rerank(query, candidates, top_k) {
            Ok(ranked) => ranked,
            Err(e) => {
                tracing::warn!(error = %e, mode = %self.reranker.mode(), "rerank failed; answering without evidence");
                degraded.push(DegradedStage::Rerank);
                Vec::new()
            }
        }
    }

    fn record(&self, request: &QueryRequest, response: &QueryResponse) {
        let Some(log) = &self.query_log else { return };
        let value = match serde_json::to_value(response) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query response not serializable; skipping query log");
                return;
            }
        };
        let entry = QueryLogEntry {
            query_id: response.query_id.clone(),
            query_text: request.query.clone(),
            document_id: request.document_id.clone(),
            domain: request.domain.clone(),
            response: value,
            processing_time_ms: response.processing_time_ms,
            token_usage: response.token_usage,
            timestamp: response.timestamp,
        };
        if let Err(e) = log.record(&entry) {
            tracing::warn!(error = %e, query_id = %response.query_id, "failed to write query log");
        }
    }
}
