use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use docqa_core::chunker::Chunker;
use docqa_core::config::Settings;
use docqa_core::query_log::{JsonlQueryLog, QueryLog};
use docqa_core::store::{DocumentStore, JsonDocumentStore};
use docqa_core::traits::{Embedder, PairScorer, TextCompletion};
use docqa_embed::{load_embedder, load_pair_scorer};
use docqa_rerank::Reranker;
use docqa_vector::{IndexStats, Retriever, VectorIndex};

use crate::ingest::Ingestor;
use crate::llm::{LlmAnswerGenerator, LlmIntentExtractor};
use crate::orchestrator::QueryOrchestrator;

/// Ingestion and querying over one shared index and document store.
pub struct DocQa {
    ingestor: Ingestor,
    orchestrator: QueryOrchestrator,
    index: Arc<VectorIndex>,
}

impl DocQa {
    /// Load models, open the on-disk index and store under `base`, and
    /// reconcile the two.
    pub fn open(settings: &Settings, base: &Path) -> Result<Self> {
        settings.validate()?;
        let embedder = load_embedder(&settings.embedding, base)?;
        let pair_scorer = load_pair_scorer(&settings.rerank, base);
        let index = Arc::new(VectorIndex::open(settings.index_path(base), settings.embedding.dimension)?);
        let store: Arc<dyn DocumentStore> = Arc::new(JsonDocumentStore::open(settings.store_path(base))?);
        let query_log: Arc<dyn QueryLog> = Arc::new(JsonlQueryLog::new(settings.query_log_path(base)));
        Self::from_parts(settings, embedder, pair_scorer, index, store, Some(query_log))
    }

    pub fn from_parts(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        pair_scorer: Option<Arc<dyn PairScorer>>,
        index: Arc<VectorIndex>,
        store: Arc<dyn DocumentStore>,
        query_log: Option<Arc<dyn QueryLog>>,
    ) -> Result<Self> {
        let chunker = Chunker::from_settings(&settings.chunking)?;
        let ingestor = Ingestor::new(chunker, Arc::clone(&embedder), Arc::clone(&index), Arc::clone(&store));
        ingestor.reconcile()?;

        let reranker = Reranker::select(pair_scorer, Arc::clone(&embedder));
        let retriever = Retriever::new(embedder, Arc::clone(&index), store);
        let mut orchestrator =
            QueryOrchestrator::new(retriever, reranker, settings.retrieval.candidate_pool, settings.rerank.top_k);
        if let Some(log) = query_log {
            orchestrator = orchestrator.with_query_log(log);
        }
        Ok(Self { ingestor, orchestrator, index })
    }

    /// Route intent extraction and answer generation through `backend`.
    pub fn with_completion(mut self, backend: Arc<dyn TextCompletion>) -> Self {
        self.orchestrator = self
            .orchestrator
            .with_intent_extractor(Arc::new(LlmIntentExtractor::new(Arc::clone(&backend))))
            .with_answer_generator(Arc::new(LlmAnswerGenerator::new(backend)));
        self
    }

    pub fn ingestor(&self) -> &Ingestor { &self.ingestor }

    pub fn orchestrator(&self) -> &QueryOrchestrator { &self.orchestrator }

    pub fn stats(&self) -> Result<IndexStats> { Ok(self.index.stats()?) }

    /// Drop deleted rows from the index and persist the result.
    pub fn compact(&self) -> Result<usize> {
        let removed = self.index.compact()?;
        self.index.persist()?;
        Ok(removed)
    }
}
