//! Question answering over ingested documents: the ingestion lifecycle and the
//! per-query pipeline (intent, retrieval, rerank, answer, query log).

pub mod answer;
pub mod ingest;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod service;

pub use ingest::{IngestRequest, Ingestor};
pub use orchestrator::{ClauseMatch, DecisionRationale, DegradedStage, QueryOrchestrator, QueryRequest, QueryResponse};
pub use service::DocQa;
