//! Document lifecycle: ingest, replace, delete and startup reconciliation.
//!
//! The document store and the vector index are two separate writes. Order is
//! chosen so a crash between them never leaves a live index entry without its
//! chunk: chunks are stored before their embeddings are added, and index
//! entries are deleted before their chunks are removed. [`Ingestor::reconcile`]
//! cleans up whatever a crash still leaves behind.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, ensure, Result};
use chrono::Utc;
use uuid::Uuid;

use docqa_core::chunker::Chunker;
use docqa_core::clauses::extract_clauses;
use docqa_core::fallback::WithFallback;
use docqa_core::store::DocumentStore;
use docqa_core::text::{detect_section, estimate_page, key_phrases};
use docqa_core::traits::{ClauseClassifier, Embedder};
use docqa_core::types::{Chunk, ClauseRecord, DocumentInfo, ProcessingStatus};
use docqa_vector::{l2_normalize, VectorIndex};

const EMBED_BATCH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    /// Generated (uuid v4) when absent.
    pub document_id: Option<String>,
    pub filename: String,
    /// Already-extracted plain text.
    pub text: String,
    pub domain: Option<String>,
    pub total_pages: Option<u32>,
}

impl IngestRequest {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self { document_id: None, filename: filename.into(), text: text.into(), domain: None, total_pages: None }
    }
}

pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    store: Arc<dyn DocumentStore>,
    clauses: WithFallback<dyn ClauseClassifier>,
    lifecycle: Mutex<()>,
}

impl Ingestor {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            chunker,
            embedder,
            index,
            store,
            clauses: WithFallback::fallback_only("clauses"),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn with_clause_classifier(mut self, classifier: Arc<dyn ClauseClassifier>) -> Self {
        self.clauses = WithFallback::new("clauses", classifier);
        self
    }

    /// Chunk, embed and index a new document. The returned record is
    /// `completed`; on failure the record is kept as `failed` and the error
    /// is returned.
    pub fn ingest(&self, request: IngestRequest) -> Result<DocumentInfo> {
        let _guard = self.lock()?;
        let document_id = request.document_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.store.get_document(&document_id)?.is_some() {
            bail!("document {document_id} already exists; use replace_document");
        }
        self.ingest_locked(document_id, request)
    }

    /// Retire every entry of `document_id` (persisted before anything new is
    /// added), then ingest `request` under the same id.
    pub fn replace_document(&self, document_id: &str, request: IngestRequest) -> Result<DocumentInfo> {
        let _guard = self.lock()?;
        let retired = self.index.delete_and_persist(document_id)?;
        self.store.remove_document(document_id)?;
        self.store.persist()?;
        tracing::info!(document_id, retired, "replacing document");
        self.ingest_locked(document_id.to_string(), request)
    }

    /// Returns `false` when nothing was known about `document_id`.
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let retired = self.index.delete_and_persist(document_id)?;
        let existed = self.store.remove_document(document_id)?;
        self.store.persist()?;
        tracing::info!(document_id, retired, existed, "document deleted");
        Ok(existed || retired > 0)
    }

    /// Repairs the store/index pairing after an unclean shutdown:
    /// - live index entries whose document is gone from the store are deleted;
    /// - documents stuck in `processing` lose their chunks and become `failed`.
    ///
    /// Returns the number of index entries retired.
    pub fn reconcile(&self) -> Result<usize> {
        let _guard = self.lock()?;
        let known = self.store.document_ids()?;
        let mut retired = 0;
        for orphan in self.index.live_documents()?.difference(&known) {
            retired += self.index.mark_deleted(orphan)?;
        }

        let mut repaired = 0;
        for doc in self.store.list_documents(None, usize::MAX)? {
            if doc.processing_status != ProcessingStatus::Processing {
                continue;
            }
            retired += self.index.mark_deleted(&doc.document_id)?;
            self.store.remove_document(&doc.document_id)?;
            self.store.put_document(DocumentInfo {
                processing_status: ProcessingStatus::Failed,
                total_chunks: 0,
                error: Some("ingest interrupted".to_string()),
                ..doc
            })?;
            repaired += 1;
        }

        if retired > 0 || repaired > 0 {
            self.index.persist()?;
            self.store.persist()?;
            tracing::warn!(retired, repaired, "reconciled index with document store");
        }
        Ok(retired)
    }

    pub fn get_document(&self, document_id: &str) -> Result<Option<DocumentInfo>> {
        Ok(self.store.get_document(document_id)?)
    }

    pub fn list_documents(&self, domain: Option<&str>, limit: usize) -> Result<Vec<DocumentInfo>> {
        Ok(self.store.list_documents(domain, limit)?)
    }

    pub fn get_document_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>> {
        Ok(self.store.document_chunks(document_id, limit)?)
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self.store.get_chunk(chunk_id)?)
    }

    pub fn get_chunk_clauses(&self, chunk_id: &str) -> Result<Vec<ClauseRecord>> {
        Ok(self.store.chunk_clauses(chunk_id)?)
    }

    fn ingest_locked(&self, document_id: String, request: IngestRequest) -> Result<DocumentInfo> {
        let mut info = DocumentInfo {
            document_id: document_id.clone(),
            filename: request.filename.clone(),
            domain: request.domain.clone(),
            upload_timestamp: Utc::now(),
            processing_status: ProcessingStatus::Processing,
            total_chunks: 0,
            total_pages: request.total_pages,
            error: None,
        };
        self.store.put_document(info.clone())?;

        match self.index_document(&document_id, &request) {
            Ok(total_chunks) => {
                info.processing_status = ProcessingStatus::Completed;
                info.total_chunks = total_chunks;
                self.store.put_document(info.clone())?;
                self.index.persist()?;
                self.store.persist()?;
                tracing::info!(document_id = %document_id, total_chunks, "document ingested");
                Ok(info)
            }
            Err(e) => {
                tracing::warn!(document_id = %document_id, error = %e, "ingest failed");
                self.index.mark_deleted(&document_id)?;
                self.store.remove_document(&document_id)?;
                info.processing_status = ProcessingStatus::Failed;
                info.error = Some(e.to_string());
                self.store.put_document(info)?;
                self.index.persist()?;
                self.store.persist()?;
                Err(e)
            }
        }
    }

    fn index_document(&self, document_id: &str, request: &IngestRequest) -> Result<usize> {
        let drafts = self.chunker.chunk(&request.text);
        let total = drafts.len();
        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .map(|d| Chunk {
                chunk_id: Chunk::make_id(document_id, d.chunk_index),
                document_id: document_id.to_string(),
                chunk_index: d.chunk_index,
                page_number: estimate_page(d.chunk_index, total, request.total_pages),
                section: detect_section(&d.text),
                key_phrases: key_phrases(&d.text),
                word_count: d.word_count,
                char_count: d.char_count,
                text: d.text,
            })
            .collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut vectors = Vec::with_capacity(total);
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts)?;
            ensure!(
                embedded.len() == texts.len(),
                "embedder returned {} vectors for {} chunks",
                embedded.len(),
                texts.len()
            );
            vectors.extend(embedded);
        }
        for v in &mut vectors {
            l2_normalize(v);
        }

        let clauses: Vec<ClauseRecord> = chunks
            .iter()
            .flat_map(|c| extract_clauses(c, &self.clauses, request.domain.as_deref()))
            .collect();
        let items: Vec<_> = chunks.iter().map(Chunk::chunk_ref).zip(vectors).collect();

        self.store.put_chunks(chunks)?;
        self.store.put_clauses(clauses)?;
        self.index.add(&items)?;
        Ok(total)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lifecycle.lock().map_err(|_| anyhow!("ingest lock poisoned"))
    }
}
