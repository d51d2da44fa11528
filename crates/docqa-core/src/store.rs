//! Canonical document store: document records, their chunks and clauses.
//!
//! `JsonDocumentStore` keeps everything in memory and, when opened with a path,
//! snapshots the whole state to one JSON file on `persist()`. Writes go through
//! a temp file in the same directory followed by a rename.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, ClauseRecord, DocumentId, DocumentInfo};

pub trait DocumentStore: Send + Sync {
    fn put_document(&self, info: DocumentInfo) -> Result<()>;
    fn get_document(&self, document_id: &str) -> Result<Option<DocumentInfo>>;
    /// Ordered by upload time, oldest first.
    fn list_documents(&self, domain: Option<&str>, limit: usize) -> Result<Vec<DocumentInfo>>;
    fn document_ids(&self) -> Result<HashSet<DocumentId>>;

    fn put_chunks(&self, chunks: Vec<Chunk>) -> Result<()>;
    fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;
    /// Ordered by `chunk_index`.
    fn document_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>>;

    fn put_clauses(&self, clauses: Vec<ClauseRecord>) -> Result<()>;
    fn chunk_clauses(&self, chunk_id: &str) -> Result<Vec<ClauseRecord>>;

    /// Drops the document with all its chunks and clauses. `false` when unknown.
    fn remove_document(&self, document_id: &str) -> Result<bool>;
    fn persist(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    documents: BTreeMap<DocumentId, DocumentInfo>,
    chunks: BTreeMap<ChunkId, Chunk>,
    clauses: BTreeMap<ChunkId, Vec<ClauseRecord>>,
}

pub struct JsonDocumentStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl JsonDocumentStore {
    pub fn in_memory() -> Self {
        Self { path: None, state: RwLock::new(StoreState::default()) }
    }

    /// Load the snapshot at `path`; a missing file starts an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let state: StoreState = serde_json::from_slice(&bytes)?;
            tracing::info!(path = %path.display(), documents = state.documents.len(), chunks = state.chunks.len(), "document store loaded");
            state
        } else {
            tracing::info!(path = %path.display(), "no document store snapshot; starting empty");
            StoreState::default()
        };
        Ok(Self { path: Some(path), state: RwLock::new(state) })
    }

    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| Error::Operation("document store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| Error::Operation("document store lock poisoned".into()))
    }
}

impl DocumentStore for JsonDocumentStore {
    fn put_document(&self, info: DocumentInfo) -> Result<()> {
        self.write()?.documents.insert(info.document_id.clone(), info);
        Ok(())
    }

    fn get_document(&self, document_id: &str) -> Result<Option<DocumentInfo>> {
        Ok(self.read()?.documents.get(document_id).cloned())
    }

    fn list_documents(&self, domain: Option<&str>, limit: usize) -> Result<Vec<DocumentInfo>> {
        let state = self.read()?;
        let mut docs: Vec<DocumentInfo> = state
            .documents
            .values()
            .filter(|d| domain.map_or(true, |want| d.domain.as_deref() == Some(want)))
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.upload_timestamp.cmp(&b.upload_timestamp).then_with(|| a.document_id.cmp(&b.document_id)));
        docs.truncate(limit);
        Ok(docs)
    }

    fn document_ids(&self) -> Result<HashSet<DocumentId>> {
        Ok(self.read()?.documents.keys().cloned().collect())
    }

    fn put_chunks(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut state = self.write()?;
        for chunk in chunks {
            state.chunks.insert(chunk.chunk_id.clone(), chunk);
        }
        Ok(())
    }

    fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self.read()?.chunks.get(chunk_id).cloned())
    }

    fn document_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let mut chunks: Vec<Chunk> = state.chunks.values().filter(|c| c.document_id == document_id).cloned().collect();
        chunks.sort_by_key(|c| c.chunk_index);
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    fn put_clauses(&self, clauses: Vec<ClauseRecord>) -> Result<()> {
        let mut state = self.write()?;
        for clause in clauses {
            state.clauses.entry(clause.chunk_id.clone()).or_default().push(clause);
        }
        Ok(())
    }

    fn chunk_clauses(&self, chunk_id: &str) -> Result<Vec<ClauseRecord>> {
        Ok(self.read()?.clauses.get(chunk_id).cloned().unwrap_or_default())
    }

    fn remove_document(&self, document_id: &str) -> Result<bool> {
        let mut state = self.write()?;
        let existed = state.documents.remove(document_id).is_some();
        let before = state.chunks.len();
        state.chunks.retain(|_, c| c.document_id != document_id);
        let removed_chunks = before - state.chunks.len();
        state.clauses.retain(|_, list| list.first().map_or(false, |c| c.document_id != document_id));
        if existed || removed_chunks > 0 {
            tracing::debug!(document_id, removed_chunks, "document removed from store");
        }
        Ok(existed || removed_chunks > 0)
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let bytes = {
            let state = self.read()?;
            serde_json::to_vec(&*state)?
        };
        write_atomic(path, &bytes)
    }
}

/// Write `bytes` to `path` by way of a sibling temp file and a rename, so
/// readers see either the old content or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Storage(format!("rename into {}: {}", path.display(), e.error)))?;
    Ok(())
}
