use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use docqa_core::error::{Error, Result};
use docqa_core::types::{ChunkId, ChunkRef, DocumentId, IndexHit, SlotId};

use crate::snapshot::{self, LoadError};

/// Slot bookkeeping for one stored embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub slot_id: SlotId,
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_slots: usize,
    pub live_entries: usize,
    pub deleted_entries: usize,
    pub unique_documents: usize,
    pub dimension: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { entries: usize, live: usize },
    /// No snapshot on disk (or no path configured); the index is empty.
    Missing,
    /// The snapshot could not be trusted; the index was reset to empty.
    Corrupt(String),
}

#[derive(Default)]
struct IndexState {
    /// Row-major, `entries.len() * dim` values, same order as `entries`.
    rows: Vec<f32>,
    /// Sorted by `slot_id`.
    entries: Vec<IndexEntry>,
    /// Positions in `entries` per document.
    by_document: HashMap<DocumentId, Vec<usize>>,
    next_slot: SlotId,
}

impl IndexState {
    fn rebuild_document_map(&mut self) {
        self.by_document.clear();
        for (pos, e) in self.entries.iter().enumerate() {
            self.by_document.entry(e.document_id.clone()).or_default().push(pos);
        }
    }
}

/// Flat inner-product index over unit vectors with soft delete.
///
/// Slot ids are handed out from a counter that is persisted with the snapshot
/// and never reused. Deletion only flips a flag; rows stay in place until
/// [`VectorIndex::compact`] is called.
///
/// Mutations and persistence take `writer` first, so they are serialized with
/// each other. Searches only take the read side of `state` and run
/// concurrently with each other and with the serialization step of `persist`.
pub struct VectorIndex {
    dim: usize,
    snapshot_base: Option<PathBuf>,
    writer: Mutex<()>,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// In-memory index; `persist` is a no-op.
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("index dimension must be > 0".into()));
        }
        Ok(Self { dim, snapshot_base: None, writer: Mutex::new(()), state: RwLock::new(IndexState::default()) })
    }

    /// Index backed by the snapshot at `base`, restored immediately. A missing
    /// or unusable snapshot leaves the index empty.
    pub fn open(base: impl Into<PathBuf>, dim: usize) -> Result<Self> {
        let mut index = Self::new(dim)?;
        index.snapshot_base = Some(base.into());
        index.restore();
        Ok(index)
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn snapshot_base(&self) -> Option<&Path> { self.snapshot_base.as_deref() }

    /// Append embeddings; returns the assigned slot ids in input order.
    ///
    /// Every vector is checked before anything is written, so a dimension
    /// mismatch leaves the index untouched.
    pub fn add(&self, items: &[(ChunkRef, Vec<f32>)]) -> Result<Vec<SlotId>> {
        if let Some((_, v)) = items.iter().find(|(_, v)| v.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        let _w = self.lock_writer()?;
        let mut state = self.write_state()?;
        let mut slots = Vec::with_capacity(items.len());
        for (chunk, vector) in items {
            let slot_id = state.next_slot;
            state.next_slot += 1;
            let pos = state.entries.len();
            state.rows.extend_from_slice(vector);
            state.entries.push(IndexEntry {
                slot_id,
                chunk_id: chunk.chunk_id.clone(),
                document_id: chunk.document_id.clone(),
                deleted: false,
            });
            state.by_document.entry(chunk.document_id.clone()).or_default().push(pos);
            slots.push(slot_id);
        }
        tracing::debug!(added = slots.len(), next_slot = state.next_slot, "index add");
        Ok(slots)
    }

    /// Live entries by descending inner product, ties by ascending slot id.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<IndexHit>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let state = self.read_state()?;
        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.deleted)
            .map(|(pos, _)| (pos, dot(&state.rows[pos * self.dim..(pos + 1) * self.dim], query)))
            .collect();
        // entries are slot-ordered, so position order is slot order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored
            .into_iter()
            .map(|(pos, score)| {
                let e = &state.entries[pos];
                IndexHit { slot_id: e.slot_id, chunk_id: e.chunk_id.clone(), document_id: e.document_id.clone(), score }
            })
            .collect())
    }

    /// Soft-delete every entry of `document_id`; returns how many flipped.
    pub fn mark_deleted(&self, document_id: &str) -> Result<usize> {
        let _w = self.lock_writer()?;
        self.mark_deleted_locked(document_id)
    }

    /// `mark_deleted` followed by `persist` without releasing the writer lock,
    /// so no add can slip in between.
    pub fn delete_and_persist(&self, document_id: &str) -> Result<usize> {
        let _w = self.lock_writer()?;
        let flipped = self.mark_deleted_locked(document_id)?;
        self.persist_locked()?;
        Ok(flipped)
    }

    fn mark_deleted_locked(&self, document_id: &str) -> Result<usize> {
        let mut state = self.write_state()?;
        let state = &mut *state;
        let mut flipped = 0;
        if let Some(positions) = state.by_document.get(document_id) {
            for &pos in positions {
                if let Some(e) = state.entries.get_mut(pos) {
                    if !e.deleted {
                        e.deleted = true;
                        flipped += 1;
                    }
                }
            }
        }
        if flipped > 0 {
            tracing::info!(document_id, flipped, "index entries marked deleted");
        }
        Ok(flipped)
    }

    pub fn persist(&self) -> Result<()> {
        let _w = self.lock_writer()?;
        self.persist_locked()
    }

    fn persist_locked(&self) -> Result<()> {
        let Some(base) = &self.snapshot_base else { return Ok(()) };
        let state = self.read_state()?;
        snapshot::write(base, self.dim, state.next_slot, &state.entries, &state.rows)?;
        tracing::debug!(path = %base.display(), entries = state.entries.len(), "index persisted");
        Ok(())
    }

    /// Reload from the snapshot. Anything short of a valid snapshot resets the
    /// index to empty with a fresh slot counter; nothing is surfaced as an error.
    pub fn restore(&self) -> RestoreOutcome {
        let Ok(_w) = self.writer.lock() else {
            return RestoreOutcome::Corrupt("index writer lock poisoned".into());
        };
        let loaded = match &self.snapshot_base {
            Some(base) => snapshot::read(base, self.dim),
            None => Err(LoadError::Missing),
        };
        let (fresh, outcome) = match loaded {
            Ok(snap) => {
                let live = snap.entries.iter().filter(|e| !e.deleted).count();
                let outcome = RestoreOutcome::Restored { entries: snap.entries.len(), live };
                let mut st = IndexState { rows: snap.rows, entries: snap.entries, by_document: HashMap::new(), next_slot: snap.next_slot };
                st.rebuild_document_map();
                tracing::info!(entries = st.entries.len(), live, next_slot = st.next_slot, "vector index restored");
                (st, outcome)
            }
            Err(LoadError::Missing) => {
                tracing::info!("no vector index snapshot; starting empty");
                (IndexState::default(), RestoreOutcome::Missing)
            }
            Err(LoadError::Corrupt(reason)) => {
                tracing::warn!(%reason, "vector index snapshot unusable; starting empty");
                (IndexState::default(), RestoreOutcome::Corrupt(reason))
            }
        };
        match self.state.write() {
            Ok(mut state) => *state = fresh,
            Err(_) => return RestoreOutcome::Corrupt("index state lock poisoned".into()),
        }
        outcome
    }

    /// Physically drop deleted rows. Surviving entries keep their slot ids and
    /// the slot counter is unchanged. Returns the number of rows removed.
    pub fn compact(&self) -> Result<usize> {
        let _w = self.lock_writer()?;
        let mut state = self.write_state()?;
        let before = state.entries.len();
        let mut rows = Vec::with_capacity(state.rows.len());
        let mut entries = Vec::with_capacity(before);
        for (pos, e) in state.entries.iter().enumerate() {
            if !e.deleted {
                rows.extend_from_slice(&state.rows[pos * self.dim..(pos + 1) * self.dim]);
                entries.push(e.clone());
            }
        }
        state.rows = rows;
        state.entries = entries;
        state.rebuild_document_map();
        let removed = before - state.entries.len();
        tracing::info!(removed, remaining = state.entries.len(), "index compacted");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let state = self.read_state()?;
        let live_entries = state.entries.iter().filter(|e| !e.deleted).count();
        let unique_documents = state
            .entries
            .iter()
            .filter(|e| !e.deleted)
            .map(|e| e.document_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        Ok(IndexStats {
            total_slots: state.entries.len(),
            live_entries,
            deleted_entries: state.entries.len() - live_entries,
            unique_documents,
            dimension: self.dim,
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.stats().map(|s| s.live_entries).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Documents with at least one live entry.
    pub fn live_documents(&self) -> Result<HashSet<DocumentId>> {
        let state = self.read_state()?;
        Ok(state.entries.iter().filter(|e| !e.deleted).map(|e| e.document_id.clone()).collect())
    }

    /// The slot counter: the id the next added entry will get.
    pub fn next_slot(&self) -> Result<SlotId> {
        Ok(self.read_state()?.next_slot)
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer.lock().map_err(|_| Error::Operation("index writer lock poisoned".into()))
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state.read().map_err(|_| Error::Operation("index state lock poisoned".into()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.state.write().map_err(|_| Error::Operation("index state lock poisoned".into()))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc: &str, idx: usize) -> ChunkRef {
        ChunkRef { chunk_id: format!("{doc}_{idx}"), document_id: doc.into() }
    }

    #[test]
    fn ties_break_by_slot() {
        let index = VectorIndex::new(2).unwrap();
        index.add(&[(chunk("a", 0), vec![1.0, 0.0]), (chunk("a", 1), vec![1.0, 0.0]), (chunk("b", 0), vec![0.0, 1.0])]).unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.slot_id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn wrong_dimension_mutates_nothing() {
        let index = VectorIndex::new(3).unwrap();
        let err = index.add(&[(chunk("a", 0), vec![1.0, 0.0, 0.0]), (chunk("a", 1), vec![1.0])]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 1 }));
        assert_eq!(index.stats().unwrap().total_slots, 0);
        assert_eq!(index.next_slot().unwrap(), 0);
        assert!(matches!(index.search(&[1.0], 1), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn normalize_makes_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
