//! On-disk snapshot of the vector index.
//!
//! Two files share a base path:
//! - `<base>.vectors`: `[magic:8][version:4][dim:4][count:8]` then `count * dim`
//!   little-endian f32 values, one row per entry in slot order.
//! - `<base>.meta.json`: slot table, slot counter and the blake3 digest of the
//!   vectors file.
//!
//! The vectors file is written first and the metadata last, each through a
//! temp file and rename. A reader only trusts the pair when the digest in the
//! metadata matches the vectors file it finds, so a crash between the two
//! writes is detected as a stale pair.

use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use docqa_core::error::{Error, Result};
use docqa_core::store::write_atomic;
use docqa_core::types::SlotId;

use crate::index::IndexEntry;

const MAGIC: &[u8; 8] = b"DQAVEC01";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotMeta {
    pub version: u32,
    pub dim: usize,
    pub next_slot: SlotId,
    pub vectors_blake3: String,
    pub entries: Vec<IndexEntry>,
}

/// A decoded snapshot: entries with their rows in the same order.
pub(crate) struct Snapshot {
    pub next_slot: SlotId,
    pub entries: Vec<IndexEntry>,
    pub rows: Vec<f32>,
}

/// Why a snapshot could not be used.
#[derive(Debug)]
pub(crate) enum LoadError {
    Missing,
    Corrupt(String),
}

pub(crate) fn vectors_path(base: &Path) -> PathBuf { with_suffix(base, ".vectors") }
pub(crate) fn meta_path(base: &Path) -> PathBuf { with_suffix(base, ".meta.json") }

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub(crate) fn write(base: &Path, dim: usize, next_slot: SlotId, entries: &[IndexEntry], rows: &[f32]) -> Result<()> {
    if rows.len() != entries.len() * dim {
        return Err(Error::Operation(format!(
            "snapshot rows ({}) do not match {} entries of dim {}",
            rows.len(),
            entries.len(),
            dim
        )));
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + rows.len() * 4);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&(dim as u32).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for v in rows {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    let meta = SnapshotMeta {
        version: VERSION,
        dim,
        next_slot,
        vectors_blake3: blake3::hash(&buf).to_hex().to_string(),
        entries: entries.to_vec(),
    };
    write_atomic(&vectors_path(base), &buf)?;
    write_atomic(&meta_path(base), &serde_json::to_vec(&meta)?)?;
    Ok(())
}

pub(crate) fn read(base: &Path, expected_dim: usize) -> std::result::Result<Snapshot, LoadError> {
    let meta_bytes = read_file(&meta_path(base))?;
    let vector_bytes = read_file(&vectors_path(base))?;

    let meta: SnapshotMeta =
        serde_json::from_slice(&meta_bytes).map_err(|e| LoadError::Corrupt(format!("metadata: {e}")))?;
    if meta.version != VERSION {
        return Err(LoadError::Corrupt(format!("unsupported snapshot version {}", meta.version)));
    }
    if blake3::hash(&vector_bytes).to_hex().as_str() != meta.vectors_blake3 {
        return Err(LoadError::Corrupt("vectors file does not match metadata digest".into()));
    }
    if meta.dim != expected_dim {
        return Err(LoadError::Corrupt(format!("snapshot dim {} != index dim {}", meta.dim, expected_dim)));
    }

    let (dim, count, rows) = decode_vectors(&vector_bytes).map_err(|e| LoadError::Corrupt(format!("vectors: {e}")))?;
    if dim != meta.dim || count != meta.entries.len() {
        return Err(LoadError::Corrupt(format!(
            "vectors header ({count} x {dim}) disagrees with metadata ({} x {})",
            meta.entries.len(),
            meta.dim
        )));
    }
    let mut prev: Option<SlotId> = None;
    for e in &meta.entries {
        if prev.is_some_and(|p| e.slot_id <= p) || e.slot_id >= meta.next_slot {
            return Err(LoadError::Corrupt(format!("slot table out of order at slot {}", e.slot_id)));
        }
        prev = Some(e.slot_id);
    }
    Ok(Snapshot { next_slot: meta.next_slot, entries: meta.entries, rows })
}

fn read_file(path: &Path) -> std::result::Result<Vec<u8>, LoadError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(LoadError::Missing),
        Err(e) => Err(LoadError::Corrupt(format!("{}: {e}", path.display()))),
    }
}

fn decode_vectors(data: &[u8]) -> io::Result<(usize, usize, Vec<f32>)> {
    let mut cursor = Cursor::new(data);
    let mut magic = [0u8; 8];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }
    let mut u32_buf = [0u8; 4];
    cursor.read_exact(&mut u32_buf)?;
    let version = u32::from_le_bytes(u32_buf);
    if version != VERSION {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("version {version}")));
    }
    cursor.read_exact(&mut u32_buf)?;
    let dim = u32::from_le_bytes(u32_buf) as usize;
    let mut u64_buf = [0u8; 8];
    cursor.read_exact(&mut u64_buf)?;
    let count = u64::from_le_bytes(u64_buf) as usize;

    let payload = &data[HEADER_LEN..];
    let expected = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "size overflow"))?;
    if payload.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload is {} bytes, expected {expected}", payload.len()),
        ));
    }
    let rows = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((dim, count, rows))
}
