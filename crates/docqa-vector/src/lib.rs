//! Vector index with soft delete and snapshot persistence, plus the retriever
//! that turns query text into ranked chunk candidates.

pub mod index;
pub mod retriever;
mod snapshot;

pub use index::{l2_normalize, IndexEntry, IndexStats, RestoreOutcome, VectorIndex};
pub use retriever::Retriever;
