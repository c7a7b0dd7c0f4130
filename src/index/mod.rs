//! Dense and lexical indexes over one immutable corpus snapshot
//!
//! Architecture:
//! - `DenseIndex`: HNSW graph (cosine) over passage embeddings
//! - `LexicalIndex`: in-memory Tantivy index ranked by BM25
//! - `IndexSnapshot`: both indexes plus the passages they were built from
//! - `SnapshotCell`: holds the current snapshot; ingestion publishes a new
//!   one atomically, queries read exactly one

mod dense;
mod lexical;
mod snapshot;

pub use dense::{DenseHit, DenseIndex};
pub use lexical::{LexicalHit, LexicalIndex};
pub use snapshot::{IndexEntry, IndexSnapshot, SnapshotCell};

use crate::corpus::PassageKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index build failed: {0}")]
    BuildError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate passage in snapshot: {0}")]
    DuplicateKey(PassageKey),

    #[error("Query embedded with '{query_model}' but index was built with '{index_model}'")]
    ModelMismatch {
        index_model: String,
        query_model: String,
    },

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}

/// HNSW construction and search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexParams {
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW search parameter (higher = better recall, slower search)
    pub hnsw_ef_search: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
        }
    }
}
