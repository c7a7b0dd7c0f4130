//! Immutable index snapshots and their atomic publication

use super::{DenseIndex, IndexError, IndexParams, LexicalIndex};
use crate::corpus::{Passage, PassageKey};
use crate::retrieval::{Candidate, RetrievalPath};
use ahash::AHashMap;
use std::sync::{Arc, RwLock};

/// One passage and its embedding, as handed over by ingestion
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub passage: Passage,
    pub embedding: Vec<f32>,
}

/// A complete, consistent view of the corpus and both indexes
///
/// Document slots are assigned in identity-triple order, so slot order is
/// also the deterministic tie-break order.
pub struct IndexSnapshot {
    version: u64,
    embedding_model: Option<String>,
    passages: Vec<Arc<Passage>>,
    slots: AHashMap<PassageKey, usize>,
    dense: DenseIndex,
    lexical: LexicalIndex,
    ef_search: usize,
}

impl IndexSnapshot {
    /// The snapshot before anything has been ingested
    pub fn empty() -> Self {
        Self {
            version: 0,
            embedding_model: None,
            passages: Vec::new(),
            slots: AHashMap::new(),
            dense: DenseIndex::empty(0),
            lexical: LexicalIndex::empty(),
            ef_search: IndexParams::default().hnsw_ef_search,
        }
    }

    /// Build both indexes over the full passage set
    pub fn build(
        version: u64,
        embedding_model: &str,
        dimension: usize,
        mut entries: Vec<IndexEntry>,
        params: &IndexParams,
    ) -> Result<Self, IndexError> {
        entries.sort_by(|a, b| a.passage.id().cmp(b.passage.id()));

        let mut slots = AHashMap::with_capacity(entries.len());
        for (slot, entry) in entries.iter().enumerate() {
            if slots.insert(entry.passage.id().clone(), slot).is_some() {
                return Err(IndexError::DuplicateKey(entry.passage.id().clone()));
            }
        }

        let vectors: Vec<&[f32]> = entries.iter().map(|e| e.embedding.as_slice()).collect();
        let dense = DenseIndex::build(dimension, &vectors, params)?;

        let texts: Vec<&str> = entries.iter().map(|e| e.passage.text()).collect();
        let lexical = LexicalIndex::build(&texts)?;

        let passages = entries
            .into_iter()
            .map(|entry| Arc::new(entry.passage))
            .collect();

        Ok(Self {
            version,
            embedding_model: Some(embedding_model.to_string()),
            passages,
            slots,
            dense,
            lexical,
            ef_search: params.hnsw_ef_search,
        })
    }

    /// Dense top-k candidates for an already-embedded query
    ///
    /// `query_model` must be the model the snapshot was built with; vectors
    /// from different models are not comparable.
    pub fn dense_query(
        &self,
        query_vector: &[f32],
        query_model: &str,
        k: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        if self.dense.is_empty() {
            tracing::debug!("Dense index unavailable (empty corpus), returning no candidates");
            return Ok(Vec::new());
        }

        if let Some(index_model) = &self.embedding_model {
            if index_model != query_model {
                return Err(IndexError::ModelMismatch {
                    index_model: index_model.clone(),
                    query_model: query_model.to_string(),
                });
            }
        }

        let hits = self.dense.search(query_vector, k, self.ef_search)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.passages.get(hit.doc).map(|passage| {
                    Candidate::new(Arc::clone(passage), hit.similarity, RetrievalPath::Dense)
                })
            })
            .collect())
    }

    /// Lexical top-k candidates
    pub fn lexical_query(&self, text: &str, k: usize) -> Result<Vec<Candidate>, IndexError> {
        if self.lexical.is_empty() {
            tracing::debug!("Lexical index unavailable (empty corpus), returning no candidates");
            return Ok(Vec::new());
        }

        let hits = self.lexical.search(text, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.passages.get(hit.doc).map(|passage| {
                    Candidate::new(Arc::clone(passage), hit.score, RetrievalPath::Lexical)
                })
            })
            .collect())
    }

    /// Look up a passage by identity
    pub fn get(&self, key: &PassageKey) -> Option<&Arc<Passage>> {
        self.slots.get(key).and_then(|&slot| self.passages.get(slot))
    }

    pub fn passages(&self) -> &[Arc<Passage>] {
        &self.passages
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Holder of the currently published snapshot
///
/// Readers clone the `Arc` and keep using that snapshot for the whole query,
/// even if a newer one is published meanwhile. The lock is only held for the
/// pointer copy or swap, never while building.
pub struct SnapshotCell {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SnapshotCell {
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot
    pub fn load(&self) -> Arc<IndexSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Atomically replace the current snapshot
    pub fn publish(&self, snapshot: IndexSnapshot) {
        let snapshot = Arc::new(snapshot);
        tracing::info!(
            "Publishing index snapshot v{} ({} passages)",
            snapshot.version(),
            snapshot.len()
        );

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new(IndexSnapshot::empty())
    }
}
