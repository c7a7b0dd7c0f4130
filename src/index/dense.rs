/// HNSW vector index for similarity search
use super::{IndexError, IndexParams};
use hnsw_rs::prelude::*;

/// Upper bound on HNSW layers supported by hnsw_rs
const MAX_LAYERS: usize = 16;

/// Nearest-neighbour hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseHit {
    /// Document slot in the owning snapshot
    pub doc: usize,
    /// Cosine similarity (higher is more similar)
    pub similarity: f32,
}

/// HNSW vector index wrapper
///
/// Built once per snapshot and never mutated afterwards. Uses cosine
/// distance; similarity is reported as `1 - distance`.
pub struct DenseIndex {
    graph: Option<Hnsw<'static, f32, DistCosine>>,
    dimension: usize,
    len: usize,
}

impl DenseIndex {
    /// An index over no vectors
    pub fn empty(dimension: usize) -> Self {
        Self {
            graph: None,
            dimension,
            len: 0,
        }
    }

    /// Build an index from `vectors`, where slot `i` is document `i`
    pub fn build(
        dimension: usize,
        vectors: &[&[f32]],
        params: &IndexParams,
    ) -> Result<Self, IndexError> {
        if vectors.is_empty() {
            return Ok(Self::empty(dimension));
        }

        for vector in vectors {
            if vector.len() != dimension {
                return Err(IndexError::InvalidDimension {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let graph = Hnsw::<f32, DistCosine>::new(
            params.hnsw_m,
            vectors.len(),
            MAX_LAYERS,
            params.hnsw_ef_construction,
            DistCosine,
        );

        for (doc, vector) in vectors.iter().enumerate() {
            graph.insert((*vector, doc));
        }

        tracing::debug!("Built HNSW index over {} vectors ({}D)", vectors.len(), dimension);

        Ok(Self {
            graph: Some(graph),
            dimension,
            len: vectors.len(),
        })
    }

    /// Search for the k nearest neighbours of `query`
    ///
    /// # Returns
    /// Hits sorted by similarity descending, ties by document slot. An empty
    /// index yields no hits.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<DenseHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let graph = match &self.graph {
            Some(graph) if k > 0 => graph,
            _ => return Ok(Vec::new()),
        };

        let neighbours = graph.search(query, k, ef_search.max(k));

        let mut hits: Vec<DenseHit> = neighbours
            .into_iter()
            .filter(|n| n.d_id < self.len)
            .map(|n| DenseHit {
                doc: n.d_id,
                similarity: 1.0 - n.distance,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.doc.cmp(&b.doc))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
