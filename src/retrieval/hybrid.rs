//! Hybrid retrieval: concurrent dense + lexical search, fusion, reranking

use super::{fusion, Candidate, Reranker, RetrievalError, ScoredPassage};
use crate::config::{OracleConfig, RetrievalConfig};
use crate::corpus::Passage;
use crate::index::{IndexSnapshot, SnapshotCell};
use crate::oracle::{call_blocking, embed_one, CallPolicy, CrossEncoder, Embedder, OracleKind};
use std::sync::Arc;

/// Hybrid retriever over the currently published index snapshot
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    reranker: Reranker,
    snapshots: Arc<SnapshotCell>,
    embed_policy: CallPolicy,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        encoder: Arc<dyn CrossEncoder>,
        snapshots: Arc<SnapshotCell>,
        config: RetrievalConfig,
        oracle: &OracleConfig,
    ) -> Self {
        Self {
            embedder,
            reranker: Reranker::new(encoder, oracle.rerank_policy()),
            snapshots,
            embed_policy: oracle.embed_policy(),
            config,
        }
    }

    /// Retrieve and rerank the best `top_k` passages for `query`
    ///
    /// Both paths read the same snapshot. A failing path is logged and the
    /// other path's candidates are used alone; only when both fail does
    /// retrieval fail. Reranker failures are never downgraded.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, RetrievalError> {
        let snapshot = self.snapshots.load();
        let fused = self.candidates(&snapshot, query, top_k).await?;

        tracing::debug!(
            "Fusion over snapshot v{} yielded {} passages",
            snapshot.version(),
            fused.len()
        );

        self.reranker
            .rerank(query, fused, top_k)
            .await
            .map_err(RetrievalError::oracle(OracleKind::CrossEncoder))
    }

    /// Fused, deduplicated candidate passages from both paths
    pub async fn candidates(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Arc<Passage>>, RetrievalError> {
        let limit = self.config.fetch_limit(top_k);

        let (dense, lexical) = tokio::join!(
            self.dense_search(Arc::clone(snapshot), query, limit),
            self.lexical_search(Arc::clone(snapshot), query, limit)
        );

        let (dense, lexical) = reconcile(dense, lexical)?;

        tracing::debug!(
            "Retrieved {} dense and {} lexical candidates (limit {})",
            dense.len(),
            lexical.len(),
            limit
        );

        let fused = fusion::merge(dense, lexical);
        fusion::verify_unique(&fused)?;

        Ok(fused)
    }

    async fn dense_search(
        &self,
        snapshot: Arc<IndexSnapshot>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = call_blocking(OracleKind::Embedding, self.embed_policy, move || {
            embed_one(embedder.as_ref(), &text)
        })
        .await
        .map_err(RetrievalError::oracle(OracleKind::Embedding))?;

        let model = self.embedder.model_name().to_string();
        tokio::task::spawn_blocking(move || snapshot.dense_query(&vector, &model, limit))
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))?
            .map_err(RetrievalError::from)
    }

    async fn lexical_search(
        &self,
        snapshot: Arc<IndexSnapshot>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let text = query.to_string();
        tokio::task::spawn_blocking(move || snapshot.lexical_query(&text, limit))
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))?
            .map_err(RetrievalError::from)
    }

    pub fn snapshots(&self) -> &Arc<SnapshotCell> {
        &self.snapshots
    }

    pub fn default_top_k(&self) -> usize {
        self.config.top_k
    }
}

type PathResult = Result<Vec<Candidate>, RetrievalError>;

/// Keep whichever paths succeeded; fail only when both did
fn reconcile(
    dense: PathResult,
    lexical: PathResult,
) -> Result<(Vec<Candidate>, Vec<Candidate>), RetrievalError> {
    match (dense, lexical) {
        (Ok(dense), Ok(lexical)) => Ok((dense, lexical)),
        (Ok(dense), Err(e)) => {
            tracing::warn!("Lexical retrieval failed, using dense results only: {}", e);
            Ok((dense, Vec::new()))
        }
        (Err(e), Ok(lexical)) => {
            tracing::warn!("Dense retrieval failed, using lexical results only: {}", e);
            Ok((Vec::new(), lexical))
        }
        (Err(dense), Err(lexical)) => Err(RetrievalError::AllPathsFailed {
            dense: dense.to_string(),
            lexical: lexical.to_string(),
        }),
    }
}
