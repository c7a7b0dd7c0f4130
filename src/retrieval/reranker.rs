//! Cross-encoder reranking

use super::ScoredPassage;
use crate::corpus::Passage;
use crate::oracle::{call_blocking, CallPolicy, CrossEncoder, OracleError, OracleKind};
use std::sync::Arc;

/// Largest `f32` below 1.0
const MAX_CONFIDENCE: f32 = 1.0 - f32::EPSILON / 2.0;

/// Map a logit to a confidence in (0, 1)
///
/// Computed in `f64` and clamped so that extreme logits stay strictly inside
/// the open interval after narrowing to `f32`.
pub fn logistic(logit: f32) -> f32 {
    let confidence = 1.0 / (1.0 + (-f64::from(logit)).exp());
    (confidence as f32).clamp(f32::MIN_POSITIVE, MAX_CONFIDENCE)
}

/// Scores a fused passage set against the query and keeps the best `k`
pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
    policy: CallPolicy,
}

impl Reranker {
    pub fn new(encoder: Arc<dyn CrossEncoder>, policy: CallPolicy) -> Self {
        Self { encoder, policy }
    }

    /// Rerank `passages` for `query`
    ///
    /// # Returns
    /// `min(k, passages.len())` scored passages in rank order. An empty set
    /// (or `k == 0`) returns immediately without calling the cross-encoder.
    pub async fn rerank(
        &self,
        query: &str,
        passages: Vec<Arc<Passage>>,
        k: usize,
    ) -> Result<Vec<ScoredPassage>, OracleError> {
        if passages.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let encoder = Arc::clone(&self.encoder);
        let query = query.to_string();
        let texts: Vec<String> = passages.iter().map(|p| p.text().to_string()).collect();

        let logits = call_blocking(OracleKind::CrossEncoder, self.policy, move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            encoder.score(&query, &refs)
        })
        .await?;

        tracing::debug!("Cross-encoder scored {} passages", logits.len());

        Self::rank(&passages, &logits, k)
    }

    /// Pair passages with their logits, sort into rank order and truncate
    pub fn rank(
        passages: &[Arc<Passage>],
        logits: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPassage>, OracleError> {
        if logits.len() != passages.len() {
            return Err(OracleError::MalformedOutput(format!(
                "expected {} scores, got {}",
                passages.len(),
                logits.len()
            )));
        }

        let mut scored = passages
            .iter()
            .zip(logits)
            .map(|(passage, &logit)| ScoredPassage::from_logit(Arc::clone(passage), logit))
            .collect::<Result<Vec<_>, _>>()?;

        scored.sort_by(ScoredPassage::rank_cmp);
        scored.truncate(k);

        Ok(scored)
    }
}
