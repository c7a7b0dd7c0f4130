//! Hybrid retrieval and reranking
//!
//! A query fans out to the dense and lexical indexes of one snapshot, the two
//! candidate lists are merged into a deduplicated passage set, and the
//! cross-encoder is the only stage that assigns comparable scores.

mod fusion;
mod hybrid;
mod reranker;
mod scored;

pub use fusion::{merge, verify_unique};
pub use hybrid::HybridRetriever;
pub use reranker::{logistic, Reranker};
pub use scored::{Candidate, Citation, RetrievalPath, ScoredPassage};

use crate::corpus::PassageKey;
use crate::index::IndexError;
use crate::oracle::{OracleError, OracleKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("{kind} oracle failed: {source}")]
    Oracle {
        kind: OracleKind,
        #[source]
        source: OracleError,
    },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Retrieval task failed: {0}")]
    Task(String),

    #[error("Both retrieval paths failed (dense: {dense}; lexical: {lexical})")]
    AllPathsFailed { dense: String, lexical: String },

    #[error("Fusion produced duplicate passage {0}")]
    FusionInvariantViolation(PassageKey),
}

impl RetrievalError {
    pub(crate) fn oracle(kind: OracleKind) -> impl FnOnce(OracleError) -> Self {
        move |source| Self::Oracle { kind, source }
    }
}
