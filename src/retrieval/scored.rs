//! Candidate, scored passage and citation types

use super::reranker::logistic;
use crate::corpus::Passage;
use crate::oracle::OracleError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Which index produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalPath {
    Dense,
    Lexical,
}

impl fmt::Display for RetrievalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dense => f.write_str("dense"),
            Self::Lexical => f.write_str("lexical"),
        }
    }
}

/// A passage found by one retrieval path
///
/// `raw_score` is only meaningful relative to other candidates of the same
/// path; it is dropped at fusion.
#[derive(Debug, Clone)]
pub struct Candidate {
    passage: Arc<Passage>,
    raw_score: f32,
    path: RetrievalPath,
}

impl Candidate {
    pub fn new(passage: Arc<Passage>, raw_score: f32, path: RetrievalPath) -> Self {
        Self {
            passage,
            raw_score,
            path,
        }
    }

    pub fn passage(&self) -> &Arc<Passage> {
        &self.passage
    }

    pub fn raw_score(&self) -> f32 {
        self.raw_score
    }

    pub fn path(&self) -> RetrievalPath {
        self.path
    }

    pub fn into_passage(self) -> Arc<Passage> {
        self.passage
    }
}

/// A passage with its cross-encoder confidence
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    passage: Arc<Passage>,
    logit: f32,
    confidence: f32,
}

impl ScoredPassage {
    /// Score a passage from a raw cross-encoder logit
    pub fn from_logit(passage: Arc<Passage>, logit: f32) -> Result<Self, OracleError> {
        if !logit.is_finite() {
            return Err(OracleError::MalformedOutput(format!(
                "non-finite logit {} for {}",
                logit,
                passage.id()
            )));
        }

        // -0.0 and 0.0 must tie
        let logit = if logit == 0.0 { 0.0 } else { logit };

        Ok(Self {
            passage,
            logit,
            confidence: logistic(logit),
        })
    }

    pub fn passage(&self) -> &Arc<Passage> {
        &self.passage
    }

    pub fn logit(&self) -> f32 {
        self.logit
    }

    /// Confidence in (0, 1)
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Rank order: higher logit first, then identity triple ascending
    ///
    /// Logit order equals confidence order, and stays total where `f32`
    /// confidences of very large logits would compare equal.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .logit
            .total_cmp(&self.logit)
            .then_with(|| self.passage.id().cmp(other.passage.id()))
    }

    pub fn citation(&self) -> Citation {
        Citation {
            source: self.passage.source().to_string(),
            page: self.passage.page(),
            chunk: self.passage.chunk_index(),
            confidence: self.confidence,
        }
    }
}

/// Presentation projection of a scored passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub page: u32,
    pub chunk: u32,
    pub confidence: f32,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (page {}, chunk {}) confidence {:.3}",
            self.source, self.page, self.chunk, self.confidence
        )
    }
}
