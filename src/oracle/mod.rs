//! Scoring oracles: embedding, cross-encoder and generative answer
//!
//! Each oracle is a capability trait with exactly one method so tests can
//! substitute deterministic doubles. Implementations:
//! - `FastEmbedProvider` / `FastEmbedCrossEncoder` run ONNX models locally
//! - `OllamaGenerator` calls a local Ollama server over HTTP
//!
//! The call helpers at the bottom bound every oracle call with a timeout and
//! a small, fixed number of retries.

mod ollama;
mod onnx;

pub use ollama::OllamaGenerator;
pub use onnx::{FastEmbedCrossEncoder, FastEmbedProvider};

use crate::retrieval::ScoredPassage;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum OracleError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Oracle call failed: {0}")]
    CallFailed(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Malformed oracle output: {0}")]
    MalformedOutput(String),
}

impl OracleError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CallFailed(_) | Self::Timeout(_))
    }
}

/// Which oracle produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleKind {
    Embedding,
    CrossEncoder,
    Generation,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedding => "embedding",
            Self::CrossEncoder => "cross-encoder",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// Embedding oracle
///
/// The same function must embed passages at ingestion and queries at
/// retrieval time; `model_name` pins the vector space.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OracleError>;

    /// Vector dimension produced by this model
    fn dimension(&self) -> usize;

    /// Model identifier recorded with every stored embedding
    fn model_name(&self) -> &str;
}

/// Cross-encoder oracle
pub trait CrossEncoder: Send + Sync {
    /// Raw relevance logits for `(query, passage)` pairs, in input order
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, OracleError>;
}

/// Generative-answer oracle
#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `query` grounded in `passages` (highest-ranked first)
    async fn generate(&self, query: &str, passages: &[ScoredPassage])
        -> Result<String, OracleError>;
}

/// Embed a single text through a batch-oriented embedder
pub fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, OracleError> {
    let mut vectors = embedder.embed(&[text.to_string()])?;
    if vectors.len() != 1 {
        return Err(OracleError::MalformedOutput(format!(
            "expected 1 embedding, got {}",
            vectors.len()
        )));
    }
    let vector = vectors.remove(0);
    if vector.len() != embedder.dimension() {
        return Err(OracleError::DimensionMismatch {
            expected: embedder.dimension(),
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Timeout and retry budget for one oracle
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Run a synchronous oracle call on the blocking pool, bounded by the policy
///
/// A timed-out call keeps running on its blocking thread until the model
/// returns; its result is discarded.
pub async fn call_blocking<T, F>(
    kind: OracleKind,
    policy: CallPolicy,
    f: F,
) -> Result<T, OracleError>
where
    T: Send + 'static,
    F: Fn() -> Result<T, OracleError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    call_async(kind, policy, move || {
        let f = Arc::clone(&f);
        async move {
            tokio::task::spawn_blocking(move || (*f)())
                .await
                .map_err(|e| OracleError::CallFailed(format!("oracle task aborted: {}", e)))?
        }
    })
    .await
}

/// Run an async oracle call, bounded by the policy
pub async fn call_async<T, F, Fut>(
    kind: OracleKind,
    policy: CallPolicy,
    mut f: F,
) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    "{} oracle attempt {}/{} failed: {}",
                    kind,
                    attempt,
                    attempts,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
