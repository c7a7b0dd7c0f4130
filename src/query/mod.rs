//! Query orchestration
//!
//! One query moves through `RECEIVED → RETRIEVED → GATED` and ends in exactly
//! one of `ANSWERED`, `REFUSED` or `FAILED`. Refusal is a normal outcome with
//! its own response; failure is an error carrying the proximate cause.

use crate::config::{Config, QueryConfig};
use crate::oracle::{call_async, CallPolicy, Generator, OracleError, OracleKind};
use crate::retrieval::{Citation, HybridRetriever, RetrievalError, ScoredPassage};
use crate::safety::{DenyReason, GateDecision, SafetyGate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Answer returned when the gate refuses a query
pub const REFUSAL_MESSAGE: &str = "Insufficient medical evidence in the provided documents.";

/// Answer returned when retrieval found nothing to ground an answer in
pub const NO_RESULTS_MESSAGE: &str = "No relevant content was found in the documents.";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Answer generation failed: {0}")]
    Generation(#[source] OracleError),
}

impl QueryError {
    /// Whether the caller's input was at fault rather than the system
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }
}

/// Per-query pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Received,
    Retrieved,
    Gated,
    Answered,
    Refused,
    Failed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered | Self::Refused | Self::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Retrieved => "RETRIEVED",
            Self::Gated => "GATED",
            Self::Answered => "ANSWERED",
            Self::Refused => "REFUSED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Distinguishable outcome kinds exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Answered,
    Refused,
    Failed,
}

/// Response shape shared by answered and refused queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Confidence of the top-ranked passage, 0.0 when refused or empty
    pub confidence: f32,
}

impl QueryResponse {
    fn refusal(message: &str) -> Self {
        Self {
            answer: message.to_string(),
            citations: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// Non-failing query outcome
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answered(QueryResponse),
    Refused {
        response: QueryResponse,
        reason: DenyReason,
    },
}

impl QueryOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Answered(_) => OutcomeKind::Answered,
            Self::Refused { .. } => OutcomeKind::Refused,
        }
    }

    pub fn response(&self) -> &QueryResponse {
        match self {
            Self::Answered(response) => response,
            Self::Refused { response, .. } => response,
        }
    }

    pub fn into_response(self) -> QueryResponse {
        match self {
            Self::Answered(response) => response,
            Self::Refused { response, .. } => response,
        }
    }
}

/// End-to-end query pipeline
pub struct QueryOrchestrator {
    retriever: HybridRetriever,
    gate: SafetyGate,
    generator: Arc<dyn Generator>,
    generate_policy: CallPolicy,
    top_k: usize,
    limits: QueryConfig,
}

impl QueryOrchestrator {
    pub fn new(
        retriever: HybridRetriever,
        gate: SafetyGate,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Self {
        Self {
            retriever,
            gate,
            generator,
            generate_policy: config.oracle.generate_policy(),
            top_k: config.retrieval.top_k,
            limits: config.query.clone(),
        }
    }

    /// Override the number of passages retrieved per query
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Answer `text` from the corpus
    ///
    /// Dropping the returned future cancels outstanding oracle calls.
    pub async fn handle_query(&self, text: &str) -> Result<QueryOutcome, QueryError> {
        let id = Uuid::new_v4();
        self.run(text).instrument(tracing::info_span!("query", id = %id)).await
    }

    async fn run(&self, text: &str) -> Result<QueryOutcome, QueryError> {
        tracing::debug!(state = %QueryState::Received, "Query received");
        let query = self.validate(text).inspect_err(|e| {
            tracing::debug!(state = %QueryState::Failed, "Rejected: {}", e);
        })?;

        let passages = self
            .retriever
            .retrieve(query, self.top_k)
            .await
            .inspect_err(|e| {
                tracing::warn!(state = %QueryState::Failed, "Retrieval failed: {}", e);
            })?;
        tracing::debug!(
            state = %QueryState::Retrieved,
            "Retrieved {} scored passages",
            passages.len()
        );

        let decision = self.gate.evaluate(query, &passages);
        tracing::debug!(state = %QueryState::Gated, "Gate decision: {:?}", decision);

        if let GateDecision::Deny(reason) = decision {
            let message = match reason {
                DenyReason::NoEvidence => NO_RESULTS_MESSAGE,
                _ => REFUSAL_MESSAGE,
            };
            tracing::info!(state = %QueryState::Refused, "Query refused: {}", reason);
            return Ok(QueryOutcome::Refused {
                response: QueryResponse::refusal(message),
                reason,
            });
        }

        if passages.is_empty() {
            tracing::info!(state = %QueryState::Refused, "No passages retrieved");
            return Ok(QueryOutcome::Refused {
                response: QueryResponse::refusal(NO_RESULTS_MESSAGE),
                reason: DenyReason::NoEvidence,
            });
        }

        let answer = self.generate(query, &passages).await.inspect_err(|e| {
            tracing::warn!(state = %QueryState::Failed, "{}", e);
        })?;

        let citations: Vec<Citation> = passages.iter().map(ScoredPassage::citation).collect();
        let confidence = passages.first().map(|p| p.confidence()).unwrap_or(0.0);

        tracing::info!(
            state = %QueryState::Answered,
            "Answered with {} citations (confidence {:.3})",
            citations.len(),
            confidence
        );

        Ok(QueryOutcome::Answered(QueryResponse {
            answer,
            citations,
            confidence,
        }))
    }

    fn validate<'a>(&self, text: &'a str) -> Result<&'a str, QueryError> {
        let query = text.trim();
        if query.is_empty() {
            return Err(QueryError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let chars = query.chars().count();
        if chars > self.limits.max_query_chars {
            return Err(QueryError::InvalidQuery(format!(
                "Query is {} characters, the maximum is {}",
                chars, self.limits.max_query_chars
            )));
        }

        Ok(query)
    }

    async fn generate(
        &self,
        query: &str,
        passages: &[ScoredPassage],
    ) -> Result<String, QueryError> {
        call_async(OracleKind::Generation, self.generate_policy, || {
            self.generator.generate(query, passages)
        })
        .await
        .map_err(QueryError::Generation)
    }
}
