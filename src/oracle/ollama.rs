//! Generative answers from a local Ollama server

use super::{Generator, OracleError};
use crate::retrieval::ScoredPassage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply the model is instructed to give when the context has no answer
pub const UNKNOWN_ANSWER: &str = "I don't know based on the provided documents.";

/// Generator that calls Ollama's `/api/generate` endpoint
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    /// Create a new generator
    ///
    /// # Arguments
    /// * `base_url` - Ollama server (e.g., "http://localhost:11434")
    /// * `model` - Model tag (e.g., "mistral")
    /// * `temperature` - Sampling temperature
    /// * `timeout` - Transport-level request timeout
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Build the grounding prompt: each passage is tagged with its citation triple
pub fn build_prompt(query: &str, passages: &[ScoredPassage]) -> String {
    let mut context = String::new();
    for scored in passages {
        let passage = scored.passage();
        context.push_str(&format!(
            "[{} | page {} | chunk {}]\n{}\n\n",
            passage.source(),
            passage.page(),
            passage.chunk_index(),
            passage.text()
        ));
    }

    format!(
        "You are a careful assistant answering questions about medical documents. \
         Use only the context below to answer the user's question.\n\
         If the answer cannot be found in the context, respond with:\n\
         \"{}\"\n\n\
         Context:\n{}\nQuestion: {}\nAnswer:",
        UNKNOWN_ANSWER, context, query
    )
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(
        &self,
        query: &str,
        passages: &[ScoredPassage],
    ) -> Result<String, OracleError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: build_prompt(query, passages),
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::CallFailed(format!("Ollama request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::CallFailed(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::MalformedOutput(e.to_string()))?;

        Ok(parsed.response.trim().to_string())
    }
}
