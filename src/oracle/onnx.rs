/// Local ONNX oracles backed by FastEmbed
use super::{CrossEncoder, Embedder, OracleError};
use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding, TextRerank,
};
use std::sync::Arc;

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on first use to the FastEmbed cache directory.
/// - all-MiniLM-L6-v2: 90MB (384 dims)
/// - bge-small-en-v1.5: 130MB (384 dims) - default
/// - bge-base-en-v1.5: 440MB (768 dims)
/// - bge-large-en-v1.5: 1.3GB (1024 dims) - highest accuracy
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self, OracleError> {
        let (embedding_model, dimension, model_size_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => {
                (EmbeddingModel::BGESmallENV15, 384, 130)
            }
            "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" => {
                (EmbeddingModel::BGEBaseENV15, 768, 440)
            }
            "bge-large-en-v1.5" | "BAAI/bge-large-en-v1.5" => {
                (EmbeddingModel::BGELargeENV15, 1024, 1300)
            }
            _ => {
                return Err(OracleError::InitializationError(format!(
                    "Unsupported embedding model: {}. Supported: {}",
                    model_name,
                    Self::SUPPORTED.join(", ")
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| OracleError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    pub const SUPPORTED: &'static [&'static str] = &[
        "all-MiniLM-L6-v2",
        "bge-small-en-v1.5",
        "bge-base-en-v1.5",
        "bge-large-en-v1.5",
    ];
}

impl Embedder for FastEmbedProvider {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(OracleError::InvalidInput(
                "Cannot embed empty text".to_string(),
            ));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| OracleError::CallFailed(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(OracleError::MalformedOutput(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(OracleError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Cross-encoder for `(query, passage)` relevance logits
pub struct FastEmbedCrossEncoder {
    model: Arc<TextRerank>,
    model_name: String,
    batch_size: usize,
}

impl FastEmbedCrossEncoder {
    /// Create a new cross-encoder with the specified model
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self, OracleError> {
        let reranker_model = match model_name {
            "bge-reranker-base" | "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            "bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jina-reranker-v1-turbo-en" | "jinaai/jina-reranker-v1-turbo-en" => {
                RerankerModel::JINARerankerV1TurboEn
            }
            _ => {
                return Err(OracleError::InitializationError(format!(
                    "Unsupported reranker model: {}. Supported: {}",
                    model_name,
                    Self::SUPPORTED.join(", ")
                )));
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options =
            RerankInitOptions::new(reranker_model).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| OracleError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            batch_size: batch_size.max(1),
        })
    }

    pub const SUPPORTED: &'static [&'static str] = &[
        "bge-reranker-base",
        "bge-reranker-v2-m3",
        "jina-reranker-v1-turbo-en",
    ];

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl CrossEncoder for FastEmbedCrossEncoder {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, OracleError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        if query.trim().is_empty() {
            return Err(OracleError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        // FastEmbed returns results sorted by score; map them back to input order
        let results = self
            .model
            .rerank(query, passages.to_vec(), false, Some(self.batch_size))
            .map_err(|e| OracleError::CallFailed(e.to_string()))?;

        if results.len() != passages.len() {
            return Err(OracleError::MalformedOutput(format!(
                "Reranker returned {} scores for {} passages",
                results.len(),
                passages.len()
            )));
        }

        let mut logits = vec![f32::NAN; passages.len()];
        for result in results {
            let slot = logits.get_mut(result.index).ok_or_else(|| {
                OracleError::MalformedOutput(format!(
                    "Reranker index {} out of range",
                    result.index
                ))
            })?;
            *slot = result.score;
        }

        Ok(logits)
    }
}
