use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{DocqaError, Result, ValidationError};

/// Smallest over-fetch multiplier that still leaves the reranker a choice
const MIN_FAN_OUT: usize = 3;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_models(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_safety(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_oracle(config, &mut errors);
        Self::validate_ingestion(config, &mut errors);

        if config.query.max_query_chars == 0 {
            errors.push(ValidationError::new(
                "query.max_query_chars",
                "Maximum query length must be greater than 0",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocqaError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_models(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.reranker.model.trim().is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty",
            ));
        }
        if config.reranker.batch_size == 0 {
            errors.push(ValidationError::new(
                "reranker.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if retrieval.fan_out < MIN_FAN_OUT {
            errors.push(ValidationError::new(
                "retrieval.fan_out",
                format!(
                    "fan_out must be at least {} (got {}); under-fetching starves the reranker",
                    MIN_FAN_OUT, retrieval.fan_out
                ),
            ));
        }

        if retrieval.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
        if retrieval.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }
        if retrieval.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_safety(config: &Config, errors: &mut Vec<ValidationError>) {
        let threshold = config.safety.min_evidence_confidence;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "safety.min_evidence_confidence",
                format!("Confidence threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.generation.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "generation.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.generation.provider;
        let valid_providers = ["ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "generation.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        let url = &config.generation.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "generation.base_url",
                format!("Base URL must start with http:// or https://, got '{}'", url),
            ));
        }
    }

    fn validate_oracle(config: &Config, errors: &mut Vec<ValidationError>) {
        let timeouts = [
            ("oracle.embed_timeout_ms", config.oracle.embed_timeout_ms),
            ("oracle.rerank_timeout_ms", config.oracle.rerank_timeout_ms),
            ("oracle.generate_timeout_ms", config.oracle.generate_timeout_ms),
        ];
        for (path, value) in timeouts {
            if value == 0 {
                errors.push(ValidationError::new(path, "Timeout must be greater than 0"));
            }
        }

        if config.oracle.max_retries > 5 {
            errors.push(ValidationError::new(
                "oracle.max_retries",
                format!("At most 5 retries are allowed, got {}", config.oracle.max_retries),
            ));
        }
    }

    fn validate_ingestion(config: &Config, errors: &mut Vec<ValidationError>) {
        let ingestion = &config.ingestion;
        if ingestion.chunk_size == 0 {
            errors.push(ValidationError::new(
                "ingestion.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }
        if ingestion.chunk_overlap >= ingestion.chunk_size {
            errors.push(ValidationError::new(
                "ingestion.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    ingestion.chunk_overlap, ingestion.chunk_size
                ),
            ));
        }
    }
}
