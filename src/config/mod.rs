//! Configuration management for docqa
//!
//! Configuration is a TOML file with one section per pipeline stage, an
//! optional set of named profiles, and `DOCQA_SECTION__KEY` environment
//! overrides applied on load.

use crate::error::{DocqaError, Result};
use crate::index::IndexParams;
use crate::oracle::CallPolicy;
use crate::safety::MedicalTermPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Top-level docqa configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub retrieval: RetrievalConfig,
    pub safety: SafetyConfig,
    pub generation: GenerationConfig,
    pub oracle: OracleConfig,
    pub ingestion: IngestionConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Schema version and timestamps written into `_meta`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Cross-encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages returned after reranking
    pub top_k: usize,
    /// Over-fetch multiplier applied to both retrieval paths
    pub fan_out: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl RetrievalConfig {
    /// Per-path candidate count for a request of `top_k` passages
    pub fn fetch_limit(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.fan_out)
    }

    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            hnsw_m: self.hnsw_m,
            hnsw_ef_construction: self.hnsw_ef_construction,
            hnsw_ef_search: self.hnsw_ef_search,
        }
    }
}

/// Safety gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub medical_term_policy: MedicalTermPolicy,
    /// Refuse when retrieval found no supporting passage
    pub require_evidence: bool,
    /// Minimum confidence for a passage to count as evidence
    pub min_evidence_confidence: f32,
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

/// Oracle call bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub embed_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
    pub generate_timeout_ms: u64,
    pub max_retries: u32,
}

impl OracleConfig {
    pub fn embed_policy(&self) -> CallPolicy {
        CallPolicy::new(Duration::from_millis(self.embed_timeout_ms), self.max_retries)
    }

    pub fn rerank_policy(&self) -> CallPolicy {
        CallPolicy::new(Duration::from_millis(self.rerank_timeout_ms), self.max_retries)
    }

    pub fn generate_policy(&self) -> CallPolicy {
        CallPolicy::new(
            Duration::from_millis(self.generate_timeout_ms),
            self.max_retries,
        )
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Query validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub max_query_chars: usize,
}

/// Fields a profile may override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_term_policy: Option<MedicalTermPolicy>,
}

impl Config {
    /// Read, env-override and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocqaError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| DocqaError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Write the configuration as pretty TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocqaError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| DocqaError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Like [`Config::load`], with a profile applied before revalidation
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Overlay the named `[profiles.<name>]` section; unknown names are an error
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| DocqaError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.generation_model {
            self.generation.model = model;
        }
        if let Some(policy) = overrides.medical_term_policy {
            self.safety.medical_term_policy = policy;
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Overlay `DOCQA_SECTION__KEY` environment variables
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("DOCQA_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "GENERATION__MODEL" => {
                self.generation.model = value.to_string();
            }
            "GENERATION__BASE_URL" => {
                self.generation.base_url = value.to_string();
            }
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k =
                    value.parse().map_err(|_| DocqaError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "SAFETY__MEDICAL_TERM_POLICY" => {
                self.safety.medical_term_policy =
                    value.parse().map_err(|message| DocqaError::InvalidConfigValue {
                        path: path.to_string(),
                        message,
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// `~/.config/docqa/config.toml` (platform config dir)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DocqaError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("docqa").join("config.toml"))
    }

    /// Data directory with a leading `~/` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_home(&self.storage.data_dir)
    }

    /// Location of the SQLite passage store
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("store").join("passages.sqlite"))
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| DocqaError::Config("Invalid path encoding".to_string()))?;

    match path_str.strip_prefix("~/") {
        Some(stripped) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DocqaError::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(stripped))
        }
        None => Ok(path.to_path_buf()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.docqa"),
            },
            embedding: EmbeddingConfig {
                model: "bge-small-en-v1.5".to_string(),
                batch_size: 32,
            },
            reranker: RerankerConfig {
                model: "bge-reranker-base".to_string(),
                batch_size: 16,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                fan_out: 3,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            safety: SafetyConfig {
                medical_term_policy: MedicalTermPolicy::Deny,
                require_evidence: true,
                min_evidence_confidence: 0.0,
            },
            generation: GenerationConfig {
                provider: "ollama".to_string(),
                base_url: "http://localhost:11434".to_string(),
                model: "mistral".to_string(),
                temperature: 0.0,
            },
            oracle: OracleConfig {
                embed_timeout_ms: 10_000,
                rerank_timeout_ms: 30_000,
                generate_timeout_ms: 120_000,
                max_retries: 1,
            },
            ingestion: IngestionConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
            },
            query: QueryConfig {
                max_query_chars: 2000,
            },
            profiles: HashMap::new(),
        }
    }
}
