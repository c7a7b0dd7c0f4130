use std::path::PathBuf;
use thiserror::Error;

use crate::corpus::PassageError;
use crate::index::IndexError;
use crate::oracle::OracleError;
use crate::query::QueryError;
use crate::retrieval::RetrievalError;

/// Crate-level error, wrapping each module boundary's error type
#[derive(Error, Debug)]
pub enum DocqaError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every problem found by `ConfigValidator`, not just the first
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    #[error("Passage store error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Pool checkout and embedding blob decoding
    #[error("Storage error: {0}")]
    Storage(String),

    /// The store was embedded with a different model than the one requested
    #[error("Embedding model mismatch: store is pinned to '{pinned}', requested '{requested}' (run `docqa reindex`)")]
    EmbeddingModelMismatch { pinned: String, requested: String },

    #[error(transparent)]
    Passage(#[from] PassageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One failed configuration check
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted key, e.g. `retrieval.fan_out`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocqaError>;
