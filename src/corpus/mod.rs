//! Passages: the immutable units of retrievable text
//!
//! A passage is identified by its `(source, page, chunk_index)` triple. The
//! triple is unique across the store and doubles as the deterministic
//! tie-break order used by the reranker.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassageError {
    #[error("Passage text cannot be empty ({0})")]
    EmptyText(PassageKey),

    #[error("Passage source cannot be empty")]
    EmptySource,

    #[error("Page numbers are 1-indexed, got 0 for '{0}'")]
    ZeroPage(String),
}

/// Identity triple of a passage
///
/// Field order matters: the derived `Ord` compares source, then page, then
/// chunk index, which is the tie-break order for equal confidences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassageKey {
    /// Originating document name
    pub source: String,
    /// 1-indexed page within the source document
    pub page: u32,
    /// 0-indexed position within the page's split
    pub chunk_index: u32,
}

impl PassageKey {
    pub fn new(source: impl Into<String>, page: u32, chunk_index: u32) -> Self {
        Self {
            source: source.into(),
            page,
            chunk_index,
        }
    }
}

impl fmt::Display for PassageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | page {} | chunk {}",
            self.source, self.page, self.chunk_index
        )
    }
}

/// A chunk of document text with its identity
///
/// Embeddings are not carried here; they belong to the dense index and the
/// passage store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    key: PassageKey,
    text: String,
}

impl Passage {
    /// Create a validated passage
    pub fn new(
        source: impl Into<String>,
        page: u32,
        chunk_index: u32,
        text: impl Into<String>,
    ) -> Result<Self, PassageError> {
        Self::from_key(PassageKey::new(source, page, chunk_index), text)
    }

    pub fn from_key(key: PassageKey, text: impl Into<String>) -> Result<Self, PassageError> {
        let text = text.into();

        if key.source.trim().is_empty() {
            return Err(PassageError::EmptySource);
        }
        if key.page == 0 {
            return Err(PassageError::ZeroPage(key.source));
        }
        if text.trim().is_empty() {
            return Err(PassageError::EmptyText(key));
        }

        Ok(Self { key, text })
    }

    /// Identity triple
    pub fn id(&self) -> &PassageKey {
        &self.key
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &str {
        &self.key.source
    }

    pub fn page(&self) -> u32 {
        self.key.page
    }

    pub fn chunk_index(&self) -> u32 {
        self.key.chunk_index
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => format!("{}...", &self.text[..byte_idx]),
            None => self.text.clone(),
        }
    }
}
