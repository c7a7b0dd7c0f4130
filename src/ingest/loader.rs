//! Document loading: paged plain text and pre-chunked JSONL

use crate::corpus::Passage;
use crate::error::{DocqaError, Result};
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;

/// Page separator in plain-text documents
pub const PAGE_BREAK: char = '\x0c';

/// Text of one page, 1-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// Split a document into pages on form feeds
///
/// Blank pages are dropped but still count towards numbering.
pub fn split_pages(text: &str) -> Vec<Page> {
    text.split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Page {
            number: i as u32 + 1,
            text: page.to_string(),
        })
        .collect()
}

/// Read a plain-text document
pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| DocqaError::Io {
        source: e,
        context: format!("Failed to read document: {:?}", path),
    })
}

/// Source name for a document path: its file name
pub fn source_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| DocqaError::Config(format!("Cannot derive source name from {:?}", path)))
}

#[derive(Debug, Deserialize)]
struct JsonlPassage {
    source: String,
    page: u32,
    chunk_index: u32,
    text: String,
}

/// Parse pre-chunked passages, one JSON object per line
pub fn read_jsonl(reader: impl BufRead) -> Result<Vec<Passage>> {
    let mut passages = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DocqaError::Io {
            source: e,
            context: format!("Failed to read JSONL line {}", line_no + 1),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record: JsonlPassage = serde_json::from_str(&line).map_err(|e| DocqaError::Json {
            source: e,
            context: format!("Invalid passage on line {}", line_no + 1),
        })?;

        passages.push(Passage::new(
            record.source,
            record.page,
            record.chunk_index,
            record.text,
        )?);
    }

    Ok(passages)
}
