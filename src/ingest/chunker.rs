//! Recursive character text splitter

use crate::error::{DocqaError, Result};
use std::collections::VecDeque;

/// Separators tried in order; the empty separator splits into characters
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Splits text into chunks of at most `chunk_size` characters
///
/// Text is split on the coarsest separator present, pieces are packed
/// greedily into chunks, and the tail of each chunk (up to `chunk_overlap`
/// characters) is carried into the next. Pieces still too long are split
/// again with the next separator.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocqaError::Config(
                "Chunk size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(DocqaError::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into trimmed, non-empty chunks
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len());
        let separator = separators.get(position).copied().unwrap_or("");
        let rest = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if piece.chars().count() <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }

            if rest.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split_with(piece, rest));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks
    }

    /// Pack pieces into chunks, carrying up to `chunk_overlap` characters
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = separator.chars().count();
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.chars().count();
            let joint = if window.is_empty() { 0 } else { sep_len };

            if total + joint + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);

                while total > self.chunk_overlap
                    || (total > 0 && total + len + sep_len > self.chunk_size)
                {
                    let had_many = window.len() > 1;
                    match window.pop_front() {
                        Some((_, first_len)) => {
                            total -= first_len + if had_many { sep_len } else { 0 };
                        }
                        None => break,
                    }
                }
            }

            let joint = if window.is_empty() { 0 } else { sep_len };
            total += joint + len;
            window.push_back((piece, len));
        }

        if !window.is_empty() {
            push_joined(&mut chunks, &window, separator);
        }

        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>, separator: &str) {
    let joined = window
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
