//! Durable passage store
//!
//! Owns no retrieval logic: passages, their embeddings and the pinned
//! embedding model live in SQLite, keyed by the identity triple. Writing an
//! existing triple updates it in place.

pub mod database;

pub use database::{Database, DbPool};

use crate::corpus::{Passage, PassageKey};
use crate::error::{DocqaError, Result};
use crate::index::IndexEntry;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::Path;

const META_EMBEDDING_MODEL: &str = "embedding_model";

/// Passage ready to persist
#[derive(Debug, Clone)]
pub struct PassageRecord {
    pub passage: Passage,
    pub text_hash: String,
    pub embedding: Vec<f32>,
}

impl PassageRecord {
    pub fn new(passage: Passage, embedding: Vec<f32>) -> Self {
        let text_hash = text_hash(passage.text());
        Self {
            passage,
            text_hash,
            embedding,
        }
    }
}

/// Content hash used to skip re-embedding unchanged text
pub fn text_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Result of an upsert batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub passage_count: usize,
    pub source_count: usize,
    pub embedding_model: Option<String>,
}

/// SQLite-backed passage store
pub struct PassageStore {
    db: Database,
}

impl PassageStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::new(db_path)?,
        })
    }

    /// Insert or update passages in one transaction
    pub fn upsert(&self, records: &[PassageRecord]) -> Result<UpsertStats> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        let mut stats = UpsertStats::default();

        {
            let mut exists = tx.prepare_cached(
                "SELECT 1 FROM passages WHERE source = ?1 AND page = ?2 AND chunk_index = ?3",
            )?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO passages (source, page, chunk_index, text, text_hash, embedding, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (source, page, chunk_index) DO UPDATE SET
                    text = excluded.text,
                    text_hash = excluded.text_hash,
                    embedding = excluded.embedding,
                    ingested_at = excluded.ingested_at",
            )?;

            for record in records {
                let key = record.passage.id();
                let existed = exists
                    .query_row(params![key.source, key.page, key.chunk_index], |_| Ok(()))
                    .optional()?
                    .is_some();

                upsert.execute(params![
                    key.source,
                    key.page,
                    key.chunk_index,
                    record.passage.text(),
                    record.text_hash,
                    encode_embedding(&record.embedding),
                    now,
                ])?;

                if existed {
                    stats.updated += 1;
                } else {
                    stats.inserted += 1;
                }
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    /// Stored hash and embedding for `key`, if present
    pub fn stored_embedding(&self, key: &PassageKey) -> Result<Option<(String, Vec<f32>)>> {
        let conn = self.db.get_conn()?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT text_hash, embedding FROM passages
                 WHERE source = ?1 AND page = ?2 AND chunk_index = ?3",
                params![key.source, key.page, key.chunk_index],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((hash, bytes)) => Ok(Some((hash, decode_embedding(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Every stored passage with its embedding, in identity order
    pub fn load_entries(&self) -> Result<Vec<IndexEntry>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, page, chunk_index, text, embedding FROM passages
             ORDER BY source, page, chunk_index",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (source, page, chunk_index, text, bytes) = row?;
            entries.push(IndexEntry {
                passage: Passage::new(source, page, chunk_index, text)?,
                embedding: decode_embedding(&bytes)?,
            });
        }

        Ok(entries)
    }

    /// Delete every passage of `source`
    pub fn remove_source(&self, source: &str) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let removed = conn.execute("DELETE FROM passages WHERE source = ?1", params![source])?;
        Ok(removed)
    }

    /// Distinct source names with their passage counts
    pub fn sources(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM passages GROUP BY source ORDER BY source",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    /// Embedding model the stored vectors were produced with
    pub fn pinned_model(&self) -> Result<Option<String>> {
        let conn = self.db.get_conn()?;
        let model = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![META_EMBEDDING_MODEL],
                |row| row.get(0),
            )
            .optional()?;
        Ok(model)
    }

    pub fn pin_model(&self, model: &str) -> Result<()> {
        let conn = self.db.get_conn()?;
        conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![META_EMBEDDING_MODEL, model],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.db.get_conn()?;
        let (passages, sources): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT source) FROM passages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStats {
            passage_count: passages as usize,
            source_count: sources as usize,
            embedding_model: self.pinned_model()?,
        })
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(DocqaError::Storage(format!(
            "Corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
