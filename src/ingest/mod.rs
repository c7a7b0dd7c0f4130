//! Ingestion: chunk, embed, persist, then publish a fresh index snapshot
//!
//! The ingestor is the only writer. Every mutating operation ends by
//! rebuilding a complete [`IndexSnapshot`] from the store and publishing it
//! atomically, so queries never observe a partially updated index.

mod chunker;
mod loader;

pub use chunker::TextSplitter;
pub use loader::{read_jsonl, read_text, source_name, split_pages, Page, PAGE_BREAK};

use crate::config::Config;
use crate::corpus::Passage;
use crate::error::{DocqaError, Result};
use crate::index::{IndexParams, IndexSnapshot, SnapshotCell};
use crate::oracle::{Embedder, OracleError};
use crate::storage::{text_hash, PassageRecord, PassageStore, UpsertStats};
use serde::Serialize;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one ingestion operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub passages: usize,
    pub embedded: usize,
    pub reused: usize,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub snapshot_version: u64,
    pub duration_ms: u64,
}

/// Writes passages into the store and keeps the published snapshot current
pub struct Ingestor {
    store: PassageStore,
    embedder: Arc<dyn Embedder>,
    snapshots: Arc<SnapshotCell>,
    splitter: TextSplitter,
    index_params: IndexParams,
    batch_size: usize,
    write_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(
        store: PassageStore,
        embedder: Arc<dyn Embedder>,
        snapshots: Arc<SnapshotCell>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            store,
            embedder,
            snapshots,
            splitter: TextSplitter::new(
                config.ingestion.chunk_size,
                config.ingestion.chunk_overlap,
            )?,
            index_params: config.retrieval.index_params(),
            batch_size: config.embedding.batch_size.max(1),
            write_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &PassageStore {
        &self.store
    }

    /// Fail unless the store is empty or pinned to this embedder's model
    pub fn check_model(&self) -> Result<()> {
        match self.store.pinned_model()? {
            Some(pinned) if pinned != self.embedder.model_name() => {
                Err(DocqaError::EmbeddingModelMismatch {
                    pinned,
                    requested: self.embedder.model_name().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Chunk and ingest a paged plain-text document
    pub fn ingest_text(&self, source: &str, text: &str) -> Result<IngestReport> {
        let mut passages = Vec::new();
        for page in split_pages(text) {
            for (chunk_index, chunk) in self.splitter.split(&page.text).into_iter().enumerate() {
                passages.push(Passage::new(source, page.number, chunk_index as u32, chunk)?);
            }
        }

        if passages.is_empty() {
            return Err(DocqaError::Config(format!(
                "No content extracted from '{}'",
                source
            )));
        }

        debug!("Split '{}' into {} passages", source, passages.len());
        self.ingest_passages(passages)
    }

    /// Ingest a plain-text file, named by `source` or the file name
    pub fn ingest_file(&self, path: &Path, source: Option<&str>) -> Result<IngestReport> {
        let source = match source {
            Some(source) => source.to_string(),
            None => source_name(path)?,
        };
        let text = read_text(path)?;
        self.ingest_text(&source, &text)
    }

    /// Ingest pre-chunked passages from a JSONL file
    pub fn ingest_jsonl(&self, path: &Path) -> Result<IngestReport> {
        let file = std::fs::File::open(path).map_err(|e| DocqaError::Io {
            source: e,
            context: format!("Failed to open JSONL file: {:?}", path),
        })?;
        let passages = read_jsonl(BufReader::new(file))?;
        self.ingest_passages(passages)
    }

    /// Embed, persist and publish `passages`
    ///
    /// Passages whose text is unchanged since the last ingestion keep their
    /// stored embedding.
    pub fn ingest_passages(&self, passages: Vec<Passage>) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let start = Instant::now();
        self.check_model()?;

        let total = passages.len();
        let mut records = Vec::with_capacity(total);
        let mut pending = Vec::new();

        for passage in passages {
            match self.store.stored_embedding(passage.id())? {
                Some((hash, embedding)) if hash == text_hash(passage.text()) => {
                    records.push(PassageRecord::new(passage, embedding));
                }
                _ => pending.push(passage),
            }
        }

        let reused = records.len();
        let embedded = pending.len();
        records.extend(self.embed_all(pending)?);

        let stats = self.store.upsert(&records)?;
        self.store.pin_model(self.embedder.model_name())?;
        let snapshot_version = self.rebuild()?;

        let report = IngestReport {
            passages: total,
            embedded,
            reused,
            inserted: stats.inserted,
            updated: stats.updated,
            removed: 0,
            snapshot_version,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Ingested {} passages ({} embedded, {} reused) in {}ms",
            report.passages, report.embedded, report.reused, report.duration_ms
        );

        Ok(report)
    }

    /// Remove every passage of `source`
    pub fn remove_source(&self, source: &str) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let start = Instant::now();
        self.check_model()?;

        let removed = self.store.remove_source(source)?;
        info!("Removed {} passages of '{}'", removed, source);

        Ok(IngestReport {
            removed,
            snapshot_version: self.rebuild()?,
            duration_ms: start.elapsed().as_millis() as u64,
            ..IngestReport::default()
        })
    }

    /// Re-embed every stored passage with the current model and re-pin it
    pub fn reindex(&self) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let start = Instant::now();

        if let Some(previous) = self.store.pinned_model()? {
            info!(
                "Reindexing from '{}' to '{}'",
                previous,
                self.embedder.model_name()
            );
        }

        let passages: Vec<Passage> = self
            .store
            .load_entries()?
            .into_iter()
            .map(|entry| entry.passage)
            .collect();
        let total = passages.len();

        let records = self.embed_all(passages)?;
        let UpsertStats { inserted, updated } = self.store.upsert(&records)?;
        self.store.pin_model(self.embedder.model_name())?;

        Ok(IngestReport {
            passages: total,
            embedded: total,
            inserted,
            updated,
            snapshot_version: self.rebuild()?,
            duration_ms: start.elapsed().as_millis() as u64,
            ..IngestReport::default()
        })
    }

    /// Build a snapshot from the store and publish it without writing
    pub fn publish(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.check_model()?;
        self.rebuild()
    }

    fn rebuild(&self) -> Result<u64> {
        let entries = self.store.load_entries()?;
        let version = self.snapshots.load().version() + 1;

        let snapshot = IndexSnapshot::build(
            version,
            self.embedder.model_name(),
            self.embedder.dimension(),
            entries,
            &self.index_params,
        )?;
        self.snapshots.publish(snapshot);

        Ok(version)
    }

    fn embed_all(&self, passages: Vec<Passage>) -> Result<Vec<PassageRecord>> {
        let mut records = Vec::with_capacity(passages.len());

        for batch in passages.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text().to_string()).collect();
            let vectors = self.embedder.embed(&texts)?;

            if vectors.len() != batch.len() {
                return Err(OracleError::MalformedOutput(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }

            for (passage, vector) in batch.iter().zip(vectors) {
                if vector.len() != self.embedder.dimension() {
                    return Err(OracleError::DimensionMismatch {
                        expected: self.embedder.dimension(),
                        actual: vector.len(),
                    }
                    .into());
                }
                records.push(PassageRecord::new(passage.clone(), vector));
            }

            debug!("Embedded batch of {} passages", batch.len());
        }

        Ok(records)
    }
}
