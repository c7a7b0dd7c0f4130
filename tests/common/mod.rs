//! Deterministic oracle doubles and a store-backed pipeline for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use docqa::config::Config;
use docqa::index::SnapshotCell;
use docqa::ingest::Ingestor;
use docqa::oracle::{CrossEncoder, Embedder, Generator, OracleError};
use docqa::query::QueryOrchestrator;
use docqa::retrieval::{HybridRetriever, ScoredPassage};
use docqa::safety::SafetyGate;
use docqa::storage::PassageStore;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const HASH_DIMENSION: usize = 64;

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn bucket(token: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % (HASH_DIMENSION as u64 - 1)) as usize
}

/// Hashed bag-of-words embedder with a constant bias dimension
pub struct HashEmbedder {
    model: String,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::named("test-hash")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASH_DIMENSION];
        for token in tokens(text) {
            vector[bucket(&token)] += 1.0;
        }
        vector[HASH_DIMENSION - 1] = 0.5;

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter_mut().for_each(|v| *v /= norm);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Embedder sharing the hash model's identity whose calls always fail
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        Err(OracleError::CallFailed("embedding service unavailable".to_string()))
    }

    fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    fn model_name(&self) -> &str {
        "test-hash"
    }
}

/// Scores a pair by the number of distinct query tokens found in the passage
pub struct OverlapEncoder {
    calls: AtomicUsize,
}

impl OverlapEncoder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CrossEncoder for OverlapEncoder {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query: HashSet<String> = tokens(query).collect();

        Ok(passages
            .iter()
            .map(|passage| {
                let found: HashSet<String> = tokens(passage).collect();
                query.intersection(&found).count() as f32 - 2.0
            })
            .collect())
    }
}

pub struct FailingEncoder;

impl CrossEncoder for FailingEncoder {
    fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>, OracleError> {
        Err(OracleError::MalformedOutput("no logits".to_string()))
    }
}

/// Echoes the top citation; optionally slow or failing
pub struct EchoGenerator {
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail: bool,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            fail: false,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(
        &self,
        query: &str,
        passages: &[ScoredPassage],
    ) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(OracleError::InvalidInput("model not loaded".to_string()));
        }

        let top = passages
            .first()
            .map(|p| p.citation().to_string())
            .unwrap_or_default();
        Ok(format!("{} => {}", query, top))
    }
}

/// Store, ingestor and snapshot cell rooted in a temporary directory
pub struct Pipeline {
    pub dir: TempDir,
    pub config: Config,
    pub snapshots: Arc<SnapshotCell>,
    pub embedder: Arc<HashEmbedder>,
    pub ingestor: Ingestor,
}

/// Default configuration with oracle timeouts suited to in-process doubles
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.oracle.embed_timeout_ms = 2_000;
    config.oracle.rerank_timeout_ms = 2_000;
    config.oracle.generate_timeout_ms = 2_000;
    config
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(mut config: Config) -> Self {
        let dir = TempDir::new().unwrap();
        config.storage.data_dir = dir.path().to_path_buf();

        let snapshots = Arc::new(SnapshotCell::default());
        let embedder = Arc::new(HashEmbedder::new());
        let store = PassageStore::open(&dir.path().join("passages.sqlite")).unwrap();
        let ingestor = Ingestor::new(
            store,
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            Arc::clone(&snapshots),
            &config,
        )
        .unwrap();

        Self {
            dir,
            config,
            snapshots,
            embedder,
            ingestor,
        }
    }

    /// Pipeline preloaded with a small three-document corpus
    pub fn with_corpus() -> Self {
        let pipeline = Self::new();
        pipeline.load_corpus();
        pipeline
    }

    pub fn load_corpus(&self) {
        self.ingestor
            .ingest_text(
                "guide.pdf",
                "Fever in adults usually resolves within three days.\x0c\
                 Keep all medicines out of the reach of children.\x0c\
                 Aspirin is used to reduce fever and relieve mild pain.",
            )
            .unwrap();
        self.ingestor
            .ingest_text(
                "nutrition.pdf",
                "Leafy greens are a good source of iron and folate.",
            )
            .unwrap();
        self.ingestor
            .ingest_text(
                "travel.pdf",
                "Travellers should carry a copy of their vaccination record.",
            )
            .unwrap();
    }

    pub fn retriever(
        &self,
        embedder: Arc<dyn Embedder>,
        encoder: Arc<dyn CrossEncoder>,
    ) -> HybridRetriever {
        HybridRetriever::new(
            embedder,
            encoder,
            Arc::clone(&self.snapshots),
            self.config.retrieval.clone(),
            &self.config.oracle,
        )
    }

    pub fn orchestrator(
        &self,
        encoder: Arc<dyn CrossEncoder>,
        generator: Arc<dyn Generator>,
    ) -> QueryOrchestrator {
        let embedder = Arc::clone(&self.embedder) as Arc<dyn Embedder>;
        QueryOrchestrator::new(
            self.retriever(embedder, encoder),
            SafetyGate::new(&self.config.safety).unwrap(),
            generator,
            &self.config,
        )
    }
}
