//! Ingestion into the passage store and snapshot publication

mod common;

use common::{HashEmbedder, Pipeline};
use docqa::corpus::PassageKey;
use docqa::error::DocqaError;
use docqa::index::SnapshotCell;
use docqa::ingest::Ingestor;
use docqa::oracle::Embedder;
use docqa::storage::PassageStore;
use std::io::Write;
use std::sync::Arc;

fn second_ingestor(pipeline: &Pipeline, model: &str) -> Ingestor {
    let store = PassageStore::open(&pipeline.dir.path().join("passages.sqlite")).unwrap();
    Ingestor::new(
        store,
        Arc::new(HashEmbedder::named(model)) as Arc<dyn Embedder>,
        Arc::new(SnapshotCell::default()),
        &pipeline.config,
    )
    .unwrap()
}

#[test]
fn test_ingest_pages_and_publish() {
    let pipeline = Pipeline::new();
    assert_eq!(pipeline.snapshots.load().version(), 0);

    let report = pipeline
        .ingestor
        .ingest_text("guide.pdf", "First page.\x0c\x0cThird page.")
        .unwrap();

    assert_eq!(report.passages, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.snapshot_version, 1);

    let snapshot = pipeline.snapshots.load();
    assert_eq!(snapshot.version(), 1);
    assert_eq!(snapshot.embedding_model(), Some("test-hash"));
    assert!(snapshot.get(&PassageKey::new("guide.pdf", 1, 0)).is_some());
    assert!(snapshot.get(&PassageKey::new("guide.pdf", 2, 0)).is_none());
    assert!(snapshot.get(&PassageKey::new("guide.pdf", 3, 0)).is_some());
}

#[test]
fn test_reingest_updates_in_place_and_reuses_embeddings() {
    let pipeline = Pipeline::new();
    pipeline
        .ingestor
        .ingest_text("guide.pdf", "Rest and fluids.\x0cSee a doctor if symptoms persist.")
        .unwrap();
    let embeds = pipeline.embedder.calls();

    let report = pipeline
        .ingestor
        .ingest_text("guide.pdf", "Rest and fluids.\x0cSee a doctor if symptoms persist.")
        .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 2);
    assert_eq!(report.reused, 2);
    assert_eq!(report.embedded, 0);
    assert_eq!(pipeline.embedder.calls(), embeds);

    let report = pipeline
        .ingestor
        .ingest_text("guide.pdf", "Rest and fluids.\x0cSee a pharmacist first.")
        .unwrap();
    assert_eq!(report.reused, 1);
    assert_eq!(report.embedded, 1);

    let snapshot = pipeline.snapshots.load();
    assert_eq!(snapshot.len(), 2);
    let page_two = snapshot.get(&PassageKey::new("guide.pdf", 2, 0)).unwrap();
    assert_eq!(page_two.text(), "See a pharmacist first.");
}

#[test]
fn test_empty_document_is_rejected() {
    let pipeline = Pipeline::new();
    let result = pipeline.ingestor.ingest_text("blank.pdf", " \x0c \n ");
    assert!(result.is_err());
    assert_eq!(pipeline.snapshots.load().version(), 0);
}

#[test]
fn test_model_change_requires_reindex() {
    let pipeline = Pipeline::with_corpus();
    let other = second_ingestor(&pipeline, "other-model");

    let err = other
        .ingest_text("extra.pdf", "Another document.")
        .unwrap_err();
    match err {
        DocqaError::EmbeddingModelMismatch { pinned, requested } => {
            assert_eq!(pinned, "test-hash");
            assert_eq!(requested, "other-model");
        }
        other => panic!("expected model mismatch, got {:?}", other),
    }

    let report = other.reindex().unwrap();
    assert_eq!(report.passages, 5);
    assert_eq!(report.embedded, 5);
    assert_eq!(report.updated, 5);

    let stats = other.store().stats().unwrap();
    assert_eq!(stats.embedding_model.as_deref(), Some("other-model"));
    assert!(pipeline.ingestor.check_model().is_err());
    assert!(other.ingest_text("extra.pdf", "Another document.").is_ok());
}

#[test]
fn test_remove_source() {
    let pipeline = Pipeline::with_corpus();
    let version = pipeline.snapshots.load().version();

    let report = pipeline.ingestor.remove_source("guide.pdf").unwrap();
    assert_eq!(report.removed, 3);
    assert_eq!(report.snapshot_version, version + 1);

    let snapshot = pipeline.snapshots.load();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.passages().iter().all(|p| p.source() != "guide.pdf"));

    let report = pipeline.ingestor.remove_source("missing.pdf").unwrap();
    assert_eq!(report.removed, 0);
}

#[test]
fn test_ingest_jsonl_file() {
    let pipeline = Pipeline::new();
    let path = pipeline.dir.path().join("passages.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"{{"source":"leaflet.pdf","page":1,"chunk_index":0,"text":"Take with food."}}"#
    )
    .unwrap();
    writeln!(file).unwrap();
    writeln!(
        file,
        r#"{{"source":"leaflet.pdf","page":1,"chunk_index":1,"text":"Store below 25C."}}"#
    )
    .unwrap();
    drop(file);

    let report = pipeline.ingestor.ingest_jsonl(&path).unwrap();
    assert_eq!(report.passages, 2);

    let sources = pipeline.ingestor.store().sources().unwrap();
    assert_eq!(sources, vec![("leaflet.pdf".to_string(), 2)]);
}

#[test]
fn test_ingest_file_names_source() {
    let pipeline = Pipeline::new();
    let path = pipeline.dir.path().join("handbook.txt");
    std::fs::write(&path, "Wash hands before meals.").unwrap();

    pipeline.ingestor.ingest_file(&path, None).unwrap();
    pipeline
        .ingestor
        .ingest_file(&path, Some("Handbook 2024"))
        .unwrap();

    let snapshot = pipeline.snapshots.load();
    assert!(snapshot.get(&PassageKey::new("handbook.txt", 1, 0)).is_some());
    assert!(snapshot.get(&PassageKey::new("Handbook 2024", 1, 0)).is_some());
}

#[test]
fn test_publish_restores_snapshot_from_store() {
    let pipeline = Pipeline::with_corpus();

    let restarted = second_ingestor(&pipeline, "test-hash");
    let version = restarted.publish().unwrap();
    assert_eq!(version, 1);

    let mismatched = second_ingestor(&pipeline, "other-model");
    assert!(matches!(
        mismatched.publish(),
        Err(DocqaError::EmbeddingModelMismatch { .. })
    ));
}
