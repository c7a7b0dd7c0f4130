//! End-to-end query pipeline over a real store, real indexes and oracle doubles

mod common;

use common::{
    test_config, EchoGenerator, FailingEmbedder, FailingEncoder, HashEmbedder, OverlapEncoder,
    Pipeline,
};
use docqa::corpus::Passage;
use docqa::oracle::{OracleError, OracleKind};
use docqa::query::{OutcomeKind, QueryError, QueryOutcome, NO_RESULTS_MESSAGE, REFUSAL_MESSAGE};
use docqa::retrieval::{logistic, Citation, RetrievalError};
use docqa::safety::{DenyReason, Intent, MedicalTermPolicy};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_answers_with_top_citation() {
    let pipeline = Pipeline::with_corpus();
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(Arc::new(OverlapEncoder::new()), generator.clone());

    let outcome = orchestrator
        .handle_query("What is aspirin used for?")
        .await
        .unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Answered);
    let response = outcome.into_response();

    let top = &response.citations[0];
    assert_eq!(top.source, "guide.pdf");
    assert_eq!(top.page, 3);
    assert_eq!(top.chunk, 0);
    assert!(response.confidence > 0.5);
    assert_eq!(response.confidence, top.confidence);
    assert!(response.citations.len() <= pipeline.config.retrieval.top_k);
    assert!(response.answer.contains("guide.pdf (page 3, chunk 0)"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_single_passage_answer_cites_it() {
    let pipeline = Pipeline::new();
    let passage = Passage::new("guide.pdf", 3, 0, "Aspirin dosage is 325mg").unwrap();
    pipeline.ingestor.ingest_passages(vec![passage]).unwrap();
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(Arc::new(OverlapEncoder::new()), generator.clone());

    let outcome = orchestrator
        .handle_query("What is the aspirin dosage?")
        .await
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Answered);
    let response = outcome.into_response();

    // "is", "aspirin" and "dosage" overlap: logit 1.0
    let confidence = logistic(1.0);
    assert!((confidence - 0.731_058_6).abs() < 1e-6);
    assert_eq!(
        response.citations,
        vec![Citation {
            source: "guide.pdf".to_string(),
            page: 3,
            chunk: 0,
            confidence,
        }]
    );
    assert_eq!(response.confidence, confidence);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_citations_are_in_rank_order() {
    let pipeline = Pipeline::with_corpus();
    let orchestrator = pipeline.orchestrator(
        Arc::new(OverlapEncoder::new()),
        Arc::new(EchoGenerator::new()),
    );

    let response = orchestrator
        .handle_query("How long does fever last in adults?")
        .await
        .unwrap()
        .into_response();

    assert!(!response.citations.is_empty());
    for pair in response.citations.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    assert_eq!(response.citations[0].page, 1);
}

#[tokio::test]
async fn test_blank_queries_are_rejected_before_retrieval() {
    let pipeline = Pipeline::with_corpus();
    let encoder = Arc::new(OverlapEncoder::new());
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(encoder.clone(), generator.clone());
    let embeds_before = pipeline.embedder.calls();

    for text in ["", "   ", "\n\t"] {
        let err = orchestrator.handle_query(text).await.unwrap_err();
        assert!(err.is_invalid_query(), "{:?} should be invalid", text);
    }

    assert_eq!(pipeline.embedder.calls(), embeds_before);
    assert_eq!(encoder.calls(), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_overlong_query_is_rejected() {
    let pipeline = Pipeline::with_corpus();
    let orchestrator = pipeline.orchestrator(
        Arc::new(OverlapEncoder::new()),
        Arc::new(EchoGenerator::new()),
    );

    let text = "fever ".repeat(pipeline.config.query.max_query_chars);
    let err = orchestrator.handle_query(&text).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_empty_corpus_refuses_without_oracle_calls() {
    let pipeline = Pipeline::new();
    let encoder = Arc::new(OverlapEncoder::new());
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(encoder.clone(), generator.clone());

    let outcome = orchestrator
        .handle_query("What is aspirin used for?")
        .await
        .unwrap();

    match outcome {
        QueryOutcome::Refused { response, reason } => {
            assert_eq!(reason, DenyReason::NoEvidence);
            assert_eq!(response.answer, NO_RESULTS_MESSAGE);
            assert!(response.citations.is_empty());
            assert_eq!(response.confidence, 0.0);
        }
        other => panic!("expected refusal, got {:?}", other),
    }

    assert_eq!(encoder.calls(), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_empty_corpus_skips_generation_without_evidence_gate() {
    let mut config = test_config();
    config.safety.require_evidence = false;
    let pipeline = Pipeline::with_config(config);
    let encoder = Arc::new(OverlapEncoder::new());
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(encoder.clone(), generator.clone());

    let outcome = orchestrator
        .handle_query("What is the aspirin dosage?")
        .await
        .unwrap();

    match outcome {
        QueryOutcome::Refused { response, reason } => {
            assert_eq!(reason, DenyReason::NoEvidence);
            assert_eq!(response.answer, NO_RESULTS_MESSAGE);
            assert!(response.citations.is_empty());
            assert_eq!(response.confidence, 0.0);
        }
        other => panic!("expected refusal, got {:?}", other),
    }

    assert_eq!(encoder.calls(), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_gate_refusal_skips_generation() {
    let pipeline = Pipeline::with_corpus();
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(Arc::new(OverlapEncoder::new()), generator.clone());

    let cases = [
        (
            "Do I have a fever?",
            DenyReason::PersonalIntent(Intent::SelfDiagnosis),
        ),
        (
            "What medicine should I take for pain?",
            DenyReason::PersonalIntent(Intent::Prescribing),
        ),
        ("Can I take aspirin for my headache?", DenyReason::ClinicalSelfReference),
        (
            "How is fever diagnosed?",
            DenyReason::MedicalTerm("diagnosed".to_string()),
        ),
    ];

    for (text, expected) in cases {
        match orchestrator.handle_query(text).await.unwrap() {
            QueryOutcome::Refused { response, reason } => {
                assert_eq!(reason, expected, "{}", text);
                assert_eq!(response.answer, REFUSAL_MESSAGE);
                assert!(response.citations.is_empty());
                assert_eq!(response.confidence, 0.0);
            }
            other => panic!("{} should be refused, got {:?}", text, other),
        }
    }

    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_audit_policy_allows_medical_terms_only() {
    let mut config = test_config();
    config.safety.medical_term_policy = MedicalTermPolicy::AllowWithAudit;
    let pipeline = Pipeline::with_config(config);
    pipeline.load_corpus();

    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(Arc::new(OverlapEncoder::new()), generator.clone());

    let outcome = orchestrator
        .handle_query("How is fever diagnosed?")
        .await
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Answered);

    let outcome = orchestrator
        .handle_query("Can I take aspirin for my headache?")
        .await
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Refused);

    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_identical_queries_are_deterministic() {
    let pipeline = Pipeline::with_corpus();
    let orchestrator = pipeline.orchestrator(
        Arc::new(OverlapEncoder::new()),
        Arc::new(EchoGenerator::new()),
    );

    let first = orchestrator
        .handle_query("Where should medicines be kept?")
        .await
        .unwrap()
        .into_response();
    let second = orchestrator
        .handle_query("Where should medicines be kept?")
        .await
        .unwrap()
        .into_response();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_reranker_failure_fails_the_query() {
    let pipeline = Pipeline::with_corpus();
    let generator = Arc::new(EchoGenerator::new());
    let orchestrator = pipeline.orchestrator(Arc::new(FailingEncoder), generator.clone());

    let err = orchestrator
        .handle_query("What is aspirin used for?")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QueryError::Retrieval(RetrievalError::Oracle {
            kind: OracleKind::CrossEncoder,
            source: OracleError::MalformedOutput(_),
        })
    ));
    assert!(!err.is_invalid_query());
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_generation_failure_fails_the_query() {
    let pipeline = Pipeline::with_corpus();
    let generator = Arc::new(EchoGenerator::failing());
    let orchestrator = pipeline.orchestrator(Arc::new(OverlapEncoder::new()), generator.clone());

    let err = orchestrator
        .handle_query("What is aspirin used for?")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QueryError::Generation(OracleError::InvalidInput(_))
    ));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_generation_timeout_is_bounded() {
    let mut config = test_config();
    config.oracle.generate_timeout_ms = 50;
    config.oracle.max_retries = 1;
    let pipeline = Pipeline::with_config(config);
    pipeline.load_corpus();

    let generator = Arc::new(EchoGenerator::slow(Duration::from_secs(5)));
    let orchestrator = pipeline.orchestrator(Arc::new(OverlapEncoder::new()), generator.clone());

    let started = std::time::Instant::now();
    let err = orchestrator
        .handle_query("What is aspirin used for?")
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Generation(OracleError::Timeout(_))));
    assert_eq!(generator.calls(), 2);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_dense_failure_degrades_to_lexical() {
    let pipeline = Pipeline::with_corpus();
    let retriever = pipeline.retriever(Arc::new(FailingEmbedder), Arc::new(OverlapEncoder::new()));

    let results = retriever
        .retrieve("Aspirin relieves pain", 3)
        .await
        .unwrap();

    assert!(!results.is_empty());
    let top = results[0].passage();
    assert_eq!((top.source(), top.page()), ("guide.pdf", 3));
}

#[tokio::test]
async fn test_model_mismatch_degrades_to_lexical() {
    let pipeline = Pipeline::with_corpus();
    let retriever = pipeline.retriever(
        Arc::new(HashEmbedder::named("other-model")),
        Arc::new(OverlapEncoder::new()),
    );

    let results = retriever
        .retrieve("Aspirin relieves pain", 3)
        .await
        .unwrap();

    assert!(!results.is_empty());
    let top = results[0].passage();
    assert_eq!((top.source(), top.page()), ("guide.pdf", 3));
}

#[tokio::test]
async fn test_retrieval_respects_top_k() {
    let pipeline = Pipeline::with_corpus();
    let retriever = pipeline.retriever(
        pipeline.embedder.clone(),
        Arc::new(OverlapEncoder::new()),
    );

    let corpus = pipeline.snapshots.load().len();
    assert_eq!(corpus, 5);

    for top_k in [0, 1, 2, 5, 10] {
        let results = retriever.retrieve("fever pain iron", top_k).await.unwrap();
        assert_eq!(results.len(), top_k.min(corpus), "top_k = {}", top_k);
    }
}

#[tokio::test]
async fn test_query_sees_one_snapshot() {
    let pipeline = Pipeline::with_corpus();
    let retriever = pipeline.retriever(
        pipeline.embedder.clone(),
        Arc::new(OverlapEncoder::new()),
    );

    let before = pipeline.snapshots.load();
    pipeline
        .ingestor
        .ingest_text("vaccines.pdf", "Vaccination records list every dose received.")
        .unwrap();
    let after = pipeline.snapshots.load();

    assert_eq!(after.version(), before.version() + 1);
    assert_eq!(before.len() + 1, after.len());

    let held = retriever
        .candidates(&before, "vaccination record dose", 5)
        .await
        .unwrap();
    assert!(held.iter().all(|p| p.source() != "vaccines.pdf"));

    let current = retriever
        .candidates(&after, "vaccination record dose", 5)
        .await
        .unwrap();
    assert!(current.iter().any(|p| p.source() == "vaccines.pdf"));
}
