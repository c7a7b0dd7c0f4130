use anyhow::Context;
use docqa::cli::{Cli, Commands, ConfigAction};
use docqa::config::{Config, ConfigValidator};
use docqa::error::{DocqaError, Result};
use docqa::index::SnapshotCell;
use docqa::ingest::{IngestReport, Ingestor};
use docqa::oracle::{Embedder, FastEmbedCrossEncoder, FastEmbedProvider, OllamaGenerator};
use docqa::query::{OutcomeKind, QueryOrchestrator, QueryOutcome};
use docqa::retrieval::HybridRetriever;
use docqa::safety::SafetyGate;
use docqa::storage::PassageStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const EXIT_FAILED: i32 = 1;
const EXIT_INVALID_QUERY: i32 = 2;
const EXIT_REFUSED: i32 = 3;

fn main() -> Result<()> {
    let Cli {
        config: config_path,
        profile,
        verbose,
        command,
    } = Cli::parse_args();

    init_logging(verbose);

    match command {
        Commands::Ingest {
            path,
            source,
            jsonl,
        } => {
            let config = load_config(config_path, profile)?;
            cmd_ingest(&config, &path, source.as_deref(), jsonl)?;
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => {
            let config = load_config(config_path, profile)?;
            let code = cmd_ask(&config, &question, top_k, json)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Search { query, top_k, json } => {
            let config = load_config(config_path, profile)?;
            cmd_search(&config, &query, top_k, json)?;
        }
        Commands::Remove { source } => {
            let config = load_config(config_path, profile)?;
            let report = open_ingestor(&config, Arc::new(SnapshotCell::default()))?
                .remove_source(&source)?;
            println!("✓ Removed {} passages of '{}'", report.removed, source);
        }
        Commands::Reindex => {
            let config = load_config(config_path, profile)?;
            let report = open_ingestor(&config, Arc::new(SnapshotCell::default()))?.reindex()?;
            print_report("Reindexed", &report);
        }
        Commands::Stats { json } => {
            let config = load_config(config_path, profile)?;
            cmd_stats(&config, json)?;
        }
        Commands::Config { action } => {
            cmd_config(config_path, profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "docqa=debug" } else { "docqa=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    Ok(rt)
}

fn open_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let provider = FastEmbedProvider::new(&config.embedding.model, config.embedding.batch_size)?;
    Ok(Arc::new(provider))
}

fn open_ingestor(config: &Config, snapshots: Arc<SnapshotCell>) -> Result<Ingestor> {
    let store = PassageStore::open(&config.store_path()?)?;
    Ingestor::new(store, open_embedder(config)?, snapshots, config)
}

/// Load the store into a fresh snapshot and wire up the retriever
fn build_retriever(config: &Config) -> Result<HybridRetriever> {
    let snapshots = Arc::new(SnapshotCell::default());
    let embedder = open_embedder(config)?;

    let store = PassageStore::open(&config.store_path()?)?;
    let ingestor = Ingestor::new(store, Arc::clone(&embedder), Arc::clone(&snapshots), config)?;
    ingestor.publish()?;

    let encoder = FastEmbedCrossEncoder::new(&config.reranker.model, config.reranker.batch_size)?;

    Ok(HybridRetriever::new(
        embedder,
        Arc::new(encoder),
        snapshots,
        config.retrieval.clone(),
        &config.oracle,
    ))
}

fn build_orchestrator(config: &Config) -> Result<QueryOrchestrator> {
    let retriever = build_retriever(config)?;
    let gate = SafetyGate::new(&config.safety)?;
    let generator = OllamaGenerator::new(
        &config.generation.base_url,
        &config.generation.model,
        config.generation.temperature,
        Duration::from_millis(config.oracle.generate_timeout_ms),
    )?;

    Ok(QueryOrchestrator::new(
        retriever,
        gate,
        Arc::new(generator),
        config,
    ))
}

fn cmd_ingest(config: &Config, path: &Path, source: Option<&str>, jsonl: bool) -> Result<()> {
    let ingestor = open_ingestor(config, Arc::new(SnapshotCell::default()))?;

    let report = if jsonl {
        ingestor.ingest_jsonl(path)?
    } else {
        ingestor.ingest_file(path, source)?
    };

    print_report("Ingested", &report);
    Ok(())
}

fn print_report(action: &str, report: &IngestReport) {
    println!(
        "✓ {} {} passages ({} new, {} updated)",
        action, report.passages, report.inserted, report.updated
    );
    println!(
        "  Embedded: {}, reused: {}, snapshot v{}, {}ms",
        report.embedded, report.reused, report.snapshot_version, report.duration_ms
    );
}

fn cmd_ask(config: &Config, question: &str, top_k: Option<usize>, json: bool) -> Result<i32> {
    let mut orchestrator = build_orchestrator(config)?;
    if let Some(top_k) = top_k {
        orchestrator = orchestrator.with_top_k(top_k);
    }

    let rt = runtime()?;
    match rt.block_on(orchestrator.handle_query(question)) {
        Ok(outcome) => {
            print_outcome(&outcome, json)?;
            Ok(match outcome.kind() {
                OutcomeKind::Answered => 0,
                _ => EXIT_REFUSED,
            })
        }
        Err(e) => {
            if json {
                print_json(&serde_json::json!({
                    "outcome": OutcomeKind::Failed,
                    "error": e.to_string(),
                }))?;
            } else {
                eprintln!("✗ {}", e);
            }

            Ok(if e.is_invalid_query() {
                EXIT_INVALID_QUERY
            } else {
                EXIT_FAILED
            })
        }
    }
}

fn print_outcome(outcome: &QueryOutcome, json: bool) -> Result<()> {
    let response = outcome.response();

    if json {
        let reason = match outcome {
            QueryOutcome::Refused { reason, .. } => Some(reason.to_string()),
            QueryOutcome::Answered(_) => None,
        };
        return print_json(&serde_json::json!({
            "outcome": outcome.kind(),
            "answer": response.answer,
            "citations": response.citations,
            "confidence": response.confidence,
            "reason": reason,
        }));
    }

    if let QueryOutcome::Refused { reason, .. } = outcome {
        println!("⚠ Refused: {}", reason);
    }

    println!("{}", response.answer);

    if !response.citations.is_empty() {
        println!("\nSources:");
        for (i, citation) in response.citations.iter().enumerate() {
            println!("  [{}] {}", i + 1, citation);
        }
    }

    println!("\nConfidence: {:.2}", response.confidence);
    Ok(())
}

fn cmd_search(config: &Config, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        return Err(DocqaError::Config("Search query cannot be empty".to_string()));
    }

    let retriever = build_retriever(config)?;
    let top_k = top_k.unwrap_or_else(|| retriever.default_top_k());

    let rt = runtime()?;
    let results = rt.block_on(retriever.retrieve(query, top_k))?;

    if json {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .map(|scored| {
                let passage = scored.passage();
                serde_json::json!({
                    "source": passage.source(),
                    "page": passage.page(),
                    "chunk": passage.chunk_index(),
                    "confidence": scored.confidence(),
                    "logit": scored.logit(),
                    "text": passage.text(),
                })
            })
            .collect();
        return print_json(&rows);
    }

    if results.is_empty() {
        println!("No matching passages");
        return Ok(());
    }

    for (i, scored) in results.iter().enumerate() {
        println!("[{}] {}", i + 1, scored.citation());
        println!("    {}", scored.passage().preview(160).replace('\n', " "));
    }

    Ok(())
}

fn cmd_stats(config: &Config, json: bool) -> Result<()> {
    let store = PassageStore::open(&config.store_path()?)?;
    let stats = store.stats()?;
    let sources = store.sources()?;

    if json {
        return print_json(&serde_json::json!({
            "stats": stats,
            "sources": sources,
        }));
    }

    println!("docqa Store");
    println!("===========");
    println!("Passages: {}", stats.passage_count);
    println!("Sources: {}", stats.source_count);
    println!(
        "Embedding model: {}",
        stats.embedding_model.as_deref().unwrap_or("(none)")
    );

    if !sources.is_empty() {
        println!();
        for (source, count) in sources {
            println!("  {} ({} passages)", source, count);
        }
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| DocqaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let section_value = value.get(&section).ok_or_else(|| {
                        DocqaError::Config(format!("Unknown config section: {}", section))
                    })?;
                    print_json(section_value)?;
                }
                None => print_json(&value)?,
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| DocqaError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", rendered);
    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'docqa config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
