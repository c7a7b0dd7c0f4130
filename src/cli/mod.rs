//! Command-line interface of the `docqa` binary
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    author = "neur0map",
    about = "Grounded question answering over private medical documents",
    long_about = "docqa ingests documents into a local passage store, retrieves supporting passages \
                  with hybrid dense + lexical search, reranks them with a cross-encoder, and answers \
                  questions with citations, refusing personal diagnosis and prescribing requests."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/docqa/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a document (form feeds separate pages) or a JSONL passage file
    Ingest {
        /// Document path
        path: PathBuf,

        /// Source name recorded in citations (defaults to the file name)
        #[arg(short, long)]
        source: Option<String>,

        /// Treat the input as pre-chunked JSONL passages
        #[arg(long)]
        jsonl: bool,
    },

    /// Ask a question and get a cited answer
    Ask {
        /// Question to ask
        question: String,

        /// Number of passages to retrieve (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve and rerank passages without generating an answer
    Search {
        /// Search query text
        query: String,

        /// Number of passages to return (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every passage of a source document
    Remove {
        /// Source name as shown by `docqa stats`
        source: String,
    },

    /// Re-embed every stored passage with the configured embedding model
    Reindex,

    /// Show passage store statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show {
        /// Print only this top-level section, e.g. `retrieval`
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Check a configuration file without running anything
    Validate {
        /// File to validate (defaults to --config or the standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
