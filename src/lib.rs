//! docqa - Grounded question answering over private documents
//!
//! Passages are retrieved by hybrid dense + lexical search over an immutable
//! index snapshot, merged into one deduplicated set, scored by a
//! cross-encoder, checked by a safety gate, and only then handed to a
//! generative model together with their citations.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod ingest;
pub mod oracle;
pub mod query;
pub mod retrieval;
pub mod safety;
pub mod storage;

pub use error::{DocqaError, Result};
