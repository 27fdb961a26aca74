//! Vector-driven conformance testing.
//!
//! A corpus is a JSON file of named vectors, each naming an operation, its
//! input and either the expected output (`ok`) or the expected error code
//! (`err`). Outputs are compared as exact strings, never as parsed trees, so
//! any byte-level divergence in canonical serialization is reported.

pub mod corpus;

pub use corpus::{Corpus, CorpusManifest, CorpusResults, CorpusRunner, TestResult, TestVector};

/// Result type for corpus loading.
pub type ConformanceResult<T> = Result<T, ConformanceError>;

/// Errors raised while loading a corpus.
#[derive(Debug, thiserror::Error)]
pub enum ConformanceError {
    /// The corpus file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The corpus file is not a valid corpus
    #[error("invalid corpus: {0}")]
    Format(#[from] serde_json::Error),
}
