//! Corpus-based conformance tests.
//!
//! Runs every vector of `tests/vectors/canonical.json`: canonical
//! serialization, ES6 number formatting, strict parsing and HMAC signature
//! verification, each compared byte for byte.

use jcs_keygen::conformance::{CorpusRunner, TestResult};
use std::path::{Path, PathBuf};

/// Path to the corpus file relative to the project root.
const CORPUS_PATH: &str = "tests/vectors/canonical.json";

fn corpus_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(CORPUS_PATH)
}

/// Load and run the full corpus.
#[test]
fn test_full_corpus() {
    let runner = CorpusRunner::load(corpus_path()).expect("Failed to load corpus");

    println!("Loaded corpus with {} vectors", runner.vector_count());
    let results = runner.run_all();

    println!("\n=== Corpus Conformance Results ===");
    println!("{}", results.summary());

    if !results.failures().is_empty() {
        println!("\nFailures:");
        for (id, result) in results.failures() {
            if let TestResult::Fail { expected, actual } = result {
                println!("  {} - expected: {}, actual: {}", id, expected, actual);
            }
        }
    }

    if !results.error_details().is_empty() {
        println!("\nErrors:");
        for (id, result) in results.error_details() {
            if let TestResult::Error { message } = result {
                println!("  {} - {}", id, message);
            }
        }
    }

    assert!(
        results.all_passed(),
        "Corpus conformance failed: {}",
        results.summary()
    );
    assert_eq!(results.skipped, 0, "every corpus operation must be known");
}

/// The manifest carries a format version and a description.
#[test]
fn test_corpus_manifest() {
    let runner = CorpusRunner::load(corpus_path()).expect("Failed to load corpus");
    assert_eq!(runner.manifest().format_version, "1");
    assert!(!runner.manifest().description.is_empty());
    assert!(runner.vector_count() > 40);
}

/// Every operation type appears in the corpus.
#[test]
fn test_corpus_covers_all_operations() {
    let content = std::fs::read_to_string(corpus_path()).expect("Failed to read corpus");
    for op in ["canonicalize", "serialize", "number", "parse", "verify_hmac"] {
        assert!(
            content.contains(&format!("\"op\": \"{}\"", op)),
            "no vector for operation {}",
            op
        );
    }
}
