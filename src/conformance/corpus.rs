//! Corpus loading and execution.
//!
//! # Operations
//!
//! | `op`           | `input`                  | `ok`                      |
//! |----------------|--------------------------|---------------------------|
//! | `canonicalize` | `raw`                    | `normalized`              |
//! | `serialize`    | `raw`, `format`          | `output`                  |
//! | `number`       | `literal`                | `text`                    |
//! | `parse`        | `raw`                    | (none)                    |
//! | `verify_hmac`  | `raw`, `key` (hex)       | `algorithm`               |
//!
//! Every operation also accepts `{"err": {"code": N}}` as the expectation.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::ConformanceResult;
use crate::envelope::{verify, HmacKey, Verifier, VerifierOptions};
use crate::error::JcsResult;
use crate::json::{normalize, parse, parse_object, serialize, OutputFormat};

/// Corpus manifest.
#[derive(Debug, Deserialize)]
pub struct CorpusManifest {
    /// Format version of the corpus file
    pub format_version: String,
    /// What the corpus covers
    #[serde(default)]
    pub description: String,
}

/// A corpus containing test vectors.
#[derive(Debug, Deserialize)]
pub struct Corpus {
    /// Corpus metadata
    pub manifest: CorpusManifest,
    /// Test vectors in file order
    pub vectors: Vec<TestVector>,
}

/// A single test vector.
#[derive(Debug, Deserialize)]
pub struct TestVector {
    /// Unique identifier
    pub id: String,
    /// Operation, e.g. `canonicalize`
    pub op: String,
    /// Operation input
    pub input: serde_json::Value,
    /// `{"ok": {...}}` or `{"err": {"code": N}}`
    pub expected: serde_json::Value,
}

/// Result of running a single test vector.
#[derive(Debug)]
pub enum TestResult {
    /// Output matched
    Pass,
    /// Output differed
    Fail {
        /// Expected value
        expected: String,
        /// Actual value
        actual: String,
    },
    /// Operation not known to this runner
    Skip {
        /// Reason for skipping
        reason: String,
    },
    /// The vector itself is malformed
    Error {
        /// Error message
        message: String,
    },
}

impl TestResult {
    /// Returns true if this is a passing result.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Returns true if this is a failing result.
    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

/// Results from running the corpus.
#[derive(Debug, Default)]
pub struct CorpusResults {
    /// Number of tests that passed
    pub passed: usize,
    /// Number of tests that failed
    pub failed: usize,
    /// Number of tests that were skipped
    pub skipped: usize,
    /// Number of malformed vectors
    pub errors: usize,
    /// Detailed results for each test
    pub details: Vec<(String, TestResult)>,
}

impl CorpusResults {
    /// Create a new empty results container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a test result.
    pub fn record(&mut self, id: &str, result: TestResult) {
        match &result {
            TestResult::Pass => self.passed += 1,
            TestResult::Fail { .. } => self.failed += 1,
            TestResult::Skip { .. } => self.skipped += 1,
            TestResult::Error { .. } => self.errors += 1,
        }
        self.details.push((id.to_string(), result));
    }

    /// Total number of vectors run.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errors
    }

    /// True when nothing failed or errored.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} skipped, {} errors (total: {})",
            self.passed,
            self.failed,
            self.skipped,
            self.errors,
            self.total()
        )
    }

    /// Failures only.
    pub fn failures(&self) -> Vec<&(String, TestResult)> {
        self.details.iter().filter(|(_, r)| r.is_fail()).collect()
    }

    /// Malformed vectors only.
    pub fn error_details(&self) -> Vec<&(String, TestResult)> {
        self.details
            .iter()
            .filter(|(_, r)| matches!(r, TestResult::Error { .. }))
            .collect()
    }
}

/// Executes the vectors of a corpus.
pub struct CorpusRunner {
    corpus: Corpus,
}

fn input_str<'a>(vector: &'a TestVector, name: &str) -> Result<&'a str, TestResult> {
    vector
        .input
        .get(name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| TestResult::Error {
            message: format!("missing '{name}' in input"),
        })
}

fn expected_str<'a>(ok: &'a serde_json::Value, name: &str) -> Result<&'a str, TestResult> {
    ok.get(name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| TestResult::Error {
            message: format!("missing '{name}' in expected"),
        })
}

/// Compare an operation's outcome with the vector's expectation. `field`
/// names the string inside `ok`; `None` means only success is checked.
fn compare(vector: &TestVector, field: Option<&str>, actual: JcsResult<String>) -> TestResult {
    if let Some(ok) = vector.expected.get("ok") {
        match (actual, field) {
            (Ok(_), None) => TestResult::Pass,
            (Ok(actual), Some(name)) => match expected_str(ok, name) {
                Ok(expected) if expected == actual => TestResult::Pass,
                Ok(expected) => TestResult::Fail {
                    expected: expected.to_string(),
                    actual,
                },
                Err(result) => result,
            },
            (Err(e), _) => TestResult::Fail {
                expected: format!("ok: {ok}"),
                actual: format!("E{}: {e}", e.code()),
            },
        }
    } else if let Some(err) = vector.expected.get("err") {
        let Some(expected_code) = err.get("code").and_then(serde_json::Value::as_u64) else {
            return TestResult::Error {
                message: "missing 'code' in expected error".to_string(),
            };
        };
        match actual {
            Ok(actual) => TestResult::Fail {
                expected: format!("E{expected_code}"),
                actual: format!("ok: {actual}"),
            },
            Err(e) if u64::from(e.code()) == expected_code => TestResult::Pass,
            Err(e) => TestResult::Fail {
                expected: format!("E{expected_code}"),
                actual: format!("E{}: {e}", e.code()),
            },
        }
    } else {
        TestResult::Error {
            message: "expected must hold 'ok' or 'err'".to_string(),
        }
    }
}

impl CorpusRunner {
    /// Load a corpus from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConformanceResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Load a corpus from its JSON text.
    pub fn from_json(content: &str) -> ConformanceResult<Self> {
        let corpus: Corpus = serde_json::from_str(content)?;
        Ok(Self { corpus })
    }

    /// Corpus manifest.
    pub fn manifest(&self) -> &CorpusManifest {
        &self.corpus.manifest
    }

    /// Number of vectors.
    pub fn vector_count(&self) -> usize {
        self.corpus.vectors.len()
    }

    /// Run every vector.
    pub fn run_all(&self) -> CorpusResults {
        let mut results = CorpusResults::new();
        for vector in &self.corpus.vectors {
            let result = self.run_vector(vector);
            results.record(&vector.id, result);
        }
        results
    }

    fn run_vector(&self, vector: &TestVector) -> TestResult {
        let outcome = match vector.op.as_str() {
            "canonicalize" => Self::run_canonicalize(vector),
            "serialize" => Self::run_serialize(vector),
            "number" => Self::run_number(vector),
            "parse" => Self::run_parse(vector),
            "verify_hmac" => Self::run_verify_hmac(vector),
            _ => {
                return TestResult::Skip {
                    reason: format!("unknown operation: {}", vector.op),
                }
            }
        };
        outcome.unwrap_or_else(|result| result)
    }

    fn run_canonicalize(vector: &TestVector) -> Result<TestResult, TestResult> {
        let raw = input_str(vector, "raw")?;
        let actual = parse(raw.as_bytes())
            .and_then(|value| normalize(&value))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        Ok(compare(vector, Some("normalized"), actual))
    }

    fn run_serialize(vector: &TestVector) -> Result<TestResult, TestResult> {
        let raw = input_str(vector, "raw")?;
        let name = input_str(vector, "format")?;
        let format = OutputFormat::from_name(name).ok_or_else(|| TestResult::Error {
            message: format!("unknown format '{name}'"),
        })?;
        let actual = parse(raw.as_bytes()).and_then(|value| serialize(&value, format));
        Ok(compare(vector, Some("output"), actual))
    }

    fn run_number(vector: &TestVector) -> Result<TestResult, TestResult> {
        let literal = input_str(vector, "literal")?;
        let actual = parse(format!("[{literal}]").as_bytes())
            .and_then(|value| normalize(&value))
            .map(|bytes| {
                let text = String::from_utf8_lossy(&bytes);
                text.trim_start_matches('[').trim_end_matches(']').to_string()
            });
        Ok(compare(vector, Some("text"), actual))
    }

    fn run_parse(vector: &TestVector) -> Result<TestResult, TestResult> {
        let raw = input_str(vector, "raw")?;
        let actual = parse(raw.as_bytes()).map(|_| String::new());
        Ok(compare(vector, None, actual))
    }

    fn run_verify_hmac(vector: &TestVector) -> Result<TestResult, TestResult> {
        let raw = input_str(vector, "raw")?;
        let key = hex::decode(input_str(vector, "key")?).map_err(|e| TestResult::Error {
            message: format!("invalid hex key: {e}"),
        })?;
        let secret = HmacKey(key);
        let actual = parse_object(raw.as_bytes()).and_then(|object| {
            verify(&object, &Verifier::Symmetric(&secret), &VerifierOptions::new())
                .map(|block| block.algorithm.to_string())
        });
        Ok(compare(vector, Some("algorithm"), actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"{
        "manifest": {"format_version": "1"},
        "vectors": [
            {"id": "c1", "op": "canonicalize", "input": {"raw": "{\"b\": 1.0, \"a\": [true]}"},
             "expected": {"ok": {"normalized": "{\"b\":1,\"a\":[true]}"}}},
            {"id": "p1", "op": "parse", "input": {"raw": "[01]"}, "expected": {"err": {"code": 104}}},
            {"id": "n1", "op": "number", "input": {"literal": "1e21"}, "expected": {"ok": {"text": "1e+21"}}},
            {"id": "x1", "op": "unknown", "input": {}, "expected": {"ok": {}}},
            {"id": "b1", "op": "canonicalize", "input": {}, "expected": {"ok": {}}},
            {"id": "f1", "op": "canonicalize", "input": {"raw": "[1]"}, "expected": {"ok": {"normalized": "[2]"}}}
        ]
    }"#;

    #[test]
    fn test_small_corpus() {
        let runner = CorpusRunner::from_json(SMALL).unwrap();
        assert_eq!(runner.vector_count(), 6);
        assert_eq!(runner.manifest().format_version, "1");
        let results = runner.run_all();
        assert_eq!(results.passed, 3);
        assert_eq!(results.skipped, 1);
        assert_eq!(results.errors, 1);
        assert_eq!(results.failed, 1);
        assert!(!results.all_passed());
        assert_eq!(results.failures()[0].0, "f1");
    }

    #[test]
    fn test_corpus_results() {
        let mut results = CorpusResults::new();
        results.record("test1", TestResult::Pass);
        results.record(
            "test2",
            TestResult::Fail {
                expected: "a".to_string(),
                actual: "b".to_string(),
            },
        );
        results.record(
            "test3",
            TestResult::Skip {
                reason: "not implemented".to_string(),
            },
        );
        assert_eq!(results.total(), 3);
        assert_eq!(
            results.summary(),
            "1 passed, 1 failed, 1 skipped, 0 errors (total: 3)"
        );
    }

    #[test]
    fn test_malformed_corpus() {
        assert!(matches!(
            CorpusRunner::from_json("{}"),
            Err(super::super::ConformanceError::Format(_))
        ));
    }
}
