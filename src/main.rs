//! JCS Keygen CLI.
//!
//! Canonicalizes JSON documents, verifies embedded signatures and runs
//! conformance vector corpora.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jcs_keygen::conformance::CorpusRunner;
use jcs_keygen::envelope::{
    verify, verify_multiple, Verifier, VerifierOptions, JWK_JSON, SIGNATURES_JSON, SIGNATURE_JSON,
};
use jcs_keygen::json::{parse, serialize, JsonObject, JsonValue, OutputFormat};
use jcs_keygen::JcsResult;

#[derive(Parser)]
#[command(name = "jcs-keygen")]
#[command(about = "Canonical JSON and JSON Clear Signature tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,

    /// Parse a JSON document and write it in the requested format
    Canonicalize {
        /// Input file
        file: PathBuf,
        /// normalized, pretty, js or html
        #[arg(long, default_value = "normalized")]
        format: String,
    },

    /// Verify every signature carrying an inline `jwk`
    Verify {
        /// Input file
        file: PathBuf,
    },

    /// Run a conformance vector corpus
    Corpus {
        /// Corpus file
        file: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("JCS_KEYGEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_document(path: &Path) -> Result<JsonValue, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    parse(&bytes).map_err(|e| format!("{}: {}", path.display(), e))
}

fn canonicalize(path: &Path, format: &str) -> ExitCode {
    let Some(format) = OutputFormat::from_name(format) else {
        eprintln!("error: unknown format '{}'", format);
        return ExitCode::from(2);
    };
    let value = match read_document(path) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match serialize(&value, format) {
        Ok(text) if text.ends_with('\n') => {
            print!("{}", text);
            ExitCode::SUCCESS
        }
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn has_inline_key(value: &JsonValue) -> bool {
    value
        .as_object()
        .map(|block| block.contains(JWK_JSON))
        .unwrap_or(false)
}

/// Verify the signatures held directly by `object`, then those of every
/// nested object. Returns the number of blocks verified.
fn verify_tree(object: &JsonObject, path: &str) -> JcsResult<usize> {
    let options = VerifierOptions::new();
    let mut count = 0;
    if object.get(SIGNATURE_JSON).map(has_inline_key).unwrap_or(false) {
        let block = verify(object, &Verifier::FromSignature, &options)?;
        println!("{}: {} signature verified", path, block.algorithm);
        count += 1;
    }
    let multiple = object
        .get(SIGNATURES_JSON)
        .and_then(JsonValue::as_array)
        .map(|blocks| !blocks.is_empty() && blocks.iter().all(has_inline_key))
        .unwrap_or(false);
    if multiple {
        let blocks = verify_multiple(object, &[Verifier::FromSignature], &options)?;
        for block in &blocks {
            println!("{}: {} signature verified", path, block.algorithm);
        }
        count += blocks.len();
    }
    for (name, value) in object.iter() {
        if name == SIGNATURE_JSON || name == SIGNATURES_JSON {
            continue;
        }
        count += verify_value(value, &format!("{}.{}", path, name))?;
    }
    Ok(count)
}

fn verify_value(value: &JsonValue, path: &str) -> JcsResult<usize> {
    match value {
        JsonValue::Object(object) => verify_tree(object, path),
        JsonValue::Array(values) => {
            let mut count = 0;
            for (i, element) in values.iter().enumerate() {
                count += verify_value(element, &format!("{}[{}]", path, i))?;
            }
            Ok(count)
        }
        _ => Ok(0),
    }
}

fn verify_file(path: &Path) -> ExitCode {
    let value = match read_document(path) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match verify_value(&value, "$") {
        Ok(0) => {
            eprintln!("error: no signatures with an inline public key found");
            ExitCode::FAILURE
        }
        Ok(count) => {
            println!("{} signature(s) verified", count);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {} ({})", e, e.name());
            ExitCode::FAILURE
        }
    }
}

fn run_corpus(path: &Path) -> ExitCode {
    let runner = match CorpusRunner::load(path) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let results = runner.run_all();
    for (id, result) in results.failures() {
        println!("FAIL {}: {:?}", id, result);
    }
    for (id, result) in results.error_details() {
        println!("ERROR {}: {:?}", id, result);
    }
    println!("{}", results.summary());
    if results.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Some(Commands::Version) => {
            println!("JCS Keygen v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Some(Commands::Canonicalize { file, format }) => canonicalize(&file, &format),
        Some(Commands::Verify { file }) => verify_file(&file),
        Some(Commands::Corpus { file }) => run_corpus(&file),
        None => {
            println!("JCS Keygen v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            ExitCode::SUCCESS
        }
    }
}
