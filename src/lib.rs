//! JCS Keygen - canonical JSON, cryptographic envelopes and KeyGen2 provisioning.
//!
//! Every signature, MAC and authenticated-data computation in this crate runs
//! over the same deterministic byte form of a JSON tree, so two parties that
//! agree on the tree agree on the bytes.
//!
//! # Architecture
//!
//! The implementation is layered bottom-up:
//!
//! - [`json`] - Strict I-JSON parsing, ES6 number formatting and canonical serialization
//! - [`crypto`] - Signature, key-encryption and content-encryption primitives
//! - [`envelope`] - JSON Clear Signatures (JCS) and JSON Encryption Format (JEF)
//! - [`provisioning`] - The KeyGen2 issuer state machine built on the layers above
//! - [`conformance`] - Vector corpus runner for the serialization and signature layers
//! - [`error`] - Error codes shared by all layers
//!
//! # Determinism
//!
//! Properties keep their insertion order; nothing is sorted. Numbers are
//! written exactly as ECMAScript's `Number.prototype.toString()` writes them.
//! The NORMALIZED output is the only input to cryptographic operations.

// Key handling and protocol code must propagate errors, never abort.
// Tests are checked separately with `cargo test`.
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod conformance;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod json;
pub mod provisioning;

// Re-export commonly used types
pub use error::{ErrorCode, JcsResult};
pub use json::{parse, parse_object, JsonObject, JsonValue, ObjectWriter, OutputFormat};
pub use provisioning::{ServerState, SessionConfig};
