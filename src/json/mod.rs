//! JSON parsing, value model and deterministic serialization.
//!
//! # Architecture
//!
//! - [`types`] - Order-preserving value model
//! - [`limits`] - Resource limits applied while parsing
//! - [`lexer`] - Tokenizer with UTF-8 and escape handling
//! - [`parser`] - Recursive descent parser, rejects duplicate names
//! - [`number`] - ECMAScript number formatting
//! - [`writer`] - Serializer in four output formats, fluent object builder
//! - [`reader`] - Typed property getters for protocol decoding
//!
//! Parsing never reorders properties. The NORMALIZED output of a parsed
//! document is what signatures and MACs are computed over, so it must be
//! reproducible by any independent implementation.
//!
//! # Example
//!
//! ```
//! use jcs_keygen::json::{parse, serialize, OutputFormat};
//!
//! let value = parse(b"{ \"b\": 1.50, \"a\": [1E2] }").unwrap();
//! let normalized = serialize(&value, OutputFormat::Normalized).unwrap();
//! assert_eq!(normalized, "{\"b\":1.5,\"a\":[100]}");
//! ```

pub mod lexer;
pub mod limits;
pub mod number;
pub mod parser;
pub mod reader;
pub mod types;
pub mod writer;

pub use limits::Limits;
pub use parser::{parse, parse_object, parse_with_limits};
pub use reader::base64url_decode;
pub use types::{JsonNumber, JsonObject, JsonValue};
pub use writer::{
    base64url_encode, normalize, normalize_object, serialize, serialize_object, ObjectWriter,
    OutputFormat,
};
