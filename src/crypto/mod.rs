//! Cryptographic primitives behind the envelope layer.
//!
//! # Architecture
//!
//! - [`algorithms`] - Wire names for signature, key and content algorithms
//! - [`keys`] - EC P-256 and RSA keys, JWK and SPKI codecs
//! - [`signing`] - ES256, RS256/384/512 and HS256/384/512
//! - [`content`] - AES-CBC-HMAC and AES-GCM content encryption
//! - [`key_encryption`] - RSA-OAEP, ECDH-ES with Concat KDF, AES key wrap
//!
//! Everything here operates on byte slices. Canonicalization happens one
//! layer up in [`crate::envelope`].

pub mod algorithms;
pub mod content;
pub mod key_encryption;
pub mod keys;
pub mod signing;

pub use algorithms::{ContentEncryptionAlgorithm, KeyEncryptionAlgorithm, SignatureAlgorithm};
pub use keys::{Certificate, PrivateKey, PublicKey};
