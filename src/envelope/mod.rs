//! Cryptographic envelopes over canonical JSON.
//!
//! # Architecture
//!
//! - [`signature`] - Embedding signature blocks (`signature` / `signatures`)
//! - [`verifier`] - Decoding and verifying them under a [`VerifierOptions`] policy
//! - [`encryption`] - Single and multi-recipient `encryptedData` envelopes
//! - [`remote`] - Seams for fetching remote keys and validating certificate paths
//!
//! Signed bytes are always the NORMALIZED form of the containing object with
//! the signature block in place and its `val` removed, so a document survives
//! any whitespace or formatting change between signer and verifier.

pub mod encryption;
pub mod remote;
pub mod signature;
pub mod verifier;

pub use encryption::{
    encrypt, encrypt_symmetric, DecryptionKey, EncryptedData, Recipient, RecipientInfo,
};
pub use remote::{RemoteKeyReader, TrustVerifier};
pub use signature::{sign, sign_multiple, KeyReference, Signer, SigningKey};
pub use verifier::{
    is_signed, verify, verify_multiple, HmacKey, KeyIdPolicy, SignatureBlock,
    SymmetricKeyVerifier, Verifier, VerifierOptions,
};

/// Single signature container
pub const SIGNATURE_JSON: &str = "signature";
/// Multi-signature container
pub const SIGNATURES_JSON: &str = "signatures";
/// Algorithm name
pub const ALGORITHM_JSON: &str = "alg";
/// Key identifier
pub const KEY_ID_JSON: &str = "kid";
/// Embedded public key
pub const JWK_JSON: &str = "jwk";
/// Embedded certificate path
pub const CERTIFICATE_PATH_JSON: &str = "x5c";
/// Remote public key URI
pub const REMOTE_KEY_JSON: &str = "jku";
/// Remote certificate path URI
pub const REMOTE_CERTIFICATE_PATH_JSON: &str = "x5u";
/// Critical extension names
pub const CRITICAL_JSON: &str = "crit";
/// Properties excluded from signing
pub const EXCLUDED_JSON: &str = "excl";
/// Signature value
pub const VALUE_JSON: &str = "val";

/// Encryption container
pub const ENCRYPTED_DATA_JSON: &str = "encryptedData";
/// Single recipient
pub const ENCRYPTED_KEY_JSON: &str = "encryptedKey";
/// Multiple recipients
pub const RECIPIENTS_JSON: &str = "recipients";
/// Recipient static EC key
pub const STATIC_KEY_JSON: &str = "staticKey";
/// Sender ephemeral EC key
pub const EPHEMERAL_KEY_JSON: &str = "ephemeralKey";
/// Initialization vector
pub const IV_JSON: &str = "iv";
/// Authentication tag
pub const TAG_JSON: &str = "tag";
/// Encrypted content or encrypted key
pub const CIPHER_TEXT_JSON: &str = "cipherText";
