//! Error codes for canonical JSON, cryptographic envelopes and provisioning.
//!
//! Every fallible operation in the crate returns [`JcsResult`]. Codes are
//! grouped by the layer that raises them:
//!
//! - E1xx: parsing (malformed input, limits)
//! - E2xx: serialization and typed property access
//! - E3xx: signatures and key material
//! - E4xx: encryption
//! - E5xx: provisioning protocol
//! - E6xx: identifiers
//!
//! All errors are terminal for the operation that raised them. Nothing is
//! retried internally.

use thiserror::Error;

/// Error codes raised by the library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    // ------------------------------------------------------------------
    // Parse errors
    // ------------------------------------------------------------------
    /// Syntactically invalid JSON.
    #[error("invalid JSON at byte {0}")]
    E100_InvalidJSON(usize),

    /// The same property name occurs twice in one object.
    #[error("duplicate property \"{0}\"")]
    E101_DuplicateKey(String),

    /// The top-level value is neither an object nor an array.
    #[error("document root must be an object or an array")]
    E102_InvalidRoot,

    /// Unknown or truncated escape sequence.
    #[error("malformed escape sequence at byte {0}")]
    E103_MalformedEscape(usize),

    /// Number literal that is not a finite IEEE-754 double.
    #[error("invalid number \"{0}\"")]
    E104_InvalidNumber(String),

    /// Input is not valid UTF-8 or contains an unpaired surrogate.
    #[error("invalid UTF-8 or unpaired surrogate")]
    E105_InvalidUTF8,

    /// Integer outside the 53-bit safe range or with a fractional part.
    #[error("integer out of range: {0}")]
    E109_IntegerOutOfRange(String),

    /// Input exceeds the configured size limit.
    #[error("input too large ({0} > {1} bytes)")]
    E110_InputTooLarge(u64, u64),

    /// Nesting exceeds the configured depth.
    #[error("nesting too deep ({0} > {1})")]
    E111_NestingTooDeep(u64, u64),

    /// String exceeds the configured length.
    #[error("string too long ({0} > {1} bytes)")]
    E112_StringTooLong(u64, u64),

    /// Object has more properties than allowed.
    #[error("too many object fields ({0} > {1})")]
    E113_TooManyFields(u64, u64),

    /// Array has more elements than allowed.
    #[error("array too long ({0} > {1})")]
    E114_ArrayTooLong(u64, u64),

    // ------------------------------------------------------------------
    // Serialization and typed access
    // ------------------------------------------------------------------
    /// NaN or Infinity cannot be serialized.
    #[error("NaN and Infinity cannot be serialized")]
    E200_NonFiniteNumber,

    /// Numeric property names out of ascending order.
    #[error("numeric property \"{0}\" must precede other properties in ascending order")]
    E201_NumericPropertyOrder(String),

    /// Integer too large for a bare JSON number.
    #[error("integer {0} exceeds the safe range; use a string-mapped value")]
    E202_UnsafeInteger(String),

    /// A required property is absent.
    #[error("missing property \"{0}\"")]
    E203_MissingProperty(String),

    /// A property has an unexpected type.
    #[error("property \"{0}\" has type {2}, expected {1}")]
    E204_TypeMismatch(String, &'static str, &'static str),

    /// Base64url decoding failed.
    #[error("invalid base64url data in \"{0}\"")]
    E205_InvalidBase64(String),

    /// Date/time did not parse as RFC 3339.
    #[error("invalid date-time \"{0}\"")]
    E206_InvalidDateTime(String),

    /// A property was present that the reader did not expect.
    #[error("unexpected property \"{0}\"")]
    E207_UnexpectedProperty(String),

    /// Value outside its permitted range or format.
    #[error("invalid value for \"{0}\": {1}")]
    E208_InvalidValue(String, String),

    // ------------------------------------------------------------------
    // Signatures and key material
    // ------------------------------------------------------------------
    /// Cryptographic signature check failed.
    #[error("signature verification failed")]
    E300_SignatureInvalid,

    /// Algorithm inconsistent with the key or below the required strength.
    #[error("signature algorithm mismatch: {0}")]
    E301_SignatureAlgorithmMismatch(String),

    /// Key material or key-id does not match what the caller expects.
    #[error("key mismatch: {0}")]
    E302_KeyMismatch(String),

    /// Algorithm identifier not recognized.
    #[error("unsupported algorithm \"{0}\"")]
    E303_UnsupportedAlgorithm(String),

    /// An `excl` entry names a property that does not exist.
    #[error("excluded property \"{0}\" not present")]
    E304_MissingExcludedProperty(String),

    /// A critical extension is reserved, missing or not permitted.
    #[error("critical extension error: {0}")]
    E305_CriticalExtension(String),

    /// Certificate path rejected by the trust verifier.
    #[error("untrusted certificate path: {0}")]
    E306_UntrustedCertificate(String),

    /// Remote key material could not be resolved.
    #[error("remote key error: {0}")]
    E307_RemoteKey(String),

    /// Malformed key (JWK, SPKI, PKCS#8).
    #[error("invalid key: {0}")]
    E308_InvalidKey(String),

    /// Low-level cryptographic primitive failure.
    #[error("cryptographic failure: {0}")]
    E309_CryptoFailure(String),

    // ------------------------------------------------------------------
    // Encryption
    // ------------------------------------------------------------------
    /// Authentication tag or key unwrap check failed.
    #[error("decryption failed")]
    E400_DecryptionFailed,

    /// None of the candidate keys fits any recipient.
    #[error("no matching key: {0}")]
    E401_NoMatchingKey(String),

    /// Key agreement without key wrapping used with several recipients.
    #[error("{0} cannot be used with multiple recipients")]
    E402_UnsupportedForMultipleRecipients(String),

    /// Content-encryption key has the wrong length.
    #[error("wrong key length ({0}, expected {1})")]
    E403_InvalidKeyLength(usize, usize),

    // ------------------------------------------------------------------
    // Provisioning protocol
    // ------------------------------------------------------------------
    /// Request/response out of order or phase mismatch.
    #[error("protocol state error: {0}")]
    E500_ProtocolState(String),

    /// Client or server session id differs from the session.
    #[error("session id mismatch")]
    E501_SessionMismatch,

    /// Device attestation did not verify.
    #[error("attestation failure: {0}")]
    E502_AttestationFailure(String),

    /// Close-session attestation did not verify.
    #[error("final attestation failed")]
    E503_FinalAttestation,

    /// Post-provisioning operations conflict.
    #[error("post operation conflict: {0}")]
    E504_PostOperationConflict(String),

    /// Server certificate fingerprint missing or wrong.
    #[error("server certificate fingerprint is missing or invalid")]
    E505_ServerCertificateMismatch,

    /// PIN/PUK policy or key option violates a protocol rule.
    #[error("policy violation: {0}")]
    E506_PolicyViolation(String),

    /// Response references a key that was never requested.
    #[error("unknown key id \"{0}\"")]
    E507_UnknownKeyId(String),

    // ------------------------------------------------------------------
    // Identifiers
    // ------------------------------------------------------------------
    /// Duplicate property name, key id or extension type.
    #[error("duplicate identifier \"{0}\"")]
    E600_DuplicateIdentifier(String),
}

impl ErrorCode {
    /// Numeric code (the digits of the variant name).
    pub fn code(&self) -> u32 {
        match self {
            Self::E100_InvalidJSON(_) => 100,
            Self::E101_DuplicateKey(_) => 101,
            Self::E102_InvalidRoot => 102,
            Self::E103_MalformedEscape(_) => 103,
            Self::E104_InvalidNumber(_) => 104,
            Self::E105_InvalidUTF8 => 105,
            Self::E109_IntegerOutOfRange(_) => 109,
            Self::E110_InputTooLarge(..) => 110,
            Self::E111_NestingTooDeep(..) => 111,
            Self::E112_StringTooLong(..) => 112,
            Self::E113_TooManyFields(..) => 113,
            Self::E114_ArrayTooLong(..) => 114,
            Self::E200_NonFiniteNumber => 200,
            Self::E201_NumericPropertyOrder(_) => 201,
            Self::E202_UnsafeInteger(_) => 202,
            Self::E203_MissingProperty(_) => 203,
            Self::E204_TypeMismatch(..) => 204,
            Self::E205_InvalidBase64(_) => 205,
            Self::E206_InvalidDateTime(_) => 206,
            Self::E207_UnexpectedProperty(_) => 207,
            Self::E208_InvalidValue(..) => 208,
            Self::E300_SignatureInvalid => 300,
            Self::E301_SignatureAlgorithmMismatch(_) => 301,
            Self::E302_KeyMismatch(_) => 302,
            Self::E303_UnsupportedAlgorithm(_) => 303,
            Self::E304_MissingExcludedProperty(_) => 304,
            Self::E305_CriticalExtension(_) => 305,
            Self::E306_UntrustedCertificate(_) => 306,
            Self::E307_RemoteKey(_) => 307,
            Self::E308_InvalidKey(_) => 308,
            Self::E309_CryptoFailure(_) => 309,
            Self::E400_DecryptionFailed => 400,
            Self::E401_NoMatchingKey(_) => 401,
            Self::E402_UnsupportedForMultipleRecipients(_) => 402,
            Self::E403_InvalidKeyLength(..) => 403,
            Self::E500_ProtocolState(_) => 500,
            Self::E501_SessionMismatch => 501,
            Self::E502_AttestationFailure(_) => 502,
            Self::E503_FinalAttestation => 503,
            Self::E504_PostOperationConflict(_) => 504,
            Self::E505_ServerCertificateMismatch => 505,
            Self::E506_PolicyViolation(_) => 506,
            Self::E507_UnknownKeyId(_) => 507,
            Self::E600_DuplicateIdentifier(_) => 600,
        }
    }

    /// Variant name without payload, e.g. `"E300_SignatureInvalid"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::E100_InvalidJSON(_) => "E100_InvalidJSON",
            Self::E101_DuplicateKey(_) => "E101_DuplicateKey",
            Self::E102_InvalidRoot => "E102_InvalidRoot",
            Self::E103_MalformedEscape(_) => "E103_MalformedEscape",
            Self::E104_InvalidNumber(_) => "E104_InvalidNumber",
            Self::E105_InvalidUTF8 => "E105_InvalidUTF8",
            Self::E109_IntegerOutOfRange(_) => "E109_IntegerOutOfRange",
            Self::E110_InputTooLarge(..) => "E110_InputTooLarge",
            Self::E111_NestingTooDeep(..) => "E111_NestingTooDeep",
            Self::E112_StringTooLong(..) => "E112_StringTooLong",
            Self::E113_TooManyFields(..) => "E113_TooManyFields",
            Self::E114_ArrayTooLong(..) => "E114_ArrayTooLong",
            Self::E200_NonFiniteNumber => "E200_NonFiniteNumber",
            Self::E201_NumericPropertyOrder(_) => "E201_NumericPropertyOrder",
            Self::E202_UnsafeInteger(_) => "E202_UnsafeInteger",
            Self::E203_MissingProperty(_) => "E203_MissingProperty",
            Self::E204_TypeMismatch(..) => "E204_TypeMismatch",
            Self::E205_InvalidBase64(_) => "E205_InvalidBase64",
            Self::E206_InvalidDateTime(_) => "E206_InvalidDateTime",
            Self::E207_UnexpectedProperty(_) => "E207_UnexpectedProperty",
            Self::E208_InvalidValue(..) => "E208_InvalidValue",
            Self::E300_SignatureInvalid => "E300_SignatureInvalid",
            Self::E301_SignatureAlgorithmMismatch(_) => "E301_SignatureAlgorithmMismatch",
            Self::E302_KeyMismatch(_) => "E302_KeyMismatch",
            Self::E303_UnsupportedAlgorithm(_) => "E303_UnsupportedAlgorithm",
            Self::E304_MissingExcludedProperty(_) => "E304_MissingExcludedProperty",
            Self::E305_CriticalExtension(_) => "E305_CriticalExtension",
            Self::E306_UntrustedCertificate(_) => "E306_UntrustedCertificate",
            Self::E307_RemoteKey(_) => "E307_RemoteKey",
            Self::E308_InvalidKey(_) => "E308_InvalidKey",
            Self::E309_CryptoFailure(_) => "E309_CryptoFailure",
            Self::E400_DecryptionFailed => "E400_DecryptionFailed",
            Self::E401_NoMatchingKey(_) => "E401_NoMatchingKey",
            Self::E402_UnsupportedForMultipleRecipients(_) => {
                "E402_UnsupportedForMultipleRecipients"
            }
            Self::E403_InvalidKeyLength(..) => "E403_InvalidKeyLength",
            Self::E500_ProtocolState(_) => "E500_ProtocolState",
            Self::E501_SessionMismatch => "E501_SessionMismatch",
            Self::E502_AttestationFailure(_) => "E502_AttestationFailure",
            Self::E503_FinalAttestation => "E503_FinalAttestation",
            Self::E504_PostOperationConflict(_) => "E504_PostOperationConflict",
            Self::E505_ServerCertificateMismatch => "E505_ServerCertificateMismatch",
            Self::E506_PolicyViolation(_) => "E506_PolicyViolation",
            Self::E507_UnknownKeyId(_) => "E507_UnknownKeyId",
            Self::E600_DuplicateIdentifier(_) => "E600_DuplicateIdentifier",
        }
    }

    /// True for errors raised while reading untrusted input (E1xx).
    pub fn is_parse_error(&self) -> bool {
        (100..200).contains(&self.code())
    }

    /// True for errors raised while producing output (E2xx).
    pub fn is_serialization_error(&self) -> bool {
        (200..300).contains(&self.code())
    }
}

/// Result alias used throughout the crate.
pub type JcsResult<T> = Result<T, ErrorCode>;
