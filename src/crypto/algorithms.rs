//! Algorithm identifiers used on the wire.
//!
//! Each enum maps one-to-one onto the JOSE algorithm names. Unknown names
//! fail with `E303_UnsupportedAlgorithm`.

use std::fmt;

use crate::error::{ErrorCode, JcsResult};

/// Signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// ECDSA P-256 with SHA-256
    Es256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    Rs384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    Rs512,
    /// HMAC with SHA-256
    Hs256,
    /// HMAC with SHA-384
    Hs384,
    /// HMAC with SHA-512
    Hs512,
}

impl SignatureAlgorithm {
    /// All supported signature algorithms.
    pub const ALL: [SignatureAlgorithm; 7] = [
        Self::Es256,
        Self::Rs256,
        Self::Rs384,
        Self::Rs512,
        Self::Hs256,
        Self::Hs384,
        Self::Hs512,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }

    /// Look up an algorithm by wire name.
    pub fn from_name(name: &str) -> JcsResult<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ErrorCode::E303_UnsupportedAlgorithm(name.to_string()))
    }

    /// Output size of the underlying digest in bits.
    pub fn digest_bits(self) -> u16 {
        match self {
            Self::Es256 | Self::Rs256 | Self::Hs256 => 256,
            Self::Rs384 | Self::Hs384 => 384,
            Self::Rs512 | Self::Hs512 => 512,
        }
    }

    /// True for the HMAC algorithms.
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::Hs256 | Self::Hs384 | Self::Hs512)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEncryptionAlgorithm {
    /// RSA-OAEP with SHA-256 and MGF1-SHA-256
    RsaOaep256,
    /// RSA-OAEP with SHA-1
    RsaOaep,
    /// Direct ECDH-ES key agreement
    EcdhEs,
    /// ECDH-ES followed by AES-128 key wrap
    EcdhEsA128Kw,
    /// ECDH-ES followed by AES-256 key wrap
    EcdhEsA256Kw,
}

impl KeyEncryptionAlgorithm {
    /// All supported key encryption algorithms.
    pub const ALL: [KeyEncryptionAlgorithm; 5] = [
        Self::RsaOaep256,
        Self::RsaOaep,
        Self::EcdhEs,
        Self::EcdhEsA128Kw,
        Self::EcdhEsA256Kw,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep => "RSA-OAEP",
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
        }
    }

    /// Look up an algorithm by wire name.
    pub fn from_name(name: &str) -> JcsResult<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ErrorCode::E303_UnsupportedAlgorithm(name.to_string()))
    }

    /// True for the RSA-OAEP family.
    pub fn is_rsa(self) -> bool {
        matches!(self, Self::RsaOaep256 | Self::RsaOaep)
    }

    /// True when the content key travels wrapped (RSA or AES-KW).
    pub fn is_key_wrap(self) -> bool {
        self != Self::EcdhEs
    }

    /// Key-wrapping key length in bytes for the AES-KW variants.
    pub fn key_wrap_length(self) -> Option<usize> {
        match self {
            Self::EcdhEsA128Kw => Some(16),
            Self::EcdhEsA256Kw => Some(32),
            _ => None,
        }
    }
}

impl fmt::Display for KeyEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Content encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryptionAlgorithm {
    /// AES-128-CBC with HMAC-SHA-256 authentication
    A128CbcHs256,
    /// AES-256-CBC with HMAC-SHA-512 authentication
    A256CbcHs512,
    /// AES-128-GCM
    A128Gcm,
    /// AES-256-GCM
    A256Gcm,
}

impl ContentEncryptionAlgorithm {
    /// All supported content encryption algorithms.
    pub const ALL: [ContentEncryptionAlgorithm; 4] = [
        Self::A128CbcHs256,
        Self::A256CbcHs512,
        Self::A128Gcm,
        Self::A256Gcm,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Look up an algorithm by wire name.
    pub fn from_name(name: &str) -> JcsResult<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ErrorCode::E303_UnsupportedAlgorithm(name.to_string()))
    }

    /// Content encryption key length in bytes.
    pub fn key_length(self) -> usize {
        match self {
            Self::A128CbcHs256 => 32,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }

    /// Initialization vector length in bytes.
    pub fn iv_length(self) -> usize {
        if self.is_gcm() {
            12
        } else {
            16
        }
    }

    /// Authentication tag length in bytes.
    pub fn tag_length(self) -> usize {
        match self {
            Self::A256CbcHs512 => 32,
            _ => 16,
        }
    }

    /// True for the GCM variants.
    pub fn is_gcm(self) -> bool {
        matches!(self, Self::A128Gcm | Self::A256Gcm)
    }
}

impl fmt::Display for ContentEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for alg in SignatureAlgorithm::ALL {
            assert_eq!(SignatureAlgorithm::from_name(alg.name()).unwrap(), alg);
        }
        for alg in KeyEncryptionAlgorithm::ALL {
            assert_eq!(KeyEncryptionAlgorithm::from_name(alg.name()).unwrap(), alg);
        }
        for alg in ContentEncryptionAlgorithm::ALL {
            assert_eq!(ContentEncryptionAlgorithm::from_name(alg.name()).unwrap(), alg);
        }
    }

    #[test]
    fn test_unknown_names() {
        assert!(matches!(
            SignatureAlgorithm::from_name("ES512"),
            Err(ErrorCode::E303_UnsupportedAlgorithm(n)) if n == "ES512"
        ));
        assert!(KeyEncryptionAlgorithm::from_name("rsa-oaep").is_err());
        assert!(ContentEncryptionAlgorithm::from_name("A192GCM").is_err());
    }

    #[test]
    fn test_content_parameters() {
        assert_eq!(ContentEncryptionAlgorithm::A256CbcHs512.key_length(), 64);
        assert_eq!(ContentEncryptionAlgorithm::A128Gcm.iv_length(), 12);
        assert_eq!(ContentEncryptionAlgorithm::A128CbcHs256.iv_length(), 16);
        assert_eq!(ContentEncryptionAlgorithm::A256CbcHs512.tag_length(), 32);
    }

    #[test]
    fn test_key_encryption_classes() {
        assert!(KeyEncryptionAlgorithm::RsaOaep.is_rsa());
        assert!(!KeyEncryptionAlgorithm::EcdhEs.is_key_wrap());
        assert_eq!(KeyEncryptionAlgorithm::EcdhEsA256Kw.key_wrap_length(), Some(32));
        assert!(SignatureAlgorithm::Hs384.is_symmetric());
        assert_eq!(SignatureAlgorithm::Rs512.digest_bits(), 512);
    }
}
