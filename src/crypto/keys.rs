//! Public and private key types with JWK and SPKI codecs.
//!
//! Two key families are supported: EC P-256 and RSA. JWK decoding is strict:
//! only `kty`, `crv`, `x`, `y` (EC) or `kty`, `n`, `e` (RSA) are accepted,
//! and EC coordinates must be exactly 32 bytes.

use std::fmt;

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rand_core::CryptoRngCore;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::error::{ErrorCode, JcsResult};
use crate::json::{base64url_encode, JsonObject, ObjectWriter};

const EC_COORDINATE_LENGTH: usize = 32;

/// A public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// EC P-256
    Ec(p256::PublicKey),
    /// RSA
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Key family name as used in JWK `kty`.
    pub fn key_type(&self) -> &'static str {
        match self {
            PublicKey::Ec(_) => "EC",
            PublicKey::Rsa(_) => "RSA",
        }
    }

    /// Decode a JWK object.
    pub fn from_jwk(jwk: &JsonObject) -> JcsResult<Self> {
        match jwk.get_string("kty")? {
            "EC" => {
                jwk.expect_only(&["kty", "crv", "x", "y"])?;
                let crv = jwk.get_string("crv")?;
                if crv != "P-256" {
                    return Err(ErrorCode::E308_InvalidKey(format!("unsupported curve {crv}")));
                }
                let x = jwk.get_binary("x")?;
                let y = jwk.get_binary("y")?;
                if x.len() != EC_COORDINATE_LENGTH || y.len() != EC_COORDINATE_LENGTH {
                    return Err(ErrorCode::E308_InvalidKey("bad EC coordinate length".into()));
                }
                let point = p256::EncodedPoint::from_affine_coordinates(
                    p256::FieldBytes::from_slice(&x),
                    p256::FieldBytes::from_slice(&y),
                    false,
                );
                Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(&point))
                    .map(PublicKey::Ec)
                    .ok_or_else(|| ErrorCode::E308_InvalidKey("EC point not on curve".into()))
            }
            "RSA" => {
                jwk.expect_only(&["kty", "n", "e"])?;
                let n = jwk.get_binary("n")?;
                let e = jwk.get_binary("e")?;
                RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
                    .map(PublicKey::Rsa)
                    .map_err(|e| ErrorCode::E308_InvalidKey(e.to_string()))
            }
            other => Err(ErrorCode::E308_InvalidKey(format!("unsupported kty {other}"))),
        }
    }

    /// Encode as a JWK object.
    pub fn to_jwk(&self) -> JcsResult<JsonObject> {
        match self {
            PublicKey::Ec(key) => {
                let point = key.to_encoded_point(false);
                let (x, y) = match (point.x(), point.y()) {
                    (Some(x), Some(y)) => (x, y),
                    _ => return Err(ErrorCode::E308_InvalidKey("EC point at infinity".into())),
                };
                Ok(ObjectWriter::new()
                    .set_string("kty", "EC")?
                    .set_string("crv", "P-256")?
                    .set_binary("x", x)?
                    .set_binary("y", y)?
                    .build())
            }
            PublicKey::Rsa(key) => Ok(ObjectWriter::new()
                .set_string("kty", "RSA")?
                .set_string("n", base64url_encode(&key.n().to_bytes_be()))?
                .set_string("e", base64url_encode(&key.e().to_bytes_be()))?
                .build()),
        }
    }

    /// DER-encoded SubjectPublicKeyInfo.
    pub fn to_spki_der(&self) -> JcsResult<Vec<u8>> {
        let document = match self {
            PublicKey::Ec(key) => key.to_public_key_der(),
            PublicKey::Rsa(key) => key.to_public_key_der(),
        };
        document
            .map(|d| d.as_bytes().to_vec())
            .map_err(|e| ErrorCode::E308_InvalidKey(e.to_string()))
    }

    /// Decode a DER-encoded SubjectPublicKeyInfo.
    pub fn from_spki_der(der: &[u8]) -> JcsResult<Self> {
        if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
            return Ok(PublicKey::Ec(key));
        }
        RsaPublicKey::from_public_key_der(der)
            .map(PublicKey::Rsa)
            .map_err(|_| ErrorCode::E308_InvalidKey("unrecognized SubjectPublicKeyInfo".into()))
    }

    /// The EC key, or `E308_InvalidKey`.
    pub fn as_ec(&self) -> JcsResult<&p256::PublicKey> {
        match self {
            PublicKey::Ec(key) => Ok(key),
            PublicKey::Rsa(_) => Err(ErrorCode::E308_InvalidKey("EC key required".into())),
        }
    }

    /// The RSA key, or `E308_InvalidKey`.
    pub fn as_rsa(&self) -> JcsResult<&RsaPublicKey> {
        match self {
            PublicKey::Rsa(key) => Ok(key),
            PublicKey::Ec(_) => Err(ErrorCode::E308_InvalidKey("RSA key required".into())),
        }
    }
}

impl From<p256::PublicKey> for PublicKey {
    fn from(key: p256::PublicKey) -> Self {
        PublicKey::Ec(key)
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        PublicKey::Rsa(key)
    }
}

/// A private key.
#[derive(Clone)]
pub enum PrivateKey {
    /// EC P-256
    Ec(p256::SecretKey),
    /// RSA
    Rsa(RsaPrivateKey),
}

impl PrivateKey {
    /// Generate a fresh P-256 key.
    pub fn generate_ec(rng: &mut impl CryptoRngCore) -> Self {
        PrivateKey::Ec(p256::SecretKey::random(rng))
    }

    /// Load a PKCS#8 PEM private key (EC P-256 or RSA).
    pub fn from_pkcs8_pem(pem: &str) -> JcsResult<Self> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_pem(pem) {
            return Ok(PrivateKey::Ec(key));
        }
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(PrivateKey::Rsa)
            .map_err(|e| ErrorCode::E308_InvalidKey(e.to_string()))
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Ec(key) => PublicKey::Ec(key.public_key()),
            PrivateKey::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKey::Ec(_) => f.write_str("PrivateKey::Ec(..)"),
            PrivateKey::Rsa(_) => f.write_str("PrivateKey::Rsa(..)"),
        }
    }
}

/// A DER-encoded X.509 certificate. Contents are not interpreted here;
/// path validation belongs to a [`TrustVerifier`](crate::envelope::TrustVerifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Certificate(pub Vec<u8>);

impl Certificate {
    /// DER bytes.
    pub fn as_der(&self) -> &[u8] {
        &self.0
    }
}
