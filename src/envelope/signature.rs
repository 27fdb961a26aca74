//! Enveloped signatures.
//!
//! A signature is a `signature` property appended to the signed object:
//!
//! ```text
//! {
//!   ...application properties...,
//!   "signature": {
//!     "alg": "ES256",
//!     "kid": "...",             optional
//!     "jwk": {...},             or x5c / jku / x5u / nothing
//!     "crit": ["ext"], "ext": ...,   optional
//!     "excl": ["name"],         optional
//!     "val": "base64url"
//!   }
//! }
//! ```
//!
//! The signed bytes are the NORMALIZED serialization of the whole object
//! with the `excl` properties removed and `val` left out of the signature
//! object. Several independent signatures live in a `signatures` array; each
//! is computed as if the array held that one block only.

use tracing::debug;

use super::{
    ALGORITHM_JSON, CERTIFICATE_PATH_JSON, CRITICAL_JSON, EXCLUDED_JSON, JWK_JSON, KEY_ID_JSON,
    REMOTE_CERTIFICATE_PATH_JSON, REMOTE_KEY_JSON, SIGNATURES_JSON, SIGNATURE_JSON, VALUE_JSON,
};
use crate::crypto::signing::{hmac_sign, sign_asymmetric};
use crate::crypto::{Certificate, PrivateKey, PublicKey, SignatureAlgorithm};
use crate::error::{ErrorCode, JcsResult};
use crate::json::{base64url_encode, normalize_object, JsonObject, JsonValue, ObjectWriter};

/// Names that cannot be used for extensions.
pub(crate) const RESERVED_NAMES: [&str; 9] = [
    ALGORITHM_JSON,
    KEY_ID_JSON,
    JWK_JSON,
    CERTIFICATE_PATH_JSON,
    REMOTE_KEY_JSON,
    REMOTE_CERTIFICATE_PATH_JSON,
    CRITICAL_JSON,
    EXCLUDED_JSON,
    VALUE_JSON,
];

/// How a signature identifies its verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyReference {
    /// No key information; the verifier knows the key
    Implicit,
    /// Inlined public key (`jwk`)
    PublicKey(PublicKey),
    /// Inlined certificate path (`x5c`), signer first
    CertificatePath(Vec<Certificate>),
    /// Public key URI (`jku`)
    RemoteKey(String),
    /// Certificate path URI (`x5u`)
    RemoteCertificatePath(String),
}

impl KeyReference {
    fn write(&self, writer: ObjectWriter) -> JcsResult<ObjectWriter> {
        match self {
            KeyReference::Implicit => Ok(writer),
            KeyReference::PublicKey(key) => writer.set_object(JWK_JSON, key.to_jwk()?),
            KeyReference::CertificatePath(path) => {
                let der: Vec<&[u8]> = path.iter().map(Certificate::as_der).collect();
                writer.set_binary_array(CERTIFICATE_PATH_JSON, &der)
            }
            KeyReference::RemoteKey(uri) => writer.set_string(REMOTE_KEY_JSON, uri.as_str()),
            KeyReference::RemoteCertificatePath(uri) => {
                writer.set_string(REMOTE_CERTIFICATE_PATH_JSON, uri.as_str())
            }
        }
    }

    pub(crate) fn read(block: &JsonObject) -> JcsResult<Self> {
        let present = [
            JWK_JSON,
            CERTIFICATE_PATH_JSON,
            REMOTE_KEY_JSON,
            REMOTE_CERTIFICATE_PATH_JSON,
        ]
        .iter()
        .filter(|name| block.contains(name))
        .count();
        if present > 1 {
            return Err(ErrorCode::E208_InvalidValue(
                SIGNATURE_JSON.to_string(),
                "more than one key reference".to_string(),
            ));
        }
        if let Some(jwk) = block.get_object_conditional(JWK_JSON)? {
            return Ok(KeyReference::PublicKey(PublicKey::from_jwk(jwk)?));
        }
        if block.contains(CERTIFICATE_PATH_JSON) {
            let path = block.get_binary_array(CERTIFICATE_PATH_JSON)?;
            if path.is_empty() {
                return Err(ErrorCode::E208_InvalidValue(
                    CERTIFICATE_PATH_JSON.to_string(),
                    "empty".to_string(),
                ));
            }
            return Ok(KeyReference::CertificatePath(
                path.into_iter().map(Certificate).collect(),
            ));
        }
        if let Some(uri) = block.get_string_conditional(REMOTE_KEY_JSON)? {
            return Ok(KeyReference::RemoteKey(uri.to_string()));
        }
        if let Some(uri) = block.get_string_conditional(REMOTE_CERTIFICATE_PATH_JSON)? {
            return Ok(KeyReference::RemoteCertificatePath(uri.to_string()));
        }
        Ok(KeyReference::Implicit)
    }
}

/// Signing key material.
#[derive(Debug, Clone)]
pub enum SigningKey {
    /// ES256 / RS* private key
    Asymmetric(PrivateKey),
    /// HS* shared secret
    Symmetric(Vec<u8>),
}

/// Everything needed to produce one signature block.
#[derive(Debug, Clone)]
pub struct Signer {
    algorithm: SignatureAlgorithm,
    key: SigningKey,
    key_id: Option<String>,
    reference: KeyReference,
    excluded: Vec<String>,
    extensions: Vec<(String, JsonValue)>,
}

impl Signer {
    /// Signer for a private key. The algorithm must fit the key type.
    pub fn asymmetric(algorithm: SignatureAlgorithm, key: PrivateKey) -> JcsResult<Self> {
        let fits = match (&key, algorithm) {
            (PrivateKey::Ec(_), SignatureAlgorithm::Es256) => true,
            (PrivateKey::Rsa(_), alg) => {
                matches!(
                    alg,
                    SignatureAlgorithm::Rs256 | SignatureAlgorithm::Rs384 | SignatureAlgorithm::Rs512
                )
            }
            _ => false,
        };
        if !fits {
            return Err(ErrorCode::E301_SignatureAlgorithmMismatch(
                algorithm.to_string(),
            ));
        }
        Ok(Self::with_key(algorithm, SigningKey::Asymmetric(key)))
    }

    /// Signer for a shared HMAC secret.
    pub fn symmetric(algorithm: SignatureAlgorithm, key: impl Into<Vec<u8>>) -> JcsResult<Self> {
        if !algorithm.is_symmetric() {
            return Err(ErrorCode::E301_SignatureAlgorithmMismatch(
                algorithm.to_string(),
            ));
        }
        Ok(Self::with_key(algorithm, SigningKey::Symmetric(key.into())))
    }

    fn with_key(algorithm: SignatureAlgorithm, key: SigningKey) -> Self {
        Self {
            algorithm,
            key,
            key_id: None,
            reference: KeyReference::Implicit,
            excluded: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Add a `kid`.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Inline the signer's public key as `jwk`.
    pub fn with_public_key(mut self) -> JcsResult<Self> {
        match &self.key {
            SigningKey::Asymmetric(private) => {
                self.reference = KeyReference::PublicKey(private.public_key());
                Ok(self)
            }
            SigningKey::Symmetric(_) => Err(ErrorCode::E301_SignatureAlgorithmMismatch(
                self.algorithm.to_string(),
            )),
        }
    }

    /// Set an explicit key reference (`x5c`, `jku`, `x5u`, ...).
    pub fn with_key_reference(mut self, reference: KeyReference) -> Self {
        self.reference = reference;
        self
    }

    /// Leave these properties out of the signed data.
    pub fn with_excluded(mut self, names: &[&str]) -> Self {
        self.excluded = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Add a critical extension property.
    pub fn with_extension(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.extensions.push((name.into(), value));
        self
    }

    /// The signature algorithm.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Build the signature object without `val`.
    fn encode_block(&self) -> JcsResult<JsonObject> {
        let mut writer = ObjectWriter::new().set_string(ALGORITHM_JSON, self.algorithm.name())?;
        if let Some(kid) = &self.key_id {
            writer = writer.set_string(KEY_ID_JSON, kid.as_str())?;
        }
        writer = self.reference.write(writer)?;
        if !self.extensions.is_empty() {
            let names: Vec<&str> = self.extensions.iter().map(|(n, _)| n.as_str()).collect();
            writer = writer.set_string_array(CRITICAL_JSON, &names)?;
            for (name, value) in &self.extensions {
                if RESERVED_NAMES.contains(&name.as_str()) {
                    return Err(ErrorCode::E305_CriticalExtension(name.clone()));
                }
                writer = writer.set_value(name, value.clone())?;
            }
        }
        if !self.excluded.is_empty() {
            writer = writer.set_string_array(EXCLUDED_JSON, &self.excluded)?;
        }
        Ok(writer.build())
    }

    fn sign_data(&self, data: &[u8]) -> JcsResult<Vec<u8>> {
        match &self.key {
            SigningKey::Asymmetric(private) => sign_asymmetric(self.algorithm, private, data),
            SigningKey::Symmetric(secret) => hmac_sign(self.algorithm, secret, data),
        }
    }
}

/// NORMALIZED bytes covered by one signature block.
///
/// `block` replaces the container property (`signature` or `signatures`) in
/// a copy of `object`; `excluded` properties are removed from the copy.
pub(crate) fn signed_bytes(
    object: &JsonObject,
    container: &str,
    block: JsonValue,
    excluded: &[String],
) -> JcsResult<Vec<u8>> {
    let mut copy = object.clone();
    for name in excluded {
        if name == SIGNATURE_JSON || name == SIGNATURES_JSON {
            return Err(ErrorCode::E208_InvalidValue(
                EXCLUDED_JSON.to_string(),
                name.clone(),
            ));
        }
        if copy.remove(name).is_none() {
            return Err(ErrorCode::E304_MissingExcludedProperty(name.clone()));
        }
    }
    copy.set(container, block);
    normalize_object(&copy)
}

fn with_value(mut block: JsonObject, value: &[u8]) -> JcsResult<JsonValue> {
    block.insert(VALUE_JSON, JsonValue::String(base64url_encode(value)))?;
    Ok(JsonValue::Object(block))
}

/// Add a `signature` property to `object`.
///
/// On error `object` is left untouched.
pub fn sign(object: &mut JsonObject, signer: &Signer) -> JcsResult<()> {
    let block = signer.encode_block()?;
    let mut signed = object.clone();
    signed.insert(SIGNATURE_JSON, JsonValue::Object(block.clone()))?;
    let data = signed_bytes(
        &signed,
        SIGNATURE_JSON,
        JsonValue::Object(block.clone()),
        &signer.excluded,
    )?;
    let value = signer.sign_data(&data)?;
    signed.set(SIGNATURE_JSON, with_value(block, &value)?);
    debug!(
        algorithm = %signer.algorithm,
        signed_bytes = data.len(),
        "signature created"
    );
    *object = signed;
    Ok(())
}

/// Add a `signatures` array with one independent block per signer.
pub fn sign_multiple(object: &mut JsonObject, signers: &[Signer]) -> JcsResult<()> {
    if signers.is_empty() {
        return Err(ErrorCode::E208_InvalidValue(
            SIGNATURES_JSON.to_string(),
            "no signers".to_string(),
        ));
    }
    let blocks = signers
        .iter()
        .map(Signer::encode_block)
        .collect::<JcsResult<Vec<_>>>()?;
    let mut signed = object.clone();
    signed.insert(
        SIGNATURES_JSON,
        JsonValue::Array(blocks.iter().cloned().map(JsonValue::Object).collect()),
    )?;

    let mut completed = Vec::with_capacity(blocks.len());
    for (signer, block) in signers.iter().zip(blocks) {
        let data = signed_bytes(
            &signed,
            SIGNATURES_JSON,
            JsonValue::Array(vec![JsonValue::Object(block.clone())]),
            &signer.excluded,
        )?;
        let value = signer.sign_data(&data)?;
        completed.push(with_value(block, &value)?);
    }
    signed.set(SIGNATURES_JSON, JsonValue::Array(completed));
    debug!(count = signers.len(), "signatures created");
    *object = signed;
    Ok(())
}
