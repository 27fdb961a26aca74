//! Signature verification.

use tracing::{debug, warn};

use super::remote::{RemoteKeyReader, TrustVerifier};
use super::signature::{signed_bytes, KeyReference, RESERVED_NAMES};
use super::{
    ALGORITHM_JSON, CRITICAL_JSON, EXCLUDED_JSON, KEY_ID_JSON, SIGNATURES_JSON, SIGNATURE_JSON,
    VALUE_JSON,
};
use crate::crypto::signing::{hmac_verify, verify_asymmetric};
use crate::crypto::{PublicKey, SignatureAlgorithm};
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, JsonValue};

/// Whether signatures must, may or must not carry a `kid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyIdPolicy {
    /// `kid` is accepted but not required
    #[default]
    Optional,
    /// `kid` must be present
    Required,
    /// `kid` must be absent
    Forbidden,
}

/// Verification policy.
#[derive(Clone, Copy)]
pub struct VerifierOptions<'a> {
    /// `kid` policy
    pub key_id_policy: KeyIdPolicy,
    /// Extension names a signature may declare critical
    pub permitted_extensions: &'a [&'a str],
    /// Reject algorithms whose digest is shorter than this many bits
    pub minimum_digest_bits: u16,
    /// Resolver for `jku` / `x5u`
    pub remote_key_reader: Option<&'a dyn RemoteKeyReader>,
    /// Trust anchor for `x5c` / `x5u`
    pub trust_verifier: Option<&'a dyn TrustVerifier>,
    /// Reject signatures that carry no key information at all
    pub require_public_key_info: bool,
}

impl<'a> VerifierOptions<'a> {
    /// Default policy: `kid` optional, no extensions, any digest size.
    pub const fn new() -> Self {
        Self {
            key_id_policy: KeyIdPolicy::Optional,
            permitted_extensions: &[],
            minimum_digest_bits: 0,
            remote_key_reader: None,
            trust_verifier: None,
            require_public_key_info: false,
        }
    }

    /// Set the `kid` policy.
    pub const fn with_key_id_policy(mut self, policy: KeyIdPolicy) -> Self {
        self.key_id_policy = policy;
        self
    }

    /// Permit these critical extensions.
    pub const fn with_permitted_extensions(mut self, names: &'a [&'a str]) -> Self {
        self.permitted_extensions = names;
        self
    }

    /// Require at least this digest size.
    pub const fn with_minimum_digest_bits(mut self, bits: u16) -> Self {
        self.minimum_digest_bits = bits;
        self
    }

    /// Resolve remote references with `reader`.
    pub fn with_remote_key_reader(mut self, reader: &'a dyn RemoteKeyReader) -> Self {
        self.remote_key_reader = Some(reader);
        self
    }

    /// Validate certificate paths with `verifier`.
    pub fn with_trust_verifier(mut self, verifier: &'a dyn TrustVerifier) -> Self {
        self.trust_verifier = Some(verifier);
        self
    }

    /// Require `jwk`, `x5c`, `jku` or `x5u`.
    pub const fn with_required_public_key_info(mut self, required: bool) -> Self {
        self.require_public_key_info = required;
        self
    }
}

impl Default for VerifierOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies an HMAC signature value without exposing the secret.
pub trait SymmetricKeyVerifier {
    /// Check `value` over `data`. Mismatch is `E300_SignatureInvalid`.
    fn verify_mac(&self, algorithm: SignatureAlgorithm, data: &[u8], value: &[u8])
        -> JcsResult<()>;
}

/// A raw HMAC secret.
#[derive(Clone)]
pub struct HmacKey(pub Vec<u8>);

impl SymmetricKeyVerifier for HmacKey {
    fn verify_mac(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        value: &[u8],
    ) -> JcsResult<()> {
        hmac_verify(algorithm, &self.0, data, value)
    }
}

/// Where the verification key comes from.
#[derive(Clone, Copy)]
pub enum Verifier<'a> {
    /// A key known to the caller. Any key the signature names, inlined or
    /// referenced, must resolve to it.
    PublicKey(&'a PublicKey),
    /// A shared secret.
    Symmetric(&'a dyn SymmetricKeyVerifier),
    /// The key named by the signature: inlined `jwk` as is, certificate
    /// paths through the trust verifier, remote references through the
    /// remote key reader.
    FromSignature,
}

/// A decoded signature block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    /// Signature algorithm
    pub algorithm: SignatureAlgorithm,
    /// Optional key id
    pub key_id: Option<String>,
    /// Key reference
    pub key: KeyReference,
    /// Critical extension properties, in `crit` order
    pub extensions: Vec<(String, JsonValue)>,
    /// Properties left out of the signed data
    pub excluded: Vec<String>,
    /// Signature value
    pub value: Vec<u8>,
}

impl SignatureBlock {
    /// Decode a `signature` object.
    pub fn decode(block: &JsonObject) -> JcsResult<Self> {
        let algorithm = SignatureAlgorithm::from_name(block.get_string(ALGORITHM_JSON)?)?;
        let key_id = block.get_string_conditional(KEY_ID_JSON)?.map(str::to_string);
        let key = KeyReference::read(block)?;

        let mut extensions = Vec::new();
        if block.contains(CRITICAL_JSON) {
            let names = block.get_string_array(CRITICAL_JSON)?;
            if names.is_empty() {
                return Err(ErrorCode::E208_InvalidValue(
                    CRITICAL_JSON.to_string(),
                    "empty".to_string(),
                ));
            }
            for name in names {
                if RESERVED_NAMES.contains(&name.as_str()) {
                    return Err(ErrorCode::E305_CriticalExtension(name));
                }
                let value = block
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| ErrorCode::E305_CriticalExtension(name.clone()))?;
                extensions.push((name, value));
            }
        }

        let excluded = block.get_string_array_conditional(EXCLUDED_JSON)?;
        if block.contains(EXCLUDED_JSON) && excluded.is_empty() {
            return Err(ErrorCode::E208_InvalidValue(
                EXCLUDED_JSON.to_string(),
                "empty".to_string(),
            ));
        }

        let value = block.get_binary(VALUE_JSON)?;

        let mut allowed: Vec<&str> = RESERVED_NAMES.to_vec();
        allowed.extend(extensions.iter().map(|(n, _)| n.as_str()));
        block.expect_only(&allowed)?;

        Ok(Self {
            algorithm,
            key_id,
            key,
            extensions,
            excluded,
            value,
        })
    }

    fn check_policy(&self, options: &VerifierOptions<'_>) -> JcsResult<()> {
        match (options.key_id_policy, &self.key_id) {
            (KeyIdPolicy::Required, None) => {
                return Err(ErrorCode::E302_KeyMismatch("missing kid".into()))
            }
            (KeyIdPolicy::Forbidden, Some(_)) => {
                return Err(ErrorCode::E302_KeyMismatch("unexpected kid".into()))
            }
            _ => {}
        }
        for (name, _) in &self.extensions {
            if !options.permitted_extensions.contains(&name.as_str()) {
                return Err(ErrorCode::E305_CriticalExtension(name.clone()));
            }
        }
        if self.algorithm.digest_bits() < options.minimum_digest_bits {
            return Err(ErrorCode::E301_SignatureAlgorithmMismatch(
                self.algorithm.to_string(),
            ));
        }
        if options.require_public_key_info && self.key == KeyReference::Implicit {
            return Err(ErrorCode::E302_KeyMismatch("missing public key info".into()));
        }
        Ok(())
    }

    fn resolve_key(&self, options: &VerifierOptions<'_>) -> JcsResult<PublicKey> {
        let trust = || {
            options
                .trust_verifier
                .ok_or_else(|| ErrorCode::E306_UntrustedCertificate("no trust verifier".into()))
        };
        let reader = || {
            options
                .remote_key_reader
                .ok_or_else(|| ErrorCode::E307_RemoteKey("no remote key reader".into()))
        };
        match &self.key {
            KeyReference::Implicit => Err(ErrorCode::E302_KeyMismatch(
                "signature carries no key".into(),
            )),
            KeyReference::PublicKey(key) => Ok(key.clone()),
            KeyReference::CertificatePath(path) => trust()?.verify_path(path),
            KeyReference::RemoteKey(uri) => reader()?.read_public_key(uri),
            KeyReference::RemoteCertificatePath(uri) => {
                let path = reader()?.read_certificate_path(uri)?;
                trust()?.verify_path(&path)
            }
        }
    }

    /// The key named by the signature's metadata must be `expected`.
    ///
    /// Certificate paths and remote references count only when the options
    /// can resolve them; an unresolvable reference is a mismatch.
    fn check_referenced_key(
        &self,
        expected: &PublicKey,
        options: &VerifierOptions<'_>,
    ) -> JcsResult<()> {
        let resolvable = match &self.key {
            KeyReference::Implicit | KeyReference::PublicKey(_) => true,
            KeyReference::CertificatePath(_) => options.trust_verifier.is_some(),
            KeyReference::RemoteKey(_) => options.remote_key_reader.is_some(),
            KeyReference::RemoteCertificatePath(_) => {
                options.trust_verifier.is_some() && options.remote_key_reader.is_some()
            }
        };
        if !resolvable {
            return Err(ErrorCode::E302_KeyMismatch(
                "key reference cannot be resolved".into(),
            ));
        }
        if self.resolve_key(options)? != *expected {
            return Err(ErrorCode::E302_KeyMismatch("referenced public key".into()));
        }
        Ok(())
    }

    fn verify_data(
        &self,
        data: &[u8],
        verifier: &Verifier<'_>,
        options: &VerifierOptions<'_>,
    ) -> JcsResult<()> {
        match verifier {
            Verifier::Symmetric(secret) => {
                if !self.algorithm.is_symmetric() {
                    return Err(ErrorCode::E301_SignatureAlgorithmMismatch(
                        self.algorithm.to_string(),
                    ));
                }
                if self.key != KeyReference::Implicit {
                    return Err(ErrorCode::E302_KeyMismatch(
                        "public key info on a symmetric signature".into(),
                    ));
                }
                secret.verify_mac(self.algorithm, data, &self.value)
            }
            Verifier::PublicKey(expected) => {
                if self.key != KeyReference::Implicit {
                    self.check_referenced_key(expected, options)?;
                }
                verify_asymmetric(self.algorithm, expected, data, &self.value)
            }
            Verifier::FromSignature => {
                let key = self.resolve_key(options)?;
                verify_asymmetric(self.algorithm, &key, data, &self.value)
            }
        }
    }
}

fn unsigned_block(raw: &JsonObject) -> JsonValue {
    let mut block = raw.clone();
    block.remove(VALUE_JSON);
    JsonValue::Object(block)
}

fn log_failure(algorithm: SignatureAlgorithm, result: JcsResult<()>) -> JcsResult<()> {
    if let Err(error) = &result {
        warn!(algorithm = %algorithm, error = %error, "signature verification failed");
    }
    result
}

/// Verify the `signature` property of `object`.
pub fn verify(
    object: &JsonObject,
    verifier: &Verifier<'_>,
    options: &VerifierOptions<'_>,
) -> JcsResult<SignatureBlock> {
    let raw = object.get_object(SIGNATURE_JSON)?;
    let block = SignatureBlock::decode(raw)?;
    block.check_policy(options)?;
    let data = signed_bytes(object, SIGNATURE_JSON, unsigned_block(raw), &block.excluded)?;
    log_failure(block.algorithm, block.verify_data(&data, verifier, options))?;
    debug!(algorithm = %block.algorithm, kid = ?block.key_id, "signature verified");
    Ok(block)
}

/// Verify every block of the `signatures` array of `object`.
///
/// Pass one verifier to use it for all blocks, or one per block.
pub fn verify_multiple(
    object: &JsonObject,
    verifiers: &[Verifier<'_>],
    options: &VerifierOptions<'_>,
) -> JcsResult<Vec<SignatureBlock>> {
    let raws = object.get_object_array(SIGNATURES_JSON)?;
    if raws.is_empty() || (verifiers.len() != 1 && verifiers.len() != raws.len()) {
        return Err(ErrorCode::E208_InvalidValue(
            SIGNATURES_JSON.to_string(),
            format!("{} blocks, {} verifiers", raws.len(), verifiers.len()),
        ));
    }
    let mut blocks = Vec::with_capacity(raws.len());
    for (i, raw) in raws.into_iter().enumerate() {
        let verifier = verifiers.get(i).or_else(|| verifiers.first());
        let Some(verifier) = verifier else {
            break;
        };
        let block = SignatureBlock::decode(raw)?;
        block.check_policy(options)?;
        let data = signed_bytes(
            object,
            SIGNATURES_JSON,
            JsonValue::Array(vec![unsigned_block(raw)]),
            &block.excluded,
        )?;
        log_failure(block.algorithm, block.verify_data(&data, verifier, options))?;
        blocks.push(block);
    }
    debug!(count = blocks.len(), "signatures verified");
    Ok(blocks)
}

/// True if `object` carries a `signature` or `signatures` property.
pub fn is_signed(object: &JsonObject) -> bool {
    object.contains(SIGNATURE_JSON) || object.contains(SIGNATURES_JSON)
}
