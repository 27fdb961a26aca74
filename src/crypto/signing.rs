//! Raw signature and MAC primitives.
//!
//! ES256 values are the 64-byte `r || s` concatenation; RSA values are
//! PKCS#1 v1.5. HMAC verification compares in constant time.

use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use rsa::pkcs1v15;
use rsa::signature::SignatureEncoding;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use super::algorithms::SignatureAlgorithm;
use super::keys::{PrivateKey, PublicKey};
use crate::error::{ErrorCode, JcsResult};

macro_rules! hmac_digest {
    ($digest:ty, $key:expr, $data:expr) => {{
        let mut mac = <Hmac<$digest> as Mac>::new_from_slice($key)
            .map_err(|_| ErrorCode::E308_InvalidKey("HMAC key".into()))?;
        mac.update($data);
        mac.finalize().into_bytes().to_vec()
    }};
}

macro_rules! rsa_sign {
    ($digest:ty, $key:expr, $data:expr) => {{
        let signing_key = pkcs1v15::SigningKey::<$digest>::new($key.clone());
        signing_key
            .try_sign($data)
            .map_err(|e| ErrorCode::E309_CryptoFailure(e.to_string()))?
            .to_vec()
    }};
}

macro_rules! rsa_verify {
    ($digest:ty, $key:expr, $data:expr, $value:expr) => {{
        let verifying_key = pkcs1v15::VerifyingKey::<$digest>::new($key.clone());
        let signature =
            pkcs1v15::Signature::try_from($value).map_err(|_| ErrorCode::E300_SignatureInvalid)?;
        verifying_key
            .verify($data, &signature)
            .map_err(|_| ErrorCode::E300_SignatureInvalid)
    }};
}

/// Compute an HMAC for one of the `HS*` algorithms.
pub fn hmac_sign(algorithm: SignatureAlgorithm, key: &[u8], data: &[u8]) -> JcsResult<Vec<u8>> {
    Ok(match algorithm {
        SignatureAlgorithm::Hs256 => hmac_digest!(Sha256, key, data),
        SignatureAlgorithm::Hs384 => hmac_digest!(Sha384, key, data),
        SignatureAlgorithm::Hs512 => hmac_digest!(Sha512, key, data),
        other => return Err(ErrorCode::E301_SignatureAlgorithmMismatch(other.to_string())),
    })
}

/// Verify an HMAC value.
pub fn hmac_verify(
    algorithm: SignatureAlgorithm,
    key: &[u8],
    data: &[u8],
    value: &[u8],
) -> JcsResult<()> {
    let expected = hmac_sign(algorithm, key, data)?;
    if bool::from(expected.ct_eq(value)) {
        Ok(())
    } else {
        Err(ErrorCode::E300_SignatureInvalid)
    }
}

/// HMAC-SHA256, used throughout session key derivation.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> JcsResult<Vec<u8>> {
    hmac_sign(SignatureAlgorithm::Hs256, key, data)
}

/// Sign with a private key.
pub fn sign_asymmetric(
    algorithm: SignatureAlgorithm,
    key: &PrivateKey,
    data: &[u8],
) -> JcsResult<Vec<u8>> {
    match (algorithm, key) {
        (SignatureAlgorithm::Es256, PrivateKey::Ec(secret)) => {
            let signing_key = p256::ecdsa::SigningKey::from(secret);
            let signature: p256::ecdsa::Signature = signing_key.sign(data);
            Ok(signature.to_bytes().to_vec())
        }
        (SignatureAlgorithm::Rs256, PrivateKey::Rsa(private)) => {
            Ok(rsa_sign!(Sha256, private, data))
        }
        (SignatureAlgorithm::Rs384, PrivateKey::Rsa(private)) => {
            Ok(rsa_sign!(Sha384, private, data))
        }
        (SignatureAlgorithm::Rs512, PrivateKey::Rsa(private)) => {
            Ok(rsa_sign!(Sha512, private, data))
        }
        (algorithm, _) => Err(ErrorCode::E301_SignatureAlgorithmMismatch(
            algorithm.to_string(),
        )),
    }
}

/// Verify with a public key.
pub fn verify_asymmetric(
    algorithm: SignatureAlgorithm,
    key: &PublicKey,
    data: &[u8],
    value: &[u8],
) -> JcsResult<()> {
    match (algorithm, key) {
        (SignatureAlgorithm::Es256, PublicKey::Ec(public)) => {
            let verifying_key = p256::ecdsa::VerifyingKey::from(public);
            let signature = p256::ecdsa::Signature::from_slice(value)
                .map_err(|_| ErrorCode::E300_SignatureInvalid)?;
            verifying_key
                .verify(data, &signature)
                .map_err(|_| ErrorCode::E300_SignatureInvalid)
        }
        (SignatureAlgorithm::Rs256, PublicKey::Rsa(public)) => {
            rsa_verify!(Sha256, public, data, value)
        }
        (SignatureAlgorithm::Rs384, PublicKey::Rsa(public)) => {
            rsa_verify!(Sha384, public, data, value)
        }
        (SignatureAlgorithm::Rs512, PublicKey::Rsa(public)) => {
            rsa_verify!(Sha512, public, data, value)
        }
        (algorithm, _) => Err(ErrorCode::E301_SignatureAlgorithmMismatch(
            algorithm.to_string(),
        )),
    }
}
