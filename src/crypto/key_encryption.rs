//! Key transport and key agreement.
//!
//! RSA recipients receive the content key under RSA-OAEP. EC recipients use
//! ECDH-ES with an ephemeral P-256 key and the Concat KDF of NIST SP 800-56A
//! as profiled by RFC 7518 section 4.6.2 (SHA-256, empty PartyUInfo and
//! PartyVInfo). The derived key is either the content key itself or an
//! AES key-wrapping key.

use aes_kw::{KekAes128, KekAes256};
use p256::ecdh::EphemeralSecret;
use rand_core::CryptoRngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::algorithms::{ContentEncryptionAlgorithm, KeyEncryptionAlgorithm};
use crate::error::{ErrorCode, JcsResult};

/// Result of the sender side of ECDH-ES.
#[derive(Debug, Clone)]
pub struct EcdhSenderResult {
    /// Ephemeral public key to publish with the recipient
    pub ephemeral_key: p256::PublicKey,
    /// Derived key: the content key for direct ECDH-ES, a KEK otherwise
    pub derived_key: Vec<u8>,
}

fn oaep(algorithm: KeyEncryptionAlgorithm) -> JcsResult<Oaep> {
    match algorithm {
        KeyEncryptionAlgorithm::RsaOaep256 => Ok(Oaep::new::<Sha256>()),
        KeyEncryptionAlgorithm::RsaOaep => Ok(Oaep::new::<sha1::Sha1>()),
        other => Err(ErrorCode::E303_UnsupportedAlgorithm(other.to_string())),
    }
}

/// Encrypt a content key for an RSA recipient.
pub fn rsa_encrypt_key(
    algorithm: KeyEncryptionAlgorithm,
    content_key: &[u8],
    public_key: &RsaPublicKey,
    rng: &mut impl CryptoRngCore,
) -> JcsResult<Vec<u8>> {
    public_key
        .encrypt(rng, oaep(algorithm)?, content_key)
        .map_err(|e| ErrorCode::E309_CryptoFailure(e.to_string()))
}

/// Recover a content key with an RSA private key.
pub fn rsa_decrypt_key(
    algorithm: KeyEncryptionAlgorithm,
    encrypted_key: &[u8],
    private_key: &RsaPrivateKey,
) -> JcsResult<Vec<u8>> {
    private_key
        .decrypt(oaep(algorithm)?, encrypted_key)
        .map_err(|_| ErrorCode::E400_DecryptionFailed)
}

/// Concat KDF with SHA-256.
///
/// `algorithm_id` is the content algorithm for direct agreement and the
/// key-wrap algorithm otherwise; `key_length` is in bytes.
pub fn concat_kdf(shared_secret: &[u8], algorithm_id: &str, key_length: usize) -> Vec<u8> {
    let mut other_info = Vec::with_capacity(algorithm_id.len() + 16);
    other_info.extend_from_slice(&(algorithm_id.len() as u32).to_be_bytes());
    other_info.extend_from_slice(algorithm_id.as_bytes());
    other_info.extend_from_slice(&0u32.to_be_bytes());
    other_info.extend_from_slice(&0u32.to_be_bytes());
    other_info.extend_from_slice(&((key_length as u32) * 8).to_be_bytes());

    let mut output = Vec::with_capacity(key_length + 32);
    let mut counter: u32 = 1;
    while output.len() < key_length {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_secret);
        hasher.update(&other_info);
        output.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    output.truncate(key_length);
    output
}

fn kdf_parameters(
    key_algorithm: KeyEncryptionAlgorithm,
    content_algorithm: ContentEncryptionAlgorithm,
) -> JcsResult<(&'static str, usize)> {
    match key_algorithm {
        KeyEncryptionAlgorithm::EcdhEs => {
            Ok((content_algorithm.name(), content_algorithm.key_length()))
        }
        KeyEncryptionAlgorithm::EcdhEsA128Kw | KeyEncryptionAlgorithm::EcdhEsA256Kw => Ok((
            key_algorithm.name(),
            key_algorithm.key_wrap_length().unwrap_or(16),
        )),
        other => Err(ErrorCode::E303_UnsupportedAlgorithm(other.to_string())),
    }
}

/// Sender side of ECDH-ES: fresh ephemeral key, agreement, KDF.
pub fn sender_key_agreement(
    key_algorithm: KeyEncryptionAlgorithm,
    content_algorithm: ContentEncryptionAlgorithm,
    static_key: &p256::PublicKey,
    rng: &mut impl CryptoRngCore,
) -> JcsResult<EcdhSenderResult> {
    let (algorithm_id, key_length) = kdf_parameters(key_algorithm, content_algorithm)?;
    let ephemeral = EphemeralSecret::random(rng);
    let shared = ephemeral.diffie_hellman(static_key);
    Ok(EcdhSenderResult {
        ephemeral_key: ephemeral.public_key(),
        derived_key: concat_kdf(shared.raw_secret_bytes(), algorithm_id, key_length),
    })
}

/// Receiver side of ECDH-ES.
pub fn receiver_key_agreement(
    key_algorithm: KeyEncryptionAlgorithm,
    content_algorithm: ContentEncryptionAlgorithm,
    ephemeral_key: &p256::PublicKey,
    private_key: &p256::SecretKey,
) -> JcsResult<Vec<u8>> {
    let (algorithm_id, key_length) = kdf_parameters(key_algorithm, content_algorithm)?;
    let shared =
        p256::ecdh::diffie_hellman(private_key.to_nonzero_scalar(), ephemeral_key.as_affine());
    Ok(concat_kdf(shared.raw_secret_bytes(), algorithm_id, key_length))
}

/// AES key wrap (RFC 3394) with a 16 or 32 byte KEK.
pub fn aes_key_wrap(kek: &[u8], content_key: &[u8]) -> JcsResult<Vec<u8>> {
    let wrapped = match kek.len() {
        16 => KekAes128::try_from(kek)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(kek.len(), 16))?
            .wrap_vec(content_key),
        32 => KekAes256::try_from(kek)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(kek.len(), 32))?
            .wrap_vec(content_key),
        n => return Err(ErrorCode::E403_InvalidKeyLength(n, 32)),
    };
    wrapped.map_err(|e| ErrorCode::E309_CryptoFailure(e.to_string()))
}

/// AES key unwrap. An integrity failure is `E400_DecryptionFailed`.
pub fn aes_key_unwrap(kek: &[u8], wrapped_key: &[u8]) -> JcsResult<Vec<u8>> {
    let unwrapped = match kek.len() {
        16 => KekAes128::try_from(kek)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(kek.len(), 16))?
            .unwrap_vec(wrapped_key),
        32 => KekAes256::try_from(kek)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(kek.len(), 32))?
            .unwrap_vec(wrapped_key),
        n => return Err(ErrorCode::E403_InvalidKeyLength(n, 32)),
    };
    unwrapped.map_err(|_| ErrorCode::E400_DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;
    use rsa::pkcs8::DecodePrivateKey;

    #[test]
    fn test_concat_kdf_length_and_separation() {
        let z = [7u8; 32];
        let a = concat_kdf(&z, "A128GCM", 16);
        let b = concat_kdf(&z, "A128GCM", 16);
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, concat_kdf(&z, "A256GCM", 16));
        let long = concat_kdf(&z, "A256CBC-HS512", 64);
        assert_eq!(long.len(), 64);
        assert_ne!(long[..32], long[32..]);
    }

    #[test]
    fn test_ecdh_agreement_matches() {
        let recipient = p256::SecretKey::random(&mut OsRng);
        for key_alg in [
            KeyEncryptionAlgorithm::EcdhEs,
            KeyEncryptionAlgorithm::EcdhEsA128Kw,
            KeyEncryptionAlgorithm::EcdhEsA256Kw,
        ] {
            let content = ContentEncryptionAlgorithm::A256CbcHs512;
            let sent =
                sender_key_agreement(key_alg, content, &recipient.public_key(), &mut OsRng)
                    .unwrap();
            let received =
                receiver_key_agreement(key_alg, content, &sent.ephemeral_key, &recipient).unwrap();
            assert_eq!(sent.derived_key, received);
            let expected_len = key_alg.key_wrap_length().unwrap_or(content.key_length());
            assert_eq!(received.len(), expected_len);
        }
    }

    #[test]
    fn test_aes_key_wrap_rfc3394() {
        // RFC 3394 section 4.1
        let kek = hex::decode("000102030405060708090A0B0C0D0E0F").unwrap();
        let data = hex::decode("00112233445566778899AABBCCDDEEFF").unwrap();
        let wrapped = aes_key_wrap(&kek, &data).unwrap();
        assert_eq!(
            hex::encode_upper(&wrapped),
            "1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5"
        );
        assert_eq!(aes_key_unwrap(&kek, &wrapped).unwrap(), data);

        let mut tampered = wrapped.clone();
        tampered[3] ^= 0x40;
        assert_eq!(
            aes_key_unwrap(&kek, &tampered),
            Err(ErrorCode::E400_DecryptionFailed)
        );
    }

    #[test]
    fn test_rsa_key_transport() {
        let rsa_private =
            RsaPrivateKey::from_pkcs8_pem(include_str!("../../tests/data/rsa2048-private.pem"))
                .unwrap();
        let public = rsa_private.to_public_key();
        for alg in [KeyEncryptionAlgorithm::RsaOaep, KeyEncryptionAlgorithm::RsaOaep256] {
            let cek = [9u8; 32];
            let encrypted = rsa_encrypt_key(alg, &cek, &public, &mut OsRng).unwrap();
            assert_eq!(rsa_decrypt_key(alg, &encrypted, &rsa_private).unwrap(), cek);
        }
        let encrypted =
            rsa_encrypt_key(KeyEncryptionAlgorithm::RsaOaep, &[1; 16], &public, &mut OsRng)
                .unwrap();
        assert_eq!(
            rsa_decrypt_key(KeyEncryptionAlgorithm::RsaOaep256, &encrypted, &rsa_private),
            Err(ErrorCode::E400_DecryptionFailed)
        );
    }
}
