//! Authenticated content encryption.
//!
//! The CBC-HMAC variants follow RFC 7518 section 5.2: the first half of the
//! key authenticates, the second half encrypts, and the tag is the truncated
//! HMAC over `aad || iv || ciphertext || AL` where AL is the AAD length in
//! bits as a 64-bit big-endian integer.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use rand_core::CryptoRngCore;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use super::algorithms::ContentEncryptionAlgorithm;
use crate::error::{ErrorCode, JcsResult};

/// Output of content encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEncryptionResult {
    /// Initialization vector
    pub iv: Vec<u8>,
    /// Authentication tag
    pub tag: Vec<u8>,
    /// Encrypted data
    pub cipher_text: Vec<u8>,
}

/// Generate a fresh content encryption key of the right length.
pub fn generate_content_key(
    algorithm: ContentEncryptionAlgorithm,
    rng: &mut impl CryptoRngCore,
) -> Vec<u8> {
    let mut key = vec![0u8; algorithm.key_length()];
    rng.fill_bytes(&mut key);
    key
}

fn check_key(algorithm: ContentEncryptionAlgorithm, key: &[u8]) -> JcsResult<()> {
    if key.len() != algorithm.key_length() {
        return Err(ErrorCode::E403_InvalidKeyLength(
            key.len(),
            algorithm.key_length(),
        ));
    }
    Ok(())
}

/// Encrypt `plaintext` with a fresh random IV.
pub fn encrypt_content(
    algorithm: ContentEncryptionAlgorithm,
    key: &[u8],
    plaintext: &[u8],
    aad: &[u8],
    rng: &mut impl CryptoRngCore,
) -> JcsResult<ContentEncryptionResult> {
    check_key(algorithm, key)?;
    let mut iv = vec![0u8; algorithm.iv_length()];
    rng.fill_bytes(&mut iv);

    if algorithm.is_gcm() {
        let mut buffer = plaintext.to_vec();
        let nonce = GenericArray::from_slice(&iv);
        let tag = match algorithm {
            ContentEncryptionAlgorithm::A128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(|_| ErrorCode::E403_InvalidKeyLength(key.len(), 16))?
                .encrypt_in_place_detached(nonce, aad, &mut buffer),
            _ => Aes256Gcm::new_from_slice(key)
                .map_err(|_| ErrorCode::E403_InvalidKeyLength(key.len(), 32))?
                .encrypt_in_place_detached(nonce, aad, &mut buffer),
        }
        .map_err(|_| ErrorCode::E309_CryptoFailure("AES-GCM encryption".into()))?;
        return Ok(ContentEncryptionResult {
            iv,
            tag: tag.to_vec(),
            cipher_text: buffer,
        });
    }

    let (mac_key, enc_key) = key.split_at(key.len() / 2);
    let cipher_text = match algorithm {
        ContentEncryptionAlgorithm::A128CbcHs256 => cbc::Encryptor::<Aes128>::new_from_slices(enc_key, &iv)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(enc_key.len(), 16))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(enc_key, &iv)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(enc_key.len(), 32))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    };
    let tag = cbc_tag(algorithm, mac_key, aad, &iv, &cipher_text)?;
    Ok(ContentEncryptionResult {
        iv,
        tag,
        cipher_text,
    })
}

/// Decrypt and authenticate. Any integrity failure is `E400_DecryptionFailed`.
pub fn decrypt_content(
    algorithm: ContentEncryptionAlgorithm,
    key: &[u8],
    cipher_text: &[u8],
    iv: &[u8],
    aad: &[u8],
    tag: &[u8],
) -> JcsResult<Vec<u8>> {
    check_key(algorithm, key)?;
    if iv.len() != algorithm.iv_length() || tag.len() != algorithm.tag_length() {
        return Err(ErrorCode::E400_DecryptionFailed);
    }

    if algorithm.is_gcm() {
        let mut buffer = cipher_text.to_vec();
        let nonce = GenericArray::from_slice(iv);
        let tag = GenericArray::from_slice(tag);
        match algorithm {
            ContentEncryptionAlgorithm::A128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(|_| ErrorCode::E403_InvalidKeyLength(key.len(), 16))?
                .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
            _ => Aes256Gcm::new_from_slice(key)
                .map_err(|_| ErrorCode::E403_InvalidKeyLength(key.len(), 32))?
                .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
        }
        .map_err(|_| ErrorCode::E400_DecryptionFailed)?;
        return Ok(buffer);
    }

    let (mac_key, enc_key) = key.split_at(key.len() / 2);
    let expected = cbc_tag(algorithm, mac_key, aad, iv, cipher_text)?;
    if !bool::from(expected.ct_eq(tag)) {
        return Err(ErrorCode::E400_DecryptionFailed);
    }
    match algorithm {
        ContentEncryptionAlgorithm::A128CbcHs256 => cbc::Decryptor::<Aes128>::new_from_slices(enc_key, iv)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(enc_key.len(), 16))?
            .decrypt_padded_vec_mut::<Pkcs7>(cipher_text),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(enc_key, iv)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(enc_key.len(), 32))?
            .decrypt_padded_vec_mut::<Pkcs7>(cipher_text),
    }
    .map_err(|_| ErrorCode::E400_DecryptionFailed)
}

fn cbc_tag(
    algorithm: ContentEncryptionAlgorithm,
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    cipher_text: &[u8],
) -> JcsResult<Vec<u8>> {
    use hmac::{Hmac, Mac};

    let al = ((aad.len() as u64) * 8).to_be_bytes();
    let full = match algorithm {
        ContentEncryptionAlgorithm::A128CbcHs256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(mac_key)
                .map_err(|_| ErrorCode::E308_InvalidKey("HMAC key".into()))?;
            mac.update(aad);
            mac.update(iv);
            mac.update(cipher_text);
            mac.update(&al);
            mac.finalize().into_bytes().to_vec()
        }
        _ => {
            let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(mac_key)
                .map_err(|_| ErrorCode::E308_InvalidKey("HMAC key".into()))?;
            mac.update(aad);
            mac.update(iv);
            mac.update(cipher_text);
            mac.update(&al);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(full[..algorithm.tag_length()].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_all_algorithms_round_trip() {
        for alg in ContentEncryptionAlgorithm::ALL {
            let key = generate_content_key(alg, &mut OsRng);
            let result = encrypt_content(alg, &key, b"{\"a\":1}", b"aad", &mut OsRng).unwrap();
            assert_eq!(result.iv.len(), alg.iv_length());
            assert_eq!(result.tag.len(), alg.tag_length());
            let plain = decrypt_content(
                alg,
                &key,
                &result.cipher_text,
                &result.iv,
                b"aad",
                &result.tag,
            )
            .unwrap();
            assert_eq!(plain, b"{\"a\":1}");
        }
    }

    #[test]
    fn test_tampering_detected() {
        for alg in ContentEncryptionAlgorithm::ALL {
            let key = generate_content_key(alg, &mut OsRng);
            let result = encrypt_content(alg, &key, b"secret", b"aad", &mut OsRng).unwrap();

            let mut cipher_text = result.cipher_text.clone();
            cipher_text[0] ^= 1;
            assert_eq!(
                decrypt_content(alg, &key, &cipher_text, &result.iv, b"aad", &result.tag),
                Err(ErrorCode::E400_DecryptionFailed)
            );
            assert_eq!(
                decrypt_content(alg, &key, &result.cipher_text, &result.iv, b"aaD", &result.tag),
                Err(ErrorCode::E400_DecryptionFailed)
            );
        }
    }

    #[test]
    fn test_rfc7518_a128cbc_hs256() {
        // RFC 7518 appendix B.1
        let key = hex::decode(
            "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
        )
        .unwrap();
        let plain = hex::decode(
            "41206369706865722073797374656d206d757374206e6f742062652072657175\
             6972656420746f206265207365637265742c20616e64206974206d7573742062\
             652061626c6520746f2066616c6c20696e746f207468652068616e6473206f66\
             2074686520656e656d7920776974686f757420696e636f6e76656e69656e6365",
        )
        .unwrap();
        let iv = hex::decode("1af38c2dc2b96ffdd86694092341bc04").unwrap();
        let aad = hex::decode(
            "546865207365636f6e64207072696e6369706c65206f66204175677573746520\
             4b6572636b686f666673",
        )
        .unwrap();
        let cipher_text = hex::decode(
            "c80edfa32ddf39d5ef00c0b468834279a2e46a1b8049f792f76bfe54b903a9c9\
             a94ac9b47ad2655c5f10f9aef71427e2fc6f9b3f399a221489f16362c7032336\
             09d45ac69864e3321cf82935ac4096c86e133314c54019e8ca7980dfa4b9cf1b\
             384c486f3a54c51078158ee5d79de59fbd34d848b3d69550a67646344427ade5\
             4b8851ffb598f7f80074b9473c82e2db",
        )
        .unwrap();
        let tag = hex::decode("652c3fa36b0a7c5b3219fab3a30bc1c4").unwrap();

        let alg = ContentEncryptionAlgorithm::A128CbcHs256;
        let decrypted = decrypt_content(alg, &key, &cipher_text, &iv, &aad, &tag).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_wrong_key_length() {
        assert_eq!(
            encrypt_content(
                ContentEncryptionAlgorithm::A256Gcm,
                &[0; 16],
                b"x",
                b"",
                &mut OsRng
            ),
            Err(ErrorCode::E403_InvalidKeyLength(16, 32))
        );
    }
}
