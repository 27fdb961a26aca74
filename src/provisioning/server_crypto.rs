//! Server-side session cryptography.
//!
//! The state machine never touches key material directly. Everything that
//! needs the session key goes through [`ServerCryptoInterface`], which a
//! deployment may back with an HSM. [`SoftwareServerCrypto`] keeps the keys in
//! process memory:
//!
//! - session key = HMAC-SHA256(ECDH shared secret, KDF transcript)
//! - mac(data, modifier) = HMAC-SHA256(HMAC-SHA256(session key, modifier), data)
//! - encrypt = IV || AES-256-CBC(data) under HMAC-SHA256(session key, "Encryption Key")

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::constants::{KDF_DEVICE_ATTESTATION, KDF_ENCRYPTION_KEY};
use crate::crypto::signing::{hmac_sha256, sign_asymmetric, verify_asymmetric};
use crate::crypto::{Certificate, PrivateKey, PublicKey, SignatureAlgorithm};
use crate::envelope::TrustVerifier;
use crate::error::{ErrorCode, JcsResult};

const AES_BLOCK: usize = 16;

/// Session cryptography used by [`ServerState`](super::ServerState).
pub trait ServerCryptoInterface {
    /// Create the server's ephemeral P-256 key for this session.
    fn generate_ephemeral_key(&mut self) -> JcsResult<p256::PublicKey>;

    /// Derive the session key and check the device's session attestation.
    ///
    /// Without a device certificate path the attestation is a MAC under the
    /// new session key; with one it is a device signature.
    fn generate_and_verify_session_key(
        &mut self,
        client_ephemeral_key: &p256::PublicKey,
        kdf_data: &[u8],
        attestation_arguments: &[u8],
        device_certificate_path: Option<&[Certificate]>,
        session_attestation: &[u8],
    ) -> JcsResult<()>;

    /// MAC under a session-key derivative selected by `key_modifier`.
    fn mac(&self, data: &[u8], key_modifier: &[u8]) -> JcsResult<Vec<u8>>;

    /// Encrypt for the device under the session key.
    fn encrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>>;

    /// Inverse of [`ServerCryptoInterface::encrypt`].
    fn decrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>>;

    /// Sign `data` with the private key behind `key_management_key`.
    fn generate_key_management_authorization(
        &self,
        key_management_key: &PublicKey,
        data: &[u8],
    ) -> JcsResult<Vec<u8>>;

    /// Fresh random nonce.
    fn generate_nonce(&mut self) -> JcsResult<Vec<u8>>;
}

/// Signature algorithm a key signs authorizations and attestations with.
pub fn default_signature_algorithm(key: &PublicKey) -> SignatureAlgorithm {
    match key {
        PublicKey::Ec(_) => SignatureAlgorithm::Es256,
        PublicKey::Rsa(_) => SignatureAlgorithm::Rs256,
    }
}

/// In-memory [`ServerCryptoInterface`].
#[derive(Default)]
pub struct SoftwareServerCrypto {
    ephemeral_key: Option<p256::SecretKey>,
    session_key: Option<Vec<u8>>,
    key_management_keys: Vec<PrivateKey>,
    trust_verifier: Option<Box<dyn TrustVerifier>>,
}

impl SoftwareServerCrypto {
    /// No key-management keys, anonymous devices only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key-management private key.
    pub fn with_key_management_key(mut self, key: PrivateKey) -> Self {
        self.key_management_keys.push(key);
        self
    }

    /// Accept devices with certificates validated by `verifier`.
    pub fn with_trust_verifier(mut self, verifier: Box<dyn TrustVerifier>) -> Self {
        self.trust_verifier = Some(verifier);
        self
    }

    fn session_key(&self) -> JcsResult<&[u8]> {
        self.session_key
            .as_deref()
            .ok_or_else(|| ErrorCode::E500_ProtocolState("no session key".to_string()))
    }

    fn encryption_key(&self) -> JcsResult<Vec<u8>> {
        hmac_sha256(self.session_key()?, KDF_ENCRYPTION_KEY)
    }
}

impl ServerCryptoInterface for SoftwareServerCrypto {
    fn generate_ephemeral_key(&mut self) -> JcsResult<p256::PublicKey> {
        let secret = p256::SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        self.ephemeral_key = Some(secret);
        Ok(public)
    }

    fn generate_and_verify_session_key(
        &mut self,
        client_ephemeral_key: &p256::PublicKey,
        kdf_data: &[u8],
        attestation_arguments: &[u8],
        device_certificate_path: Option<&[Certificate]>,
        session_attestation: &[u8],
    ) -> JcsResult<()> {
        let ephemeral = self.ephemeral_key.as_ref().ok_or_else(|| {
            ErrorCode::E500_ProtocolState("no server ephemeral key".to_string())
        })?;
        let shared = p256::ecdh::diffie_hellman(
            ephemeral.to_nonzero_scalar(),
            client_ephemeral_key.as_affine(),
        );
        let session_key = hmac_sha256(shared.raw_secret_bytes(), kdf_data)?;

        match device_certificate_path {
            None => {
                let attestation_key = hmac_sha256(&session_key, KDF_DEVICE_ATTESTATION)?;
                let expected = hmac_sha256(&attestation_key, attestation_arguments)?;
                if !bool::from(expected.ct_eq(session_attestation)) {
                    return Err(ErrorCode::E502_AttestationFailure(
                        "session attestation MAC mismatch".to_string(),
                    ));
                }
            }
            Some(path) => {
                let verifier = self.trust_verifier.as_ref().ok_or_else(|| {
                    ErrorCode::E306_UntrustedCertificate("no trust verifier configured".into())
                })?;
                let device_key = verifier.verify_path(path)?;
                verify_asymmetric(
                    default_signature_algorithm(&device_key),
                    &device_key,
                    attestation_arguments,
                    session_attestation,
                )
                .map_err(|e| ErrorCode::E502_AttestationFailure(e.to_string()))?;
            }
        }

        debug!(anonymous = device_certificate_path.is_none(), "session key established");
        self.session_key = Some(session_key);
        Ok(())
    }

    fn mac(&self, data: &[u8], key_modifier: &[u8]) -> JcsResult<Vec<u8>> {
        let derived = hmac_sha256(self.session_key()?, key_modifier)?;
        hmac_sha256(&derived, data)
    }

    fn encrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>> {
        let key = self.encryption_key()?;
        let mut iv = [0u8; AES_BLOCK];
        OsRng.fill_bytes(&mut iv);
        let cipher_text = cbc::Encryptor::<Aes256>::new_from_slices(&key, &iv)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(key.len(), 32))?
            .encrypt_padded_vec_mut::<Pkcs7>(data);
        let mut out = iv.to_vec();
        out.extend_from_slice(&cipher_text);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>> {
        if data.len() < 2 * AES_BLOCK {
            return Err(ErrorCode::E400_DecryptionFailed);
        }
        let key = self.encryption_key()?;
        let (iv, cipher_text) = data.split_at(AES_BLOCK);
        cbc::Decryptor::<Aes256>::new_from_slices(&key, iv)
            .map_err(|_| ErrorCode::E403_InvalidKeyLength(key.len(), 32))?
            .decrypt_padded_vec_mut::<Pkcs7>(cipher_text)
            .map_err(|_| ErrorCode::E400_DecryptionFailed)
    }

    fn generate_key_management_authorization(
        &self,
        key_management_key: &PublicKey,
        data: &[u8],
    ) -> JcsResult<Vec<u8>> {
        let private = self
            .key_management_keys
            .iter()
            .find(|k| k.public_key() == *key_management_key)
            .ok_or_else(|| {
                ErrorCode::E308_InvalidKey("unknown key-management key".to_string())
            })?;
        sign_asymmetric(
            default_signature_algorithm(key_management_key),
            private,
            data,
        )
    }

    fn generate_nonce(&mut self) -> JcsResult<Vec<u8>> {
        let mut nonce = vec![0u8; 32];
        OsRng.fill_bytes(&mut nonce);
        Ok(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::sign_asymmetric;

    fn anonymous_session(crypto: &mut SoftwareServerCrypto) -> Vec<u8> {
        let server_public = crypto.generate_ephemeral_key().unwrap();
        let client = p256::SecretKey::random(&mut OsRng);
        let shared = p256::ecdh::diffie_hellman(
            client.to_nonzero_scalar(),
            server_public.as_affine(),
        );
        let session_key = hmac_sha256(shared.raw_secret_bytes(), b"kdf").unwrap();
        let attestation = hmac_sha256(
            &hmac_sha256(&session_key, KDF_DEVICE_ATTESTATION).unwrap(),
            b"args",
        )
        .unwrap();
        crypto
            .generate_and_verify_session_key(
                &client.public_key(),
                b"kdf",
                b"args",
                None,
                &attestation,
            )
            .unwrap();
        session_key
    }

    #[test]
    fn test_anonymous_session_and_mac() {
        let mut crypto = SoftwareServerCrypto::new();
        let session_key = anonymous_session(&mut crypto);
        let expected =
            hmac_sha256(&hmac_sha256(&session_key, b"method").unwrap(), b"data").unwrap();
        assert_eq!(crypto.mac(b"data", b"method").unwrap(), expected);
    }

    #[test]
    fn test_bad_attestation_rejected() {
        let mut crypto = SoftwareServerCrypto::new();
        crypto.generate_ephemeral_key().unwrap();
        let client = p256::SecretKey::random(&mut OsRng);
        let result = crypto.generate_and_verify_session_key(
            &client.public_key(),
            b"kdf",
            b"args",
            None,
            &[0u8; 32],
        );
        assert!(matches!(result, Err(ErrorCode::E502_AttestationFailure(_))));
        assert!(matches!(
            crypto.mac(b"x", b"y"),
            Err(ErrorCode::E500_ProtocolState(_))
        ));
    }

    #[test]
    fn test_encrypt_decrypt() {
        let mut crypto = SoftwareServerCrypto::new();
        anonymous_session(&mut crypto);
        let encrypted = crypto.encrypt(b"1234").unwrap();
        assert_eq!(encrypted.len(), 32);
        assert_eq!(crypto.decrypt(&encrypted).unwrap(), b"1234");
        assert_ne!(crypto.encrypt(b"1234").unwrap(), encrypted);
        assert_eq!(
            crypto.decrypt(&encrypted[..20]),
            Err(ErrorCode::E400_DecryptionFailed)
        );
    }

    #[test]
    fn test_key_management_authorization() {
        let km = PrivateKey::generate_ec(&mut OsRng);
        let km_public = km.public_key();
        let crypto = SoftwareServerCrypto::new().with_key_management_key(km);
        let signature = crypto
            .generate_key_management_authorization(&km_public, b"data")
            .unwrap();
        verify_asymmetric(SignatureAlgorithm::Es256, &km_public, b"data", &signature).unwrap();

        let other = PrivateKey::generate_ec(&mut OsRng).public_key();
        assert!(matches!(
            crypto.generate_key_management_authorization(&other, b"data"),
            Err(ErrorCode::E308_InvalidKey(_))
        ));
    }

    struct DeviceTrust(PublicKey);

    impl TrustVerifier for DeviceTrust {
        fn verify_path(&self, path: &[Certificate]) -> JcsResult<PublicKey> {
            if path.first().map(Certificate::as_der) == Some(b"device".as_slice()) {
                Ok(self.0.clone())
            } else {
                Err(ErrorCode::E306_UntrustedCertificate("unknown device".into()))
            }
        }
    }

    #[test]
    fn test_device_certificate_attestation() {
        let device = PrivateKey::generate_ec(&mut OsRng);
        let mut crypto = SoftwareServerCrypto::new()
            .with_trust_verifier(Box::new(DeviceTrust(device.public_key())));
        crypto.generate_ephemeral_key().unwrap();
        let client = p256::SecretKey::random(&mut OsRng);
        let signature = sign_asymmetric(SignatureAlgorithm::Es256, &device, b"args").unwrap();
        let path = [Certificate(b"device".to_vec())];
        crypto
            .generate_and_verify_session_key(
                &client.public_key(),
                b"kdf",
                b"args",
                Some(&path),
                &signature,
            )
            .unwrap();

        let forged = [Certificate(b"other".to_vec())];
        assert!(matches!(
            crypto.generate_and_verify_session_key(
                &client.public_key(),
                b"kdf",
                b"args",
                Some(&forged),
                &signature,
            ),
            Err(ErrorCode::E306_UntrustedCertificate(_))
        ));
    }
}
