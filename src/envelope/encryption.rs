//! Encrypted JSON envelopes.
//!
//! ```text
//! {
//!   "encryptedData": {
//!     "alg": "A128CBC-HS256",
//!     "encryptedKey": {...}        one recipient
//!     "recipients": [{...}, ...]   or several
//!     "iv": "...", "tag": "...", "cipherText": "..."
//!   }
//! }
//! ```
//!
//! A recipient carries `alg`, an optional `kid`, and per algorithm family:
//! RSA puts the recipient key in `jwk` and the wrapped content key in
//! `cipherText`; ECDH-ES puts the recipient key in `staticKey` and the
//! sender's ephemeral key in `ephemeralKey`, plus `cipherText` for the AES-KW
//! variants. The authenticated data is the NORMALIZED recipient metadata, so
//! any change to it breaks decryption. Shared-key envelopes have no recipient
//! metadata and authenticate the content algorithm name instead.

use rand_core::CryptoRngCore;
use tracing::debug;

use super::{
    ALGORITHM_JSON, CIPHER_TEXT_JSON, ENCRYPTED_DATA_JSON, ENCRYPTED_KEY_JSON, EPHEMERAL_KEY_JSON,
    IV_JSON, JWK_JSON, KEY_ID_JSON, RECIPIENTS_JSON, STATIC_KEY_JSON, TAG_JSON,
};
use crate::crypto::content::{decrypt_content, encrypt_content, generate_content_key};
use crate::crypto::key_encryption::{
    aes_key_unwrap, aes_key_wrap, receiver_key_agreement, rsa_decrypt_key, rsa_encrypt_key,
    sender_key_agreement,
};
use crate::crypto::{ContentEncryptionAlgorithm, KeyEncryptionAlgorithm, PrivateKey, PublicKey};
use crate::error::{ErrorCode, JcsResult};
use crate::json::{
    normalize, normalize_object, parse_object, JsonObject, JsonValue, ObjectWriter,
};

/// An encryption target.
#[derive(Debug, Clone)]
pub struct Recipient {
    algorithm: KeyEncryptionAlgorithm,
    public_key: PublicKey,
    key_id: Option<String>,
    include_public_key: bool,
}

impl Recipient {
    /// Recipient identified by its public key. RSA-OAEP needs an RSA key,
    /// the ECDH-ES family a P-256 key.
    pub fn new(algorithm: KeyEncryptionAlgorithm, public_key: PublicKey) -> JcsResult<Self> {
        let fits = match &public_key {
            PublicKey::Rsa(_) => algorithm.is_rsa(),
            PublicKey::Ec(_) => !algorithm.is_rsa(),
        };
        if !fits {
            return Err(ErrorCode::E308_InvalidKey(format!(
                "{} key cannot be used with {algorithm}",
                public_key.key_type()
            )));
        }
        Ok(Self {
            algorithm,
            public_key,
            key_id: None,
            include_public_key: true,
        })
    }

    /// Add a `kid`.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Leave the recipient key out of the envelope.
    pub fn without_public_key(mut self) -> Self {
        self.include_public_key = false;
        self
    }

    fn encode(
        &self,
        content_algorithm: ContentEncryptionAlgorithm,
        content_key: Option<&[u8]>,
        rng: &mut impl CryptoRngCore,
    ) -> JcsResult<(JsonObject, Option<Vec<u8>>)> {
        let mut writer = ObjectWriter::new().set_string(ALGORITHM_JSON, self.algorithm.name())?;
        if let Some(kid) = &self.key_id {
            writer = writer.set_string(KEY_ID_JSON, kid.as_str())?;
        }

        if self.algorithm.is_rsa() {
            let content_key = content_key.ok_or_else(|| {
                ErrorCode::E309_CryptoFailure("content key missing for RSA recipient".into())
            })?;
            if self.include_public_key {
                writer = writer.set_object(JWK_JSON, self.public_key.to_jwk()?)?;
            }
            let encrypted = rsa_encrypt_key(
                self.algorithm,
                content_key,
                self.public_key.as_rsa()?,
                rng,
            )?;
            return Ok((writer.set_binary(CIPHER_TEXT_JSON, &encrypted)?.build(), None));
        }

        let agreement = sender_key_agreement(
            self.algorithm,
            content_algorithm,
            self.public_key.as_ec()?,
            rng,
        )?;
        if self.include_public_key {
            writer = writer.set_object(STATIC_KEY_JSON, self.public_key.to_jwk()?)?;
        }
        writer = writer.set_object(
            EPHEMERAL_KEY_JSON,
            PublicKey::Ec(agreement.ephemeral_key).to_jwk()?,
        )?;
        match content_key {
            Some(content_key) if self.algorithm.is_key_wrap() => {
                let wrapped = aes_key_wrap(&agreement.derived_key, content_key)?;
                Ok((writer.set_binary(CIPHER_TEXT_JSON, &wrapped)?.build(), None))
            }
            None if !self.algorithm.is_key_wrap() => {
                Ok((writer.build(), Some(agreement.derived_key)))
            }
            _ => Err(ErrorCode::E309_CryptoFailure(
                "inconsistent key agreement mode".into(),
            )),
        }
    }
}

fn finish(
    content_algorithm: ContentEncryptionAlgorithm,
    content_key: &[u8],
    plaintext: &JsonObject,
    aad: &[u8],
    mut writer: ObjectWriter,
    rng: &mut impl CryptoRngCore,
) -> JcsResult<JsonObject> {
    let result = encrypt_content(
        content_algorithm,
        content_key,
        &normalize_object(plaintext)?,
        aad,
        rng,
    )?;
    writer = writer
        .set_binary(IV_JSON, &result.iv)?
        .set_binary(TAG_JSON, &result.tag)?
        .set_binary(CIPHER_TEXT_JSON, &result.cipher_text)?;
    ObjectWriter::new()
        .set_object(ENCRYPTED_DATA_JSON, writer)
        .map(ObjectWriter::build)
}

/// Encrypt `plaintext` for one or more recipients.
///
/// A single recipient is written as `encryptedKey`, several as
/// `recipients`. Direct `ECDH-ES` only works with exactly one recipient.
pub fn encrypt(
    plaintext: &JsonObject,
    content_algorithm: ContentEncryptionAlgorithm,
    recipients: &[Recipient],
    rng: &mut impl CryptoRngCore,
) -> JcsResult<JsonObject> {
    if recipients.is_empty() {
        return Err(ErrorCode::E208_InvalidValue(
            RECIPIENTS_JSON.to_string(),
            "no recipients".to_string(),
        ));
    }
    let direct = recipients
        .iter()
        .any(|r| r.algorithm == KeyEncryptionAlgorithm::EcdhEs);
    if direct && recipients.len() > 1 {
        return Err(ErrorCode::E402_UnsupportedForMultipleRecipients(
            KeyEncryptionAlgorithm::EcdhEs.to_string(),
        ));
    }

    let mut encoded = Vec::with_capacity(recipients.len());
    let content_key = if direct {
        let (block, derived) = recipients[0].encode(content_algorithm, None, rng)?;
        encoded.push(block);
        derived.ok_or_else(|| ErrorCode::E309_CryptoFailure("no derived key".into()))?
    } else {
        let content_key = generate_content_key(content_algorithm, rng);
        for recipient in recipients {
            let (block, _) = recipient.encode(content_algorithm, Some(&content_key), rng)?;
            encoded.push(block);
        }
        content_key
    };

    let writer = ObjectWriter::new().set_string(ALGORITHM_JSON, content_algorithm.name())?;
    let (writer, aad) = if encoded.len() == 1 {
        let block = encoded.remove(0);
        let aad = normalize_object(&block)?;
        (writer.set_object(ENCRYPTED_KEY_JSON, block)?, aad)
    } else {
        let array = JsonValue::Array(encoded.into_iter().map(JsonValue::Object).collect());
        let aad = normalize(&array)?;
        (writer.set_value(RECIPIENTS_JSON, array)?, aad)
    };

    debug!(
        content_algorithm = %content_algorithm,
        recipients = recipients.len(),
        "encrypting"
    );
    finish(content_algorithm, &content_key, plaintext, &aad, writer, rng)
}

/// Encrypt `plaintext` under a shared content key.
pub fn encrypt_symmetric(
    plaintext: &JsonObject,
    content_algorithm: ContentEncryptionAlgorithm,
    content_key: &[u8],
    key_id: Option<&str>,
    rng: &mut impl CryptoRngCore,
) -> JcsResult<JsonObject> {
    let writer = ObjectWriter::new()
        .set_string(ALGORITHM_JSON, content_algorithm.name())?
        .set_string_conditional(KEY_ID_JSON, key_id)?;
    debug!(content_algorithm = %content_algorithm, "encrypting with shared key");
    finish(
        content_algorithm,
        content_key,
        plaintext,
        content_algorithm.name().as_bytes(),
        writer,
        rng,
    )
}

/// A private key offered for decryption.
#[derive(Debug, Clone)]
pub struct DecryptionKey {
    private_key: PrivateKey,
    public_key: PublicKey,
    algorithm: KeyEncryptionAlgorithm,
    key_id: Option<String>,
}

impl DecryptionKey {
    /// Key usable with `algorithm`.
    pub fn new(private_key: PrivateKey, algorithm: KeyEncryptionAlgorithm) -> Self {
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
            algorithm,
            key_id: None,
        }
    }

    /// Match recipients by this `kid` when they carry no public key.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// The matching public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// Decoded recipient metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientInfo {
    /// Key encryption algorithm
    pub algorithm: KeyEncryptionAlgorithm,
    /// Optional key id
    pub key_id: Option<String>,
    /// Recipient public key (`jwk` or `staticKey`)
    pub public_key: Option<PublicKey>,
    /// Sender ephemeral key (ECDH-ES family)
    pub ephemeral_key: Option<p256::PublicKey>,
    /// Wrapped content key (RSA and AES-KW)
    pub encrypted_key: Option<Vec<u8>>,
}

impl RecipientInfo {
    fn decode(object: &JsonObject) -> JcsResult<Self> {
        let algorithm = KeyEncryptionAlgorithm::from_name(object.get_string(ALGORITHM_JSON)?)?;
        let key_id = object.get_string_conditional(KEY_ID_JSON)?.map(str::to_string);
        let (public_key, ephemeral_key) = if algorithm.is_rsa() {
            object.expect_only(&[ALGORITHM_JSON, KEY_ID_JSON, JWK_JSON, CIPHER_TEXT_JSON])?;
            let public_key = match object.get_object_conditional(JWK_JSON)? {
                Some(jwk) => Some(PublicKey::from_jwk(jwk)?),
                None => None,
            };
            (public_key, None)
        } else {
            object.expect_only(&[
                ALGORITHM_JSON,
                KEY_ID_JSON,
                STATIC_KEY_JSON,
                EPHEMERAL_KEY_JSON,
                CIPHER_TEXT_JSON,
            ])?;
            let public_key = match object.get_object_conditional(STATIC_KEY_JSON)? {
                Some(jwk) => Some(PublicKey::from_jwk(jwk)?),
                None => None,
            };
            let ephemeral = PublicKey::from_jwk(object.get_object(EPHEMERAL_KEY_JSON)?)?;
            (public_key, Some(*ephemeral.as_ec()?))
        };
        let encrypted_key = if algorithm.is_key_wrap() {
            Some(object.get_binary(CIPHER_TEXT_JSON)?)
        } else {
            if object.contains(CIPHER_TEXT_JSON) {
                return Err(ErrorCode::E207_UnexpectedProperty(CIPHER_TEXT_JSON.to_string()));
            }
            None
        };
        Ok(Self {
            algorithm,
            key_id,
            public_key,
            ephemeral_key,
            encrypted_key,
        })
    }

    fn matches(&self, key: &DecryptionKey) -> bool {
        match (&self.public_key, &self.key_id) {
            (Some(public_key), _) => *public_key == key.public_key,
            (None, Some(kid)) => key.key_id.as_deref() == Some(kid.as_str()),
            (None, None) => true,
        }
    }

    fn recover_content_key(
        &self,
        content_algorithm: ContentEncryptionAlgorithm,
        key: &DecryptionKey,
    ) -> JcsResult<Vec<u8>> {
        let missing = |what: &str| ErrorCode::E203_MissingProperty(what.to_string());
        match (&key.private_key, self.algorithm.is_rsa()) {
            (PrivateKey::Rsa(private), true) => {
                let encrypted = self
                    .encrypted_key
                    .as_ref()
                    .ok_or_else(|| missing(CIPHER_TEXT_JSON))?;
                rsa_decrypt_key(self.algorithm, encrypted, private)
            }
            (PrivateKey::Ec(private), false) => {
                let ephemeral = self
                    .ephemeral_key
                    .as_ref()
                    .ok_or_else(|| missing(EPHEMERAL_KEY_JSON))?;
                let derived =
                    receiver_key_agreement(self.algorithm, content_algorithm, ephemeral, private)?;
                match &self.encrypted_key {
                    Some(wrapped) => aes_key_unwrap(&derived, wrapped),
                    None => Ok(derived),
                }
            }
            _ => Err(ErrorCode::E308_InvalidKey(format!(
                "{} key cannot be used with {}",
                key.public_key.key_type(),
                self.algorithm
            ))),
        }
    }
}

/// A decoded encryption envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    /// Content encryption algorithm
    pub content_algorithm: ContentEncryptionAlgorithm,
    /// Key id of a shared-key envelope
    pub key_id: Option<String>,
    /// Recipients; empty for shared-key envelopes
    pub recipients: Vec<RecipientInfo>,
    /// Initialization vector
    pub iv: Vec<u8>,
    /// Authentication tag
    pub tag: Vec<u8>,
    /// Encrypted content
    pub cipher_text: Vec<u8>,
    authenticated_data: Vec<u8>,
}

impl EncryptedData {
    /// Decode an object holding an `encryptedData` property.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        let data = object.get_object(ENCRYPTED_DATA_JSON)?;
        data.expect_only(&[
            ALGORITHM_JSON,
            KEY_ID_JSON,
            ENCRYPTED_KEY_JSON,
            RECIPIENTS_JSON,
            IV_JSON,
            TAG_JSON,
            CIPHER_TEXT_JSON,
        ])?;
        let content_algorithm =
            ContentEncryptionAlgorithm::from_name(data.get_string(ALGORITHM_JSON)?)?;

        if data.contains(ENCRYPTED_KEY_JSON) && data.contains(RECIPIENTS_JSON) {
            return Err(ErrorCode::E207_UnexpectedProperty(RECIPIENTS_JSON.to_string()));
        }
        let (recipients, authenticated_data) =
            if let Some(single) = data.get_object_conditional(ENCRYPTED_KEY_JSON)? {
                (vec![RecipientInfo::decode(single)?], normalize_object(single)?)
            } else if data.contains(RECIPIENTS_JSON) {
                let objects = data.get_object_array(RECIPIENTS_JSON)?;
                if objects.is_empty() {
                    return Err(ErrorCode::E208_InvalidValue(
                        RECIPIENTS_JSON.to_string(),
                        "empty".to_string(),
                    ));
                }
                let recipients = objects
                    .iter()
                    .map(|o| RecipientInfo::decode(o))
                    .collect::<JcsResult<Vec<_>>>()?;
                if recipients.len() > 1
                    && recipients
                        .iter()
                        .any(|r| r.algorithm == KeyEncryptionAlgorithm::EcdhEs)
                {
                    return Err(ErrorCode::E402_UnsupportedForMultipleRecipients(
                        KeyEncryptionAlgorithm::EcdhEs.to_string(),
                    ));
                }
                let array = data.get_property(RECIPIENTS_JSON)?;
                (recipients, normalize(array)?)
            } else {
                (Vec::new(), content_algorithm.name().as_bytes().to_vec())
            };

        let key_id = data.get_string_conditional(KEY_ID_JSON)?.map(str::to_string);
        if key_id.is_some() && !recipients.is_empty() {
            return Err(ErrorCode::E207_UnexpectedProperty(KEY_ID_JSON.to_string()));
        }

        Ok(Self {
            content_algorithm,
            key_id,
            recipients,
            iv: data.get_binary(IV_JSON)?,
            tag: data.get_binary(TAG_JSON)?,
            cipher_text: data.get_binary(CIPHER_TEXT_JSON)?,
            authenticated_data,
        })
    }

    /// True for envelopes without recipient metadata.
    pub fn is_shared_key(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Decrypt with the first matching candidate key.
    ///
    /// Recipients are matched by public key, by `kid` when they carry no
    /// key, and otherwise accept any candidate. The candidate's algorithm
    /// must then equal the recipient's.
    pub fn decrypt(&self, keys: &[DecryptionKey]) -> JcsResult<JsonObject> {
        let mut key_found = false;
        for recipient in &self.recipients {
            for key in keys.iter().filter(|k| recipient.matches(k)) {
                key_found = true;
                if key.algorithm != recipient.algorithm {
                    continue;
                }
                let content_key = recipient.recover_content_key(self.content_algorithm, key)?;
                debug!(
                    key_algorithm = %recipient.algorithm,
                    content_algorithm = %self.content_algorithm,
                    "decrypting"
                );
                return self.decrypt_with_shared_key(&content_key);
            }
        }
        Err(ErrorCode::E401_NoMatchingKey(if key_found {
            "no matching key+algorithm found".to_string()
        } else {
            "no matching key found".to_string()
        }))
    }

    /// Decrypt with a known content key.
    pub fn decrypt_with_shared_key(&self, content_key: &[u8]) -> JcsResult<JsonObject> {
        let plaintext = decrypt_content(
            self.content_algorithm,
            content_key,
            &self.cipher_text,
            &self.iv,
            &self.authenticated_data,
            &self.tag,
        )?;
        parse_object(&plaintext)
    }
}
