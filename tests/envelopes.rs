//! Signature and encryption envelope integration tests.
//!
//! Documents are signed or encrypted, written in a human-readable format,
//! parsed back and only then verified or decrypted, the way they travel
//! between independent parties.

use jcs_keygen::crypto::{
    Certificate, ContentEncryptionAlgorithm, KeyEncryptionAlgorithm, PrivateKey, PublicKey,
    SignatureAlgorithm,
};
use jcs_keygen::envelope::{
    encrypt, encrypt_symmetric, is_signed, sign, sign_multiple, verify, verify_multiple,
    DecryptionKey, EncryptedData, HmacKey, KeyIdPolicy, KeyReference, Recipient, Signer,
    TrustVerifier, Verifier, VerifierOptions,
};
use jcs_keygen::JcsResult;
use jcs_keygen::json::{parse_object, serialize_object, JsonObject, JsonValue, OutputFormat};
use jcs_keygen::ErrorCode;
use rand_core::OsRng;

fn rsa_key() -> PrivateKey {
    PrivateKey::from_pkcs8_pem(include_str!("data/rsa2048-private.pem")).unwrap()
}

fn other_rsa_key() -> PrivateKey {
    PrivateKey::from_pkcs8_pem(include_str!("data/rsa2048-other.pem")).unwrap()
}

fn payment() -> JsonObject {
    parse_object(
        br#"{
            "payee": "Demo Merchant",
            "amount": "235.50",
            "currency": "USD",
            "items": [{"sku": "A-1", "qty": 2}, {"sku": "B-7", "qty": 1}],
            "timeStamp": "2019-02-03T10:15:30Z"
        }"#,
    )
    .unwrap()
}

/// Write `object` in `format` and parse it back.
fn transmit(object: &JsonObject, format: OutputFormat) -> JsonObject {
    let text = serialize_object(object, format).unwrap();
    parse_object(text.as_bytes()).unwrap()
}

fn tamper(object: &mut JsonObject, name: &str, value: &str) {
    object.set(name, JsonValue::String(value.to_string()));
}

// ============================================================================
// Signatures
// ============================================================================

#[test]
fn es256_signature_survives_pretty_printing() {
    let private = PrivateKey::generate_ec(&mut OsRng);
    let public = private.public_key();
    let signer = Signer::asymmetric(SignatureAlgorithm::Es256, private)
        .unwrap()
        .with_public_key()
        .unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();
    assert!(is_signed(&document));

    let received = transmit(&document, OutputFormat::Pretty);
    let options = VerifierOptions::new();
    let block = verify(&received, &Verifier::FromSignature, &options).unwrap();
    assert_eq!(block.algorithm, SignatureAlgorithm::Es256);
    verify(&received, &Verifier::PublicKey(&public), &options).unwrap();
}

#[test]
fn rs256_signature_with_key_id() {
    let private = rsa_key();
    let public = private.public_key();
    let signer = Signer::asymmetric(SignatureAlgorithm::Rs256, private)
        .unwrap()
        .with_key_id("merchant-2019");
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let received = transmit(&document, OutputFormat::Pretty);
    let options = VerifierOptions::new().with_key_id_policy(KeyIdPolicy::Required);
    let block = verify(&received, &Verifier::PublicKey(&public), &options).unwrap();
    assert_eq!(block.key_id.as_deref(), Some("merchant-2019"));

    let forbidding = VerifierOptions::new().with_key_id_policy(KeyIdPolicy::Forbidden);
    assert!(matches!(
        verify(&received, &Verifier::PublicKey(&public), &forbidding),
        Err(ErrorCode::E302_KeyMismatch(_))
    ));
}

#[test]
fn hs256_signature_requires_same_secret() {
    let signer = Signer::symmetric(SignatureAlgorithm::Hs256, b"shared-secret".to_vec()).unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let received = transmit(&document, OutputFormat::Normalized);
    let options = VerifierOptions::new();
    let right = HmacKey(b"shared-secret".to_vec());
    let wrong = HmacKey(b"other-secret".to_vec());
    verify(&received, &Verifier::Symmetric(&right), &options).unwrap();
    assert_eq!(
        verify(&received, &Verifier::Symmetric(&wrong), &options),
        Err(ErrorCode::E300_SignatureInvalid)
    );
}

#[test]
fn tampered_document_rejected() {
    let signer = Signer::asymmetric(SignatureAlgorithm::Es256, PrivateKey::generate_ec(&mut OsRng))
        .unwrap()
        .with_public_key()
        .unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let mut received = transmit(&document, OutputFormat::Pretty);
    tamper(&mut received, "amount", "1235.50");
    let result = verify(&received, &Verifier::FromSignature, &VerifierOptions::new());
    assert_eq!(result.unwrap_err().name(), "E300_SignatureInvalid");
}

#[test]
fn reordered_document_rejected() {
    let signer = Signer::symmetric(SignatureAlgorithm::Hs512, vec![7u8; 64]).unwrap();
    let mut document = parse_object(br#"{"a":1,"b":2}"#).unwrap();
    sign(&mut document, &signer).unwrap();

    let block = document.get("signature").cloned().unwrap();
    let mut reordered = parse_object(br#"{"b":2,"a":1}"#).unwrap();
    reordered.set("signature", block);

    let key = HmacKey(vec![7u8; 64]);
    assert_eq!(
        verify(&reordered, &Verifier::Symmetric(&key), &VerifierOptions::new()),
        Err(ErrorCode::E300_SignatureInvalid)
    );
}

#[test]
fn excluded_property_may_change_in_transit() {
    let signer = Signer::asymmetric(SignatureAlgorithm::Es256, PrivateKey::generate_ec(&mut OsRng))
        .unwrap()
        .with_public_key()
        .unwrap()
        .with_excluded(&["timeStamp"]);
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let mut received = transmit(&document, OutputFormat::Pretty);
    tamper(&mut received, "timeStamp", "2020-01-01T00:00:00Z");
    verify(&received, &Verifier::FromSignature, &VerifierOptions::new()).unwrap();

    tamper(&mut received, "currency", "EUR");
    assert_eq!(
        verify(&received, &Verifier::FromSignature, &VerifierOptions::new()),
        Err(ErrorCode::E300_SignatureInvalid)
    );
}

#[test]
fn critical_extension_must_be_permitted() {
    let signer = Signer::symmetric(SignatureAlgorithm::Hs256, b"k".to_vec())
        .unwrap()
        .with_extension("purpose", JsonValue::from("payment"));
    let mut document = payment();
    sign(&mut document, &signer).unwrap();
    let received = transmit(&document, OutputFormat::Pretty);
    let key = HmacKey(b"k".to_vec());

    assert!(matches!(
        verify(&received, &Verifier::Symmetric(&key), &VerifierOptions::new()),
        Err(ErrorCode::E305_CriticalExtension(name)) if name == "purpose"
    ));
    let permitted = ["purpose"];
    let options = VerifierOptions::new().with_permitted_extensions(&permitted);
    verify(&received, &Verifier::Symmetric(&key), &options).unwrap();
}

#[test]
fn public_key_verifier_rejects_other_embedded_key() {
    let signer = Signer::asymmetric(SignatureAlgorithm::Es256, PrivateKey::generate_ec(&mut OsRng))
        .unwrap()
        .with_public_key()
        .unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let expected = PrivateKey::generate_ec(&mut OsRng).public_key();
    assert!(matches!(
        verify(&document, &Verifier::PublicKey(&expected), &VerifierOptions::new()),
        Err(ErrorCode::E302_KeyMismatch(_))
    ));
}

/// Trusts exactly one certificate and maps it to a fixed key.
struct SingleAnchor {
    certificate: Certificate,
    key: PublicKey,
}

impl TrustVerifier for SingleAnchor {
    fn verify_path(&self, path: &[Certificate]) -> JcsResult<PublicKey> {
        match path.first() {
            Some(leaf) if *leaf == self.certificate => Ok(self.key.clone()),
            _ => Err(ErrorCode::E306_UntrustedCertificate("unknown leaf".into())),
        }
    }
}

#[test]
fn public_key_verifier_checks_certificate_path() {
    let private = PrivateKey::generate_ec(&mut OsRng);
    let public = private.public_key();
    let leaf = Certificate(b"merchant leaf".to_vec());
    let signer = Signer::asymmetric(SignatureAlgorithm::Es256, private)
        .unwrap()
        .with_key_reference(KeyReference::CertificatePath(vec![leaf.clone()]));
    let mut document = payment();
    sign(&mut document, &signer).unwrap();
    let received = transmit(&document, OutputFormat::Pretty);

    let anchor = SingleAnchor {
        certificate: leaf.clone(),
        key: public.clone(),
    };
    let options = VerifierOptions::new().with_trust_verifier(&anchor);
    let block = verify(&received, &Verifier::PublicKey(&public), &options).unwrap();
    assert_eq!(block.key, KeyReference::CertificatePath(vec![leaf.clone()]));

    // The path cannot be checked without a trust verifier.
    assert!(matches!(
        verify(&received, &Verifier::PublicKey(&public), &VerifierOptions::new()),
        Err(ErrorCode::E302_KeyMismatch(_))
    ));

    // The path is trusted but belongs to a different key.
    let impostor = SingleAnchor {
        certificate: leaf,
        key: PrivateKey::generate_ec(&mut OsRng).public_key(),
    };
    let options = VerifierOptions::new().with_trust_verifier(&impostor);
    assert!(matches!(
        verify(&received, &Verifier::PublicKey(&public), &options),
        Err(ErrorCode::E302_KeyMismatch(_))
    ));
}

#[test]
fn rsa_signature_with_other_key_rejected() {
    let signer = Signer::asymmetric(SignatureAlgorithm::Rs384, rsa_key()).unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let other = other_rsa_key().public_key();
    assert_eq!(
        verify(&document, &Verifier::PublicKey(&other), &VerifierOptions::new()),
        Err(ErrorCode::E300_SignatureInvalid)
    );
}

#[test]
fn multiple_signatures_with_mixed_algorithms() {
    let ec = PrivateKey::generate_ec(&mut OsRng);
    let ec_public = ec.public_key();
    let rsa = rsa_key();
    let rsa_public = rsa.public_key();
    let signers = [
        Signer::asymmetric(SignatureAlgorithm::Es256, ec).unwrap(),
        Signer::asymmetric(SignatureAlgorithm::Rs512, rsa).unwrap(),
        Signer::symmetric(SignatureAlgorithm::Hs384, b"third".to_vec()).unwrap(),
    ];
    let mut document = payment();
    sign_multiple(&mut document, &signers).unwrap();

    let received = transmit(&document, OutputFormat::Pretty);
    let hmac = HmacKey(b"third".to_vec());
    let verifiers = [
        Verifier::PublicKey(&ec_public),
        Verifier::PublicKey(&rsa_public),
        Verifier::Symmetric(&hmac),
    ];
    let blocks = verify_multiple(&received, &verifiers, &VerifierOptions::new()).unwrap();
    let algorithms: Vec<SignatureAlgorithm> = blocks.iter().map(|b| b.algorithm).collect();
    assert_eq!(
        algorithms,
        vec![
            SignatureAlgorithm::Es256,
            SignatureAlgorithm::Rs512,
            SignatureAlgorithm::Hs384
        ]
    );

    // Verifiers in the wrong order fail on the first block.
    let swapped = [
        Verifier::PublicKey(&rsa_public),
        Verifier::PublicKey(&ec_public),
        Verifier::Symmetric(&hmac),
    ];
    assert!(verify_multiple(&received, &swapped, &VerifierOptions::new()).is_err());
}

#[test]
fn minimum_digest_rejects_weak_algorithm() {
    let signer = Signer::symmetric(SignatureAlgorithm::Hs256, b"k".to_vec()).unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();
    let key = HmacKey(b"k".to_vec());
    let options = VerifierOptions::new().with_minimum_digest_bits(384);
    assert!(matches!(
        verify(&document, &Verifier::Symmetric(&key), &options),
        Err(ErrorCode::E301_SignatureAlgorithmMismatch(_))
    ));
}

// ============================================================================
// Encryption
// ============================================================================

#[test]
fn every_algorithm_pair_decrypts_after_transmission() {
    let ec = PrivateKey::generate_ec(&mut OsRng);
    let rsa = rsa_key();
    for key_algorithm in KeyEncryptionAlgorithm::ALL {
        let private = if key_algorithm.is_rsa() {
            rsa.clone()
        } else {
            ec.clone()
        };
        for content_algorithm in ContentEncryptionAlgorithm::ALL {
            let recipient = Recipient::new(key_algorithm, private.public_key()).unwrap();
            let envelope = encrypt(&payment(), content_algorithm, &[recipient], &mut OsRng).unwrap();

            let received = transmit(&envelope, OutputFormat::Pretty);
            let decoded = EncryptedData::decode(&received).unwrap();
            assert_eq!(decoded.content_algorithm, content_algorithm);
            let key = DecryptionKey::new(private.clone(), key_algorithm);
            assert_eq!(
                decoded.decrypt(&[key]).unwrap(),
                payment(),
                "{} / {}",
                key_algorithm.name(),
                content_algorithm.name()
            );
        }
    }
}

#[test]
fn unrelated_rsa_key_finds_no_recipient() {
    let recipient =
        Recipient::new(KeyEncryptionAlgorithm::RsaOaep256, rsa_key().public_key()).unwrap();
    let envelope = encrypt(
        &payment(),
        ContentEncryptionAlgorithm::A256Gcm,
        &[recipient],
        &mut OsRng,
    )
    .unwrap();
    let decoded = EncryptedData::decode(&envelope).unwrap();
    let key = DecryptionKey::new(other_rsa_key(), KeyEncryptionAlgorithm::RsaOaep256);
    assert_eq!(decoded.decrypt(&[key]).unwrap_err().code(), 401);
}

#[test]
fn modified_cipher_text_rejected() {
    let private = PrivateKey::generate_ec(&mut OsRng);
    let recipient =
        Recipient::new(KeyEncryptionAlgorithm::EcdhEsA256Kw, private.public_key()).unwrap();
    let envelope = encrypt(
        &payment(),
        ContentEncryptionAlgorithm::A128CbcHs256,
        &[recipient],
        &mut OsRng,
    )
    .unwrap();

    let mut decoded = EncryptedData::decode(&envelope).unwrap();
    if let Some(first) = decoded.cipher_text.first_mut() {
        *first ^= 0x01;
    }
    let key = DecryptionKey::new(private, KeyEncryptionAlgorithm::EcdhEsA256Kw);
    assert_eq!(decoded.decrypt(&[key]), Err(ErrorCode::E400_DecryptionFailed));
}

#[test]
fn shared_key_envelope_round_trip() {
    let content_key = [0x42u8; 16];
    let envelope = encrypt_symmetric(
        &payment(),
        ContentEncryptionAlgorithm::A128Gcm,
        &content_key,
        Some("session-key"),
        &mut OsRng,
    )
    .unwrap();
    let received = transmit(&envelope, OutputFormat::Pretty);
    let decoded = EncryptedData::decode(&received).unwrap();
    assert!(decoded.is_shared_key());
    assert_eq!(decoded.decrypt_with_shared_key(&content_key).unwrap(), payment());
    assert!(decoded.decrypt_with_shared_key(&[0x43u8; 16]).is_err());
}

#[test]
fn multiple_recipients_each_decrypt() {
    let first = PrivateKey::generate_ec(&mut OsRng);
    let second = rsa_key();
    let recipients = [
        Recipient::new(KeyEncryptionAlgorithm::EcdhEsA128Kw, first.public_key())
            .unwrap()
            .with_key_id("first"),
        Recipient::new(KeyEncryptionAlgorithm::RsaOaep, second.public_key()).unwrap(),
    ];
    let envelope = encrypt(
        &payment(),
        ContentEncryptionAlgorithm::A256CbcHs512,
        &recipients,
        &mut OsRng,
    )
    .unwrap();
    let decoded = EncryptedData::decode(&transmit(&envelope, OutputFormat::Pretty)).unwrap();
    assert_eq!(decoded.recipients.len(), 2);
    assert_eq!(decoded.recipients[0].key_id.as_deref(), Some("first"));

    let keys = [DecryptionKey::new(second, KeyEncryptionAlgorithm::RsaOaep)];
    assert_eq!(decoded.decrypt(&keys).unwrap(), payment());
    let keys = [DecryptionKey::new(first, KeyEncryptionAlgorithm::EcdhEsA128Kw)];
    assert_eq!(decoded.decrypt(&keys).unwrap(), payment());
}

// ============================================================================
// Nesting
// ============================================================================

#[test]
fn signed_document_inside_encryption() {
    let signing = PrivateKey::generate_ec(&mut OsRng);
    let signer = Signer::asymmetric(SignatureAlgorithm::Es256, signing)
        .unwrap()
        .with_public_key()
        .unwrap();
    let mut document = payment();
    sign(&mut document, &signer).unwrap();

    let encryption = PrivateKey::generate_ec(&mut OsRng);
    let recipient =
        Recipient::new(KeyEncryptionAlgorithm::EcdhEs, encryption.public_key()).unwrap();
    let envelope = encrypt(
        &document,
        ContentEncryptionAlgorithm::A256Gcm,
        &[recipient],
        &mut OsRng,
    )
    .unwrap();

    let decoded = EncryptedData::decode(&transmit(&envelope, OutputFormat::Pretty)).unwrap();
    let key = DecryptionKey::new(encryption, KeyEncryptionAlgorithm::EcdhEs);
    let plaintext = decoded.decrypt(&[key]).unwrap();
    assert_eq!(plaintext, document);
    verify(&plaintext, &Verifier::FromSignature, &VerifierOptions::new()).unwrap();
}

#[test]
fn signed_encryption_envelope() {
    let recipient_key = PrivateKey::generate_ec(&mut OsRng);
    let recipient =
        Recipient::new(KeyEncryptionAlgorithm::EcdhEsA128Kw, recipient_key.public_key()).unwrap();
    let mut envelope = encrypt(
        &payment(),
        ContentEncryptionAlgorithm::A128Gcm,
        &[recipient],
        &mut OsRng,
    )
    .unwrap();
    let signer = Signer::symmetric(SignatureAlgorithm::Hs256, b"outer".to_vec()).unwrap();
    sign(&mut envelope, &signer).unwrap();

    let received = transmit(&envelope, OutputFormat::Pretty);
    verify(
        &received,
        &Verifier::Symmetric(&HmacKey(b"outer".to_vec())),
        &VerifierOptions::new(),
    )
    .unwrap();
    let key = DecryptionKey::new(recipient_key, KeyEncryptionAlgorithm::EcdhEsA128Kw);
    assert_eq!(
        EncryptedData::decode(&received).unwrap().decrypt(&[key]).unwrap(),
        payment()
    );
}
