//! Device side of a KeyGen2 session for integration tests.
//!
//! The simulator answers each issuer request the way a key store would:
//! ECDH session key, sequenced MACs, key attestations and the closing
//! attestation. It only uses public crate APIs plus wire names, so any
//! drift between the issuer's transcripts and the documented format shows
//! up as a failed `update`.

#![allow(dead_code)]

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes256;
use chrono::{SubsecRound, Utc};
use jcs_keygen::crypto::signing::{hmac_sha256, sign_asymmetric, verify_asymmetric};
use jcs_keygen::crypto::{Certificate, PrivateKey, PublicKey, SignatureAlgorithm};
use jcs_keygen::envelope::{sign, Signer};
use jcs_keygen::json::{JsonObject, JsonValue, ObjectWriter};
use jcs_keygen::provisioning::constants::{
    ALGORITHM_SESSION_ATTEST_1, KDF_ANONYMOUS, KDF_DEVICE_ATTESTATION, KDF_ENCRYPTION_KEY,
    KDF_EXTERNAL_SIGNATURE, KEYGEN2_NS,
};
use jcs_keygen::provisioning::{Extension, KeyAlgorithm, Transcript};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

/// Options for the initialization response.
#[derive(Default)]
pub struct InitOptions {
    /// Client session id; a fixed valid id when absent
    pub client_session_id: Option<String>,
    /// Server certificate to fingerprint
    pub server_certificate: Option<Certificate>,
    /// Device certificate path and the key signing the attestation
    pub device: Option<(Vec<Certificate>, PrivateKey)>,
    /// Flip a bit of the session attestation
    pub corrupt_attestation: bool,
    /// Flip a bit of the HMAC signature value
    pub corrupt_signature: bool,
}

/// A key the device generated.
pub struct DeviceKey {
    pub id: String,
    pub private_key: PrivateKey,
}

pub struct DeviceSimulator {
    session_key: Option<Vec<u8>>,
    counter: u16,
    client_session_id: String,
    server_session_id: String,
    issuer_uri: String,
    pub keys: Vec<DeviceKey>,
    pub imported_symmetric_keys: Vec<(String, Vec<u8>)>,
    pub decrypted_extensions: Vec<(String, Vec<u8>)>,
    pub decrypted_pins: Vec<(String, Vec<u8>)>,
    pub decrypted_puks: Vec<(String, Vec<u8>)>,
}

fn message(qualifier: &str) -> ObjectWriter {
    ObjectWriter::new()
        .set_string("@context", KEYGEN2_NS)
        .unwrap()
        .set_string("@qualifier", qualifier)
        .unwrap()
}

fn spki(key: &PublicKey) -> Vec<u8> {
    key.to_spki_der().unwrap()
}

fn objects<'a>(request: &'a JsonObject, name: &str) -> Vec<&'a JsonObject> {
    if request.contains(name) {
        request.get_object_array(name).unwrap()
    } else {
        Vec::new()
    }
}

impl DeviceSimulator {
    pub fn new() -> Self {
        Self {
            session_key: None,
            counter: 0,
            client_session_id: String::new(),
            server_session_id: String::new(),
            issuer_uri: String::new(),
            keys: Vec::new(),
            imported_symmetric_keys: Vec::new(),
            decrypted_extensions: Vec::new(),
            decrypted_pins: Vec::new(),
            decrypted_puks: Vec::new(),
        }
    }

    pub fn client_session_id(&self) -> &str {
        &self.client_session_id
    }

    pub fn counter(&self) -> u16 {
        self.counter
    }

    fn session_key(&self) -> &[u8] {
        self.session_key.as_deref().unwrap()
    }

    fn next_counter(&mut self) -> [u8; 2] {
        let value = self.counter;
        self.counter += 1;
        value.to_be_bytes()
    }

    /// MAC under `method` and the next counter, as the key store computes it.
    pub fn mac(&mut self, data: &[u8], method: &[u8]) -> Vec<u8> {
        let mut modifier = method.to_vec();
        modifier.extend_from_slice(&self.next_counter());
        let derived = hmac_sha256(self.session_key(), &modifier).unwrap();
        hmac_sha256(&derived, data).unwrap()
    }

    fn attest(&self, data: &[u8], counter: [u8; 2]) -> Vec<u8> {
        let mut modifier = KDF_DEVICE_ATTESTATION.to_vec();
        modifier.extend_from_slice(&counter);
        let derived = hmac_sha256(self.session_key(), &modifier).unwrap();
        hmac_sha256(&derived, data).unwrap()
    }

    /// Decrypt data the issuer encrypted under the session key.
    pub fn decrypt(&self, data: &[u8]) -> Vec<u8> {
        let key = hmac_sha256(self.session_key(), KDF_ENCRYPTION_KEY).unwrap();
        let (iv, cipher_text) = data.split_at(16);
        cbc::Decryptor::<Aes256>::new_from_slices(&key, iv)
            .unwrap()
            .decrypt_padded_vec_mut::<Pkcs7>(cipher_text)
            .unwrap()
    }

    // ========================================================================
    // Responses
    // ========================================================================

    pub fn platform_negotiation_response(&mut self, request: &JsonObject) -> JsonObject {
        assert_eq!(
            request.get_string("@qualifier").unwrap(),
            "PlatformNegotiationRequest"
        );
        self.server_session_id = request.get_string("serverSessionId").unwrap().to_string();
        self.issuer_uri = request.get_string("submitUrl").unwrap().to_string();
        let mut writer = message("PlatformNegotiationResponse")
            .set_string("serverSessionId", self.server_session_id.as_str())
            .unwrap();
        if let Some(capabilities) = request.get_object_conditional("basicCapabilities").unwrap() {
            writer = writer
                .set_object("basicCapabilities", capabilities.clone())
                .unwrap();
        }
        writer.build()
    }

    pub fn provisioning_initialization_response(
        &mut self,
        request: &JsonObject,
        options: InitOptions,
    ) -> JsonObject {
        assert_eq!(
            request.get_string("@qualifier").unwrap(),
            "ProvisioningInitializationRequest"
        );
        assert_eq!(
            request.get_string("sessionKeyAlgorithm").unwrap(),
            ALGORITHM_SESSION_ATTEST_1
        );
        let server_ephemeral =
            PublicKey::from_jwk(request.get_object("serverEphemeralKey").unwrap()).unwrap();
        let key_management_spki = request
            .get_object_conditional("keyManagementKey")
            .unwrap()
            .map(|jwk| spki(&PublicKey::from_jwk(jwk).unwrap()))
            .unwrap_or_default();
        let session_lifetime = request.get_int53("sessionLifeTime").unwrap();
        let key_limit = request.get_int("sessionKeyLimit").unwrap();

        self.client_session_id = options
            .client_session_id
            .unwrap_or_else(|| "C-17a0000000000device".to_string());
        let client_ephemeral = p256::SecretKey::random(&mut OsRng);
        let shared = p256::ecdh::diffie_hellman(
            client_ephemeral.to_nonzero_scalar(),
            server_ephemeral.as_ec().unwrap().as_affine(),
        );

        let device_id = match &options.device {
            Some((path, _)) => path[0].as_der().to_vec(),
            None => KDF_ANONYMOUS.to_vec(),
        };
        let mut kdf = Transcript::new();
        kdf.add_string(&self.client_session_id).unwrap();
        kdf.add_string(&self.server_session_id).unwrap();
        kdf.add_string(&self.issuer_uri).unwrap();
        kdf.add_array(&device_id).unwrap();
        self.session_key = Some(hmac_sha256(shared.raw_secret_bytes(), kdf.as_bytes()).unwrap());

        let client_time = Utc::now().trunc_subsecs(0);
        let client_public = PublicKey::Ec(client_ephemeral.public_key());
        let mut arguments = kdf.clone();
        arguments.add_string(ALGORITHM_SESSION_ATTEST_1).unwrap();
        arguments.add_bool(options.device.is_none());
        arguments.add_array(&spki(&server_ephemeral)).unwrap();
        arguments.add_array(&spki(&client_public)).unwrap();
        arguments.add_array(&key_management_spki).unwrap();
        arguments.add_int(i32::try_from(client_time.timestamp()).unwrap());
        arguments.add_int(i32::try_from(session_lifetime).unwrap());
        arguments.add_short(u16::try_from(key_limit).unwrap());

        let mut attestation = match &options.device {
            Some((_, device_key)) => sign_asymmetric(
                SignatureAlgorithm::Es256,
                device_key,
                arguments.as_bytes(),
            )
            .unwrap(),
            None => {
                let key = hmac_sha256(self.session_key(), KDF_DEVICE_ATTESTATION).unwrap();
                hmac_sha256(&key, arguments.as_bytes()).unwrap()
            }
        };
        if options.corrupt_attestation {
            attestation[0] ^= 1;
        }

        let mut writer = message("ProvisioningInitializationResponse")
            .set_string("serverSessionId", self.server_session_id.as_str())
            .unwrap()
            .set_string("clientSessionId", self.client_session_id.as_str())
            .unwrap()
            .set_string("serverTime", request.get_string("serverTime").unwrap())
            .unwrap()
            .set_date_time("clientTime", client_time)
            .unwrap()
            .set_object("clientEphemeralKey", client_public.to_jwk().unwrap())
            .unwrap();
        if let Some((path, _)) = &options.device {
            let certificates: Vec<&[u8]> = path.iter().map(Certificate::as_der).collect();
            writer = writer
                .set_binary_array("deviceCertificatePath", &certificates)
                .unwrap();
        }
        if let Some(certificate) = &options.server_certificate {
            writer = writer
                .set_binary(
                    "serverCertificateFingerprint",
                    &Sha256::digest(certificate.as_der()),
                )
                .unwrap();
        }
        let mut response = writer.set_binary("attestation", &attestation).unwrap().build();

        let signature_key = hmac_sha256(self.session_key(), KDF_EXTERNAL_SIGNATURE).unwrap();
        let signer = Signer::symmetric(SignatureAlgorithm::Hs256, signature_key).unwrap();
        sign(&mut response, &signer).unwrap();
        if options.corrupt_signature {
            let block = response.get_mut("signature").unwrap().as_object_mut().unwrap();
            let value = block.get("val").unwrap().as_str().unwrap().to_string();
            let flipped = if value.starts_with('A') { "B" } else { "A" };
            block.set("val", JsonValue::String(format!("{}{}", flipped, &value[1..])));
        }
        response
    }

    /// Answer a discovery request after checking every lookup authorization.
    /// `matches` maps lookup ids to matching credential objects.
    pub fn credential_discovery_response(
        &mut self,
        request: &JsonObject,
        matches: &[(&str, Vec<JsonObject>)],
    ) -> JsonObject {
        assert_eq!(
            request.get_string("@qualifier").unwrap(),
            "CredentialDiscoveryRequest"
        );
        let mut results = Vec::new();
        for specifier in request.get_object_array("lookupSpecifiers").unwrap() {
            let id = specifier.get_string("id").unwrap();
            let nonce = specifier.get_binary("nonce").unwrap();
            let mut expected_nonce = Sha256::new();
            expected_nonce.update(self.client_session_id.as_bytes());
            expected_nonce.update(self.server_session_id.as_bytes());
            assert_eq!(nonce, expected_nonce.finalize().to_vec());

            let key_management_key =
                PublicKey::from_jwk(specifier.get_object("keyManagementKey").unwrap()).unwrap();
            let mut t = Transcript::new();
            t.add_string(id).unwrap();
            t.add_array(&nonce).unwrap();
            verify_asymmetric(
                SignatureAlgorithm::Es256,
                &key_management_key,
                t.as_bytes(),
                &specifier.get_binary("authorization").unwrap(),
            )
            .unwrap();

            let credentials: Vec<JsonValue> = matches
                .iter()
                .find(|(lookup, _)| *lookup == id)
                .map(|(_, found)| found.iter().cloned().map(JsonValue::Object).collect())
                .unwrap_or_default();
            results.push(JsonValue::Object(
                ObjectWriter::new()
                    .set_string("id", id)
                    .unwrap()
                    .set_array("matchingCredentials", credentials)
                    .unwrap()
                    .build(),
            ));
        }
        message("CredentialDiscoveryResponse")
            .set_string("clientSessionId", self.client_session_id.as_str())
            .unwrap()
            .set_string("serverSessionId", self.server_session_id.as_str())
            .unwrap()
            .set_array("lookupResults", results)
            .unwrap()
            .build()
    }

    /// Generate the requested keys and attest them.
    pub fn key_creation_response(&mut self, request: &JsonObject) -> JsonObject {
        assert_eq!(request.get_string("@qualifier").unwrap(), "KeyCreationRequest");
        for policy in objects(request, "pukPolicySpecifiers") {
            self.next_counter();
            let id = policy.get_string("id").unwrap().to_string();
            let puk = self.decrypt(&policy.get_binary("encryptedPuk").unwrap());
            self.decrypted_puks.push((id, puk));
        }
        for _ in objects(request, "pinPolicySpecifiers") {
            self.next_counter();
        }

        let mut generated = Vec::new();
        for entry in objects(request, "keyEntrySpecifiers") {
            let id = entry.get_string("id").unwrap().to_string();
            self.next_counter();
            let attestation_counter = self.next_counter();
            if let Some(pin) = entry.get_binary_conditional("encryptedPin").unwrap() {
                let pin = self.decrypt(&pin);
                self.decrypted_pins.push((id.clone(), pin));
            }

            let algorithm = KeyAlgorithm::from_uri(entry.get_string("keyAlgorithm").unwrap())
                .unwrap();
            assert_eq!(algorithm, KeyAlgorithm::EcP256, "simulator only generates P-256 keys");
            let private_key = PrivateKey::generate_ec(&mut OsRng);
            let public_key = private_key.public_key();

            let mut t = Transcript::new();
            t.add_string(&id).unwrap();
            t.add_array(&spki(&public_key)).unwrap();
            let attestation = self.attest(t.as_bytes(), attestation_counter);

            generated.push(JsonValue::Object(
                ObjectWriter::new()
                    .set_string("id", id.as_str())
                    .unwrap()
                    .set_object("publicKey", public_key.to_jwk().unwrap())
                    .unwrap()
                    .set_binary("attestation", &attestation)
                    .unwrap()
                    .build(),
            ));
            self.keys.push(DeviceKey { id, private_key });
        }
        message("KeyCreationResponse")
            .set_string("clientSessionId", self.client_session_id.as_str())
            .unwrap()
            .set_string("serverSessionId", self.server_session_id.as_str())
            .unwrap()
            .set_array("generatedKeys", generated)
            .unwrap()
            .build()
    }

    /// Check the issued objects and the close MAC, then attest the nonce.
    pub fn provisioning_finalization_response(&mut self, request: &JsonObject) -> JsonObject {
        assert_eq!(
            request.get_string("@qualifier").unwrap(),
            "ProvisioningFinalizationRequest"
        );
        for issued in objects(request, "issuedKeys") {
            let id = issued.get_string("id").unwrap().to_string();
            let path = issued.get_binary_array("certificatePath").unwrap();
            let mut t = Transcript::new();
            t.add_string(&id).unwrap();
            for certificate in &path {
                t.add_array(certificate).unwrap();
            }
            let mac = self.mac(t.as_bytes(), b"setCertificatePath");
            assert_eq!(mac, issued.get_binary("mac").unwrap(), "certificate path MAC");

            if let Some(import) = issued.get_object_conditional("importSymmetricKey").unwrap() {
                let encrypted = import.get_binary("encryptedKey").unwrap();
                let mut t = Transcript::new();
                t.add_array(&path[0]).unwrap();
                t.add_array(&encrypted).unwrap();
                let mac = self.mac(t.as_bytes(), b"importSymmetricKey");
                assert_eq!(mac, import.get_binary("mac").unwrap(), "import MAC");
                let key = self.decrypt(&encrypted);
                self.imported_symmetric_keys.push((id.clone(), key));
            }
            if issued.contains("importPrivateKey") {
                self.next_counter();
            }
            for object in objects(issued, "extensions") {
                let (extension, mac) = Extension::decode(object).unwrap();
                let expected = self.mac(&extension.mac_data(&path[0]).unwrap(), b"addExtension");
                assert_eq!(mac, expected, "extension MAC");
                if let Extension::Encrypted { encrypted_data, .. } = &extension {
                    let plain = self.decrypt(encrypted_data);
                    self.decrypted_extensions.push((id.clone(), plain));
                }
            }
            if issued.contains("updateKey") || issued.contains("cloneKeyProtection") {
                self.next_counter();
            }
        }
        for _ in objects(request, "unlockKeys") {
            self.next_counter();
        }
        for _ in objects(request, "deleteKeys") {
            self.next_counter();
        }

        let nonce = request.get_binary("nonce").unwrap();
        let mut t = Transcript::new();
        t.add_string(&self.client_session_id).unwrap();
        t.add_string(&self.server_session_id).unwrap();
        t.add_string(&self.issuer_uri).unwrap();
        t.add_array(&nonce).unwrap();
        let close_mac = self.mac(t.as_bytes(), b"closeProvisioningSession");
        assert_eq!(close_mac, request.get_binary("mac").unwrap(), "close session MAC");

        let mut t = Transcript::new();
        t.add_array(&nonce).unwrap();
        t.add_string(ALGORITHM_SESSION_ATTEST_1).unwrap();
        let counter = self.next_counter();
        let close_attestation = self.attest(t.as_bytes(), counter);

        message("ProvisioningFinalizationResponse")
            .set_string("clientSessionId", self.client_session_id.as_str())
            .unwrap()
            .set_string("serverSessionId", self.server_session_id.as_str())
            .unwrap()
            .set_binary("closeAttestation", &close_attestation)
            .unwrap()
            .build()
    }
}

/// A self-described certificate stand-in; the protocol treats certificates
/// as opaque DER bytes.
pub fn certificate(label: &str) -> Certificate {
    Certificate(format!("certificate:{label}").into_bytes())
}
