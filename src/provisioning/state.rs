//! The server side of a KeyGen2 provisioning session.

use chrono::{DateTime, SubsecRound, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::constants::{
    ALGORITHM_SESSION_ATTEST_1, KDF_ANONYMOUS, KDF_DEVICE_ATTESTATION, KDF_EXTERNAL_SIGNATURE,
    MAX_LENGTH_ID_TYPE,
};
use super::extension::Extension;
use super::key::Key;
use super::messages::{
    Capabilities, CredentialDiscoveryResponse, KeyCreationResponse, LookupResult,
    PlatformNegotiationResponse, ProvisioningFinalizationResponse,
    ProvisioningInitializationResponse, ResponseMessage,
};
use super::policy::{PinPolicy, PukPolicy};
use super::post_operation::{PostOperation, PostOperationKind, PostOperations, TargetKey};
use super::server_crypto::ServerCryptoInterface;
use super::transcript::{next_counter, Transcript};
use super::types::{AppUsage, KeySpecifier, PassphraseFormat, ProtocolPhase};
use super::validation::{validate_id, validate_session, validate_subset};
use crate::crypto::{Certificate, PublicKey, SignatureAlgorithm};
use crate::envelope::{verify, SymmetricKeyVerifier, Verifier, VerifierOptions};
use crate::error::{ErrorCode, JcsResult};
use crate::json::JsonObject;

/// A credential lookup queued for the discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSpecifier {
    /// Lookup id, e.g. `Lookup.1`
    pub id: String,
    /// Key-management key whose credentials are searched
    pub key_management_key: PublicKey,
}

/// Checks the client's HMAC signature with the session key.
struct ExternalSignatureVerifier<'a> {
    crypto: &'a dyn ServerCryptoInterface,
}

impl SymmetricKeyVerifier for ExternalSignatureVerifier<'_> {
    fn verify_mac(&self, algorithm: SignatureAlgorithm, data: &[u8], value: &[u8]) -> JcsResult<()> {
        if algorithm != SignatureAlgorithm::Hs256 {
            return Err(ErrorCode::E301_SignatureAlgorithmMismatch(algorithm.to_string()));
        }
        let expected = self.crypto.mac(data, KDF_EXTERNAL_SIGNATURE)?;
        if bool::from(expected.ct_eq(value)) {
            Ok(())
        } else {
            Err(ErrorCode::E300_SignatureInvalid)
        }
    }
}

/// Issuer-side protocol state.
///
/// Requests are produced by the encoder methods (`*_request`) and responses
/// consumed by [`ServerState::update`]. The two strictly alternate and the
/// phase only moves forward. The first error raised by an encoder or by
/// `update` aborts the session.
pub struct ServerState {
    pub(crate) config: SessionConfig,
    pub(crate) crypto: Box<dyn ServerCryptoInterface>,
    pub(crate) phase: ProtocolPhase,
    pub(crate) request_phase: bool,
    pub(crate) aborted: bool,
    pub(crate) mac_sequence_counter: u16,
    pub(crate) server_session_id: String,
    pub(crate) client_session_id: String,
    pub(crate) capabilities: Capabilities,
    pub(crate) server_time: Option<DateTime<Utc>>,
    pub(crate) server_ephemeral_key: Option<p256::PublicKey>,
    pub(crate) client_ephemeral_key: Option<p256::PublicKey>,
    pub(crate) device_certificate_path: Option<Vec<Certificate>>,
    pub(crate) key_management_key: Option<PublicKey>,
    pub(crate) server_certificate: Option<Certificate>,
    pub(crate) puk_policies: Vec<PukPolicy>,
    pub(crate) pin_policies: Vec<PinPolicy>,
    pub(crate) keys: Vec<Key>,
    pub(crate) post_operations: PostOperations,
    pub(crate) lookup_specifiers: Vec<LookupSpecifier>,
    pub(crate) lookup_results: Vec<LookupResult>,
    pub(crate) close_nonce: Option<Vec<u8>>,
    next_key_suffix: u32,
    next_pin_suffix: u32,
    next_puk_suffix: u32,
}

fn generate_session_id() -> String {
    let mut id = format!("{:x}", Utc::now().timestamp_millis());
    let padding = MAX_LENGTH_ID_TYPE.saturating_sub(id.len());
    id.extend(
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(padding)
            .map(char::from),
    );
    id
}

impl ServerState {
    /// Start a session with a fresh server session id.
    pub fn new(crypto: Box<dyn ServerCryptoInterface>, config: SessionConfig) -> Self {
        let server_session_id = generate_session_id();
        debug!(session = %server_session_id, issuer = %config.issuer_uri, "provisioning session created");
        Self {
            config,
            crypto,
            phase: ProtocolPhase::PlatformNegotiation,
            request_phase: true,
            aborted: false,
            mac_sequence_counter: 0,
            server_session_id,
            client_session_id: String::new(),
            capabilities: Capabilities::new(),
            server_time: None,
            server_ephemeral_key: None,
            client_ephemeral_key: None,
            device_certificate_path: None,
            key_management_key: None,
            server_certificate: None,
            puk_policies: Vec::new(),
            pin_policies: Vec::new(),
            keys: Vec::new(),
            post_operations: PostOperations::default(),
            lookup_specifiers: Vec::new(),
            lookup_results: Vec::new(),
            close_nonce: None,
            next_key_suffix: 0,
            next_pin_suffix: 0,
            next_puk_suffix: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current phase.
    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    /// True once an error has made the session unusable.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// True after a verified finalization response.
    pub fn is_done(&self) -> bool {
        self.phase == ProtocolPhase::Done
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Server session id.
    pub fn server_session_id(&self) -> &str {
        &self.server_session_id
    }

    /// Client session id, empty before the initialization response.
    pub fn client_session_id(&self) -> &str {
        &self.client_session_id
    }

    /// Requested capabilities, replaced by the device's answer.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Device certificate path from the initialization response.
    pub fn device_certificate_path(&self) -> Option<&[Certificate]> {
        self.device_certificate_path.as_deref()
    }

    /// Next MAC sequence counter value.
    pub fn mac_sequence_counter(&self) -> u16 {
        self.mac_sequence_counter
    }

    /// Requested keys in creation order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// A requested key.
    pub fn key(&self, id: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.id == id)
    }

    /// Mutable access to a requested key.
    pub fn key_mut(&mut self, id: &str) -> JcsResult<&mut Key> {
        self.keys
            .iter_mut()
            .find(|k| k.id == id)
            .ok_or_else(|| ErrorCode::E507_UnknownKeyId(id.to_string()))
    }

    /// A PIN policy.
    pub fn pin_policy(&self, id: &str) -> Option<&PinPolicy> {
        self.pin_policies.iter().find(|p| p.id == id)
    }

    /// Mutable access to a PIN policy.
    pub fn pin_policy_mut(&mut self, id: &str) -> JcsResult<&mut PinPolicy> {
        self.pin_policies
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ErrorCode::E507_UnknownKeyId(id.to_string()))
    }

    /// A PUK policy.
    pub fn puk_policy(&self, id: &str) -> Option<&PukPolicy> {
        self.puk_policies.iter().find(|p| p.id == id)
    }

    /// Queued post-provisioning operations.
    pub fn post_operations(&self) -> &PostOperations {
        &self.post_operations
    }

    /// Results of the credential discovery phase.
    pub fn lookup_results(&self) -> &[LookupResult] {
        &self.lookup_results
    }

    // ------------------------------------------------------------------
    // Session setup
    // ------------------------------------------------------------------

    /// Capabilities to query in the platform negotiation request.
    pub fn capabilities_mut(&mut self) -> JcsResult<&mut Capabilities> {
        self.check_before(ProtocolPhase::PlatformNegotiation, "capabilities")?;
        Ok(&mut self.capabilities)
    }

    /// Key-management key of this session.
    pub fn set_key_management_key(&mut self, key: PublicKey) -> JcsResult<()> {
        self.check_before(ProtocolPhase::ProvisioningInitialization, "key-management key")?;
        self.key_management_key = Some(key);
        Ok(())
    }

    /// TLS certificate of the server; its fingerprint must come back in the
    /// initialization response.
    pub fn set_server_certificate(&mut self, certificate: Certificate) -> JcsResult<()> {
        self.check_before(ProtocolPhase::ProvisioningInitialization, "server certificate")?;
        self.server_certificate = Some(certificate);
        Ok(())
    }

    /// Search the device for credentials managed by `key_management_key`.
    pub fn add_lookup_specifier(&mut self, key_management_key: PublicKey) -> JcsResult<String> {
        self.check_before(ProtocolPhase::CredentialDiscovery, "lookup specifier")?;
        let id = format!("Lookup.{}", self.lookup_specifiers.len() + 1);
        self.lookup_specifiers.push(LookupSpecifier {
            id: id.clone(),
            key_management_key,
        });
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Policies and keys
    // ------------------------------------------------------------------

    fn next_id(prefix: &str, suffix: &mut u32) -> JcsResult<String> {
        *suffix += 1;
        let id = format!("{prefix}{suffix}");
        validate_id(&id)?;
        Ok(id)
    }

    /// Create a PUK policy. The PUK is encrypted under the session key, so
    /// this is only possible once the session is established.
    pub fn create_puk_policy(
        &mut self,
        puk: &[u8],
        format: PassphraseFormat,
        retry_limit: u16,
    ) -> JcsResult<String> {
        self.check_before(ProtocolPhase::KeyCreation, "PUK policy")?;
        let encrypted_value = self.crypto.encrypt(puk)?;
        let id = Self::next_id(self.config.puk_prefix, &mut self.next_puk_suffix)?;
        self.puk_policies.push(PukPolicy {
            id: id.clone(),
            encrypted_value,
            format,
            retry_limit,
        });
        Ok(id)
    }

    /// Create a PIN policy, optionally governed by a PUK policy.
    pub fn create_pin_policy(
        &mut self,
        format: PassphraseFormat,
        min_length: u16,
        max_length: u16,
        retry_limit: u16,
        puk_policy_id: Option<&str>,
    ) -> JcsResult<String> {
        self.check_before(ProtocolPhase::KeyCreation, "PIN policy")?;
        if let Some(puk) = puk_policy_id {
            if self.puk_policy(puk).is_none() {
                return Err(ErrorCode::E507_UnknownKeyId(puk.to_string()));
            }
        }
        let id = Self::next_id(self.config.pin_prefix, &mut self.next_pin_suffix)?;
        let policy = PinPolicy::new(
            id.clone(),
            format,
            min_length,
            max_length,
            retry_limit,
            puk_policy_id.map(str::to_string),
        )?;
        self.pin_policies.push(policy);
        Ok(id)
    }

    fn add_key(
        &mut self,
        app_usage: AppUsage,
        specifier: KeySpecifier,
        pin_policy_id: Option<&str>,
        preset_pin: Option<&[u8]>,
        device_pin_protection: bool,
    ) -> JcsResult<String> {
        self.check_before(ProtocolPhase::KeyCreation, "key")?;
        if self.keys.len() >= usize::from(self.config.key_limit) {
            return Err(ErrorCode::E506_PolicyViolation(format!(
                "more than {} keys requested",
                self.config.key_limit
            )));
        }
        let encrypted_pin = preset_pin.map(|pin| self.crypto.encrypt(pin)).transpose()?;
        if let Some(policy_id) = pin_policy_id {
            let policy = self
                .pin_policies
                .iter_mut()
                .find(|p| p.id == policy_id)
                .ok_or_else(|| ErrorCode::E507_UnknownKeyId(policy_id.to_string()))?;
            policy.register_key(encrypted_pin.is_some())?;
            if encrypted_pin.is_some() {
                policy.user_defined = false;
            }
        }
        let id = Self::next_id(self.config.key_prefix, &mut self.next_key_suffix)?;
        self.keys.push(Key::new(
            id.clone(),
            app_usage,
            specifier,
            pin_policy_id.map(str::to_string),
            encrypted_pin,
            device_pin_protection,
        ));
        Ok(id)
    }

    /// Request a key, PIN protected when a policy is given.
    pub fn create_key(
        &mut self,
        app_usage: AppUsage,
        specifier: impl Into<KeySpecifier>,
        pin_policy_id: Option<&str>,
    ) -> JcsResult<String> {
        self.add_key(app_usage, specifier.into(), pin_policy_id, None, false)
    }

    /// Request a key whose PIN is set by the issuer.
    pub fn create_key_with_preset_pin(
        &mut self,
        app_usage: AppUsage,
        specifier: impl Into<KeySpecifier>,
        pin_policy_id: Option<&str>,
        pin: &[u8],
    ) -> JcsResult<String> {
        let Some(policy_id) = pin_policy_id else {
            return Err(ErrorCode::E506_PolicyViolation(
                "preset PIN without PIN policy is not allowed".to_string(),
            ));
        };
        self.add_key(app_usage, specifier.into(), Some(policy_id), Some(pin), false)
    }

    /// Request a key protected by the device PIN.
    pub fn create_device_pin_protected_key(
        &mut self,
        app_usage: AppUsage,
        specifier: impl Into<KeySpecifier>,
    ) -> JcsResult<String> {
        self.add_key(app_usage, specifier.into(), None, None, true)
    }

    /// Build an extension whose payload is encrypted under the session key.
    pub fn encrypted_extension(
        &self,
        extension_type: impl Into<String>,
        data: &[u8],
    ) -> JcsResult<Extension> {
        Ok(Extension::Encrypted {
            extension_type: extension_type.into(),
            encrypted_data: self.crypto.encrypt(data)?,
        })
    }

    // ------------------------------------------------------------------
    // Post-provisioning operations
    // ------------------------------------------------------------------

    fn add_post_operation(&mut self, kind: PostOperationKind, target: TargetKey) -> JcsResult<()> {
        self.check_before(ProtocolPhase::ProvisioningFinalization, "post operation")?;
        self.post_operations.add(PostOperation { kind, target })
    }

    /// Delete a key from an earlier session.
    pub fn add_post_delete_key(&mut self, target: TargetKey) -> JcsResult<()> {
        self.add_post_operation(PostOperationKind::DeleteKey, target)
    }

    /// Unlock a key from an earlier session.
    pub fn add_post_unlock_key(&mut self, target: TargetKey) -> JcsResult<()> {
        self.add_post_operation(PostOperationKind::UnlockKey, target)
    }

    fn set_key_operation(
        &mut self,
        key_id: &str,
        kind: PostOperationKind,
        target: TargetKey,
    ) -> JcsResult<()> {
        self.check_before(ProtocolPhase::ProvisioningFinalization, "post operation")?;
        let operation = PostOperation { kind, target };
        self.key_mut(key_id)?.check_post_operation()?;
        self.post_operations.check(&operation)?;
        self.post_operations.add(operation.clone())?;
        self.key_mut(key_id)?.set_post_operation(operation)
    }

    /// Let the new key `key_id` replace `target`.
    pub fn set_updated_key(&mut self, key_id: &str, target: TargetKey) -> JcsResult<()> {
        self.set_key_operation(key_id, PostOperationKind::UpdateKey, target)
    }

    /// Give the new key `key_id` the PIN protection of `target`.
    pub fn set_cloned_key_protection(&mut self, key_id: &str, target: TargetKey) -> JcsResult<()> {
        self.set_key_operation(key_id, PostOperationKind::CloneKeyProtection, target)
    }

    // ------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------

    fn ensure_active(&self) -> JcsResult<()> {
        if self.aborted {
            return Err(ErrorCode::E500_ProtocolState(
                "session aborted by an earlier error".to_string(),
            ));
        }
        Ok(())
    }

    // Configuration belonging to `phase` must be set before its request.
    fn check_before(&self, phase: ProtocolPhase, what: &str) -> JcsResult<()> {
        self.ensure_active()?;
        if self.phase > phase || (self.phase == phase && !self.request_phase) {
            return Err(ErrorCode::E500_ProtocolState(format!(
                "{what} must be set before the {phase} request"
            )));
        }
        Ok(())
    }

    pub(crate) fn check_state(&mut self, request: bool, expected: ProtocolPhase) -> JcsResult<()> {
        self.ensure_active()?;
        if request ^ self.request_phase {
            return Err(ErrorCode::E500_ProtocolState(
                "Wrong order of request versus response".to_string(),
            ));
        }
        self.request_phase = !self.request_phase;
        if self.phase != expected {
            return Err(ErrorCode::E500_ProtocolState(format!(
                "Incorrect object, expected: {expected} got: {}",
                self.phase
            )));
        }
        Ok(())
    }

    /// Abort the session on error.
    pub(crate) fn settle<T>(&mut self, result: JcsResult<T>) -> JcsResult<T> {
        if let Err(error) = &result {
            if !self.aborted {
                warn!(
                    session = %self.server_session_id,
                    phase = %self.phase,
                    code = error.code(),
                    error = %error,
                    "provisioning session aborted"
                );
            }
            self.aborted = true;
        }
        result
    }

    pub(crate) fn advance(&mut self, next: ProtocolPhase) {
        info!(session = %self.server_session_id, from = %self.phase, to = %next, "phase complete");
        self.phase = next;
    }

    fn attest(&self, data: &[u8], counter: [u8; 2]) -> JcsResult<Vec<u8>> {
        let mut modifier = KDF_DEVICE_ATTESTATION.to_vec();
        modifier.extend_from_slice(&counter);
        self.crypto.mac(data, &modifier)
    }

    /// Consume a client response.
    pub fn update(&mut self, message: &JsonObject) -> JcsResult<()> {
        self.ensure_active()?;
        let result = ResponseMessage::decode(message).and_then(|decoded| {
            self.check_state(false, decoded.phase())?;
            self.apply(decoded)
        });
        self.settle(result)
    }

    fn apply(&mut self, message: ResponseMessage) -> JcsResult<()> {
        match message {
            ResponseMessage::PlatformNegotiation(r) => self.update_platform_negotiation(r),
            ResponseMessage::ProvisioningInitialization(r) => {
                self.update_provisioning_initialization(*r)
            }
            ResponseMessage::CredentialDiscovery(r) => self.update_credential_discovery(r),
            ResponseMessage::KeyCreation(r) => self.update_key_creation(r),
            ResponseMessage::ProvisioningFinalization(r) => {
                self.update_provisioning_finalization(r)
            }
        }
    }

    fn update_platform_negotiation(&mut self, response: PlatformNegotiationResponse) -> JcsResult<()> {
        if response.server_session_id != self.server_session_id {
            return Err(ErrorCode::E501_SessionMismatch);
        }
        let requested = &self.capabilities;
        let returned = &response.capabilities;
        validate_subset("algorithms", &requested.algorithms, &returned.algorithms)?;
        validate_subset(
            "clientAttributes",
            &requested.client_attributes,
            &returned.client_attributes,
        )?;
        validate_subset("extensions", &requested.extensions, &returned.extensions)?;
        self.capabilities = response.capabilities;
        self.advance(ProtocolPhase::ProvisioningInitialization);
        Ok(())
    }

    fn update_provisioning_initialization(
        &mut self,
        response: ProvisioningInitializationResponse,
    ) -> JcsResult<()> {
        if response.server_session_id != self.server_session_id {
            return Err(ErrorCode::E501_SessionMismatch);
        }
        if self.server_time != Some(response.server_time) {
            return Err(ErrorCode::E208_InvalidValue(
                "serverTime".to_string(),
                response.server_time.to_rfc3339(),
            ));
        }
        if self.config.privacy_enabled && response.device_certificate_path.is_some() {
            return Err(ErrorCode::E506_PolicyViolation(
                "device certificate returned in privacy mode".to_string(),
            ));
        }
        validate_id(&response.client_session_id)?;
        let server_ephemeral_key = self.server_ephemeral_key.clone().ok_or_else(|| {
            ErrorCode::E500_ProtocolState("no server ephemeral key".to_string())
        })?;

        let device_id = match &response.device_certificate_path {
            Some(path) => path
                .first()
                .map(|c| c.as_der().to_vec())
                .unwrap_or_default(),
            None => KDF_ANONYMOUS.to_vec(),
        };
        let mut kdf = Transcript::new();
        kdf.add_string(&response.client_session_id)?;
        kdf.add_string(&self.server_session_id)?;
        kdf.add_string(self.config.issuer_uri())?;
        kdf.add_array(&device_id)?;

        let client_time = i32::try_from(response.client_time.timestamp()).map_err(|_| {
            ErrorCode::E208_InvalidValue("clientTime".to_string(), response.client_time.to_rfc3339())
        })?;
        let session_lifetime = i32::try_from(self.config.session_lifetime).map_err(|_| {
            ErrorCode::E208_InvalidValue(
                "sessionLifeTime".to_string(),
                self.config.session_lifetime.to_string(),
            )
        })?;
        let key_management_spki = match &self.key_management_key {
            Some(key) => key.to_spki_der()?,
            None => Vec::new(),
        };
        let mut attestation_arguments = kdf.clone();
        attestation_arguments.add_string(ALGORITHM_SESSION_ATTEST_1)?;
        attestation_arguments.add_bool(response.device_certificate_path.is_none());
        attestation_arguments.add_array(&PublicKey::Ec(server_ephemeral_key).to_spki_der()?)?;
        attestation_arguments
            .add_array(&PublicKey::Ec(response.client_ephemeral_key.clone()).to_spki_der()?)?;
        attestation_arguments.add_array(&key_management_spki)?;
        attestation_arguments.add_int(client_time);
        attestation_arguments.add_int(session_lifetime);
        attestation_arguments.add_short(self.config.key_limit);

        self.crypto.generate_and_verify_session_key(
            &response.client_ephemeral_key,
            kdf.as_bytes(),
            attestation_arguments.as_bytes(),
            response.device_certificate_path.as_deref(),
            &response.attestation,
        )?;

        match (&self.server_certificate, &response.server_certificate_fingerprint) {
            (None, None) => {}
            (Some(certificate), Some(fingerprint)) => {
                let expected = Sha256::digest(certificate.as_der());
                if !bool::from(expected.as_slice().ct_eq(fingerprint)) {
                    return Err(ErrorCode::E505_ServerCertificateMismatch);
                }
            }
            _ => return Err(ErrorCode::E505_ServerCertificateMismatch),
        }

        let verifier = ExternalSignatureVerifier {
            crypto: self.crypto.as_ref(),
        };
        verify(
            &response.signed_object,
            &Verifier::Symmetric(&verifier),
            &VerifierOptions::new(),
        )?;

        self.client_session_id = response.client_session_id;
        self.client_ephemeral_key = Some(response.client_ephemeral_key);
        self.device_certificate_path = response.device_certificate_path;
        self.advance(ProtocolPhase::CredentialDiscovery);
        Ok(())
    }

    fn update_credential_discovery(&mut self, response: CredentialDiscoveryResponse) -> JcsResult<()> {
        validate_session(
            &self.client_session_id,
            &self.server_session_id,
            &response.client_session_id,
            &response.server_session_id,
        )?;
        if response.lookup_results.len() != self.lookup_specifiers.len() {
            return Err(ErrorCode::E208_InvalidValue(
                "lookupResults".to_string(),
                format!(
                    "{} results for {} lookups",
                    response.lookup_results.len(),
                    self.lookup_specifiers.len()
                ),
            ));
        }
        for result in &response.lookup_results {
            if !self.lookup_specifiers.iter().any(|s| s.id == result.id) {
                return Err(ErrorCode::E507_UnknownKeyId(result.id.clone()));
            }
        }
        self.lookup_results = response.lookup_results;
        self.advance(ProtocolPhase::KeyCreation);
        Ok(())
    }

    fn update_key_creation(&mut self, response: KeyCreationResponse) -> JcsResult<()> {
        validate_session(
            &self.client_session_id,
            &self.server_session_id,
            &response.client_session_id,
            &response.server_session_id,
        )?;
        if response.generated_keys.len() != self.keys.len() {
            return Err(ErrorCode::E208_InvalidValue(
                "generatedKeys".to_string(),
                "different number of requested and received keys".to_string(),
            ));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(response.generated_keys.len());
        for generated in &response.generated_keys {
            if seen.contains(&generated.id.as_str()) {
                return Err(ErrorCode::E600_DuplicateIdentifier(generated.id.clone()));
            }
            seen.push(&generated.id);

            let key = self
                .key(&generated.id)
                .ok_or_else(|| ErrorCode::E507_UnknownKeyId(generated.id.clone()))?;
            if !key.specifier.algorithm.matches(&generated.public_key) {
                return Err(ErrorCode::E502_AttestationFailure(format!(
                    "wrong key type returned for {}",
                    generated.id
                )));
            }
            let counter = key.attestation_counter.ok_or_else(|| {
                ErrorCode::E500_ProtocolState(format!("{} was never requested", generated.id))
            })?;
            let mut t = Transcript::new();
            t.add_string(&generated.id)?;
            t.add_array(&generated.public_key.to_spki_der()?)?;
            let expected = self.attest(t.as_bytes(), counter)?;
            if !bool::from(expected.ct_eq(&generated.attestation)) {
                return Err(ErrorCode::E502_AttestationFailure(format!(
                    "attestation failed for {}",
                    generated.id
                )));
            }
        }
        for generated in response.generated_keys {
            let key = self.key_mut(&generated.id)?;
            key.public_key = Some(generated.public_key);
            key.attestation = Some(generated.attestation);
        }
        self.advance(ProtocolPhase::ProvisioningFinalization);
        Ok(())
    }

    fn update_provisioning_finalization(
        &mut self,
        response: ProvisioningFinalizationResponse,
    ) -> JcsResult<()> {
        validate_session(
            &self.client_session_id,
            &self.server_session_id,
            &response.client_session_id,
            &response.server_session_id,
        )?;
        let nonce = self.close_nonce.clone().ok_or_else(|| {
            ErrorCode::E500_ProtocolState("no close nonce".to_string())
        })?;
        let mut t = Transcript::new();
        t.add_array(&nonce)?;
        t.add_string(ALGORITHM_SESSION_ATTEST_1)?;
        let counter = next_counter(&mut self.mac_sequence_counter)?;
        let expected = self.attest(t.as_bytes(), counter)?;
        if !bool::from(expected.ct_eq(&response.close_attestation)) {
            return Err(ErrorCode::E503_FinalAttestation);
        }
        self.advance(ProtocolPhase::Done);
        Ok(())
    }

    pub(crate) fn new_server_time() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("server_session_id", &self.server_session_id)
            .field("client_session_id", &self.client_session_id)
            .field("phase", &self.phase)
            .field("request_phase", &self.request_phase)
            .field("aborted", &self.aborted)
            .field("mac_sequence_counter", &self.mac_sequence_counter)
            .field("keys", &self.keys.len())
            .finish_non_exhaustive()
    }
}
