//! Request encoders.
//!
//! Each encoder checks that a request is due in the current phase, writes the
//! message and, where the protocol requires it, MACs the contained objects in
//! a fixed order so the device sees the same sequence counter values:
//!
//! | Request                    | MAC order                                        |
//! |----------------------------|--------------------------------------------------|
//! | KeyCreationRequest         | PUK policies, PIN policies, key entries          |
//! | ProvisioningFinalization   | per key: path, imports, extensions, clone/update |
//! |                            | then unlocks, deletes, close session             |

use sha2::{Digest, Sha256};

use super::constants::{
    ALGORITHM_KEY_ATTEST_1, ALGORITHM_SESSION_ATTEST_1, AUTHORIZATION_JSON,
    BASIC_CAPABILITIES_JSON, CREDENTIAL_DISCOVERY_REQUEST, DELETE_KEYS_JSON, ID_JSON,
    ISSUED_KEYS_JSON, KEY_CREATION_REQUEST, KEY_ENTRY_ALGORITHM_JSON, KEY_ENTRY_SPECIFIERS_JSON,
    KEY_MANAGEMENT_KEY_JSON, LOOKUP_SPECIFIERS_JSON, MAC_JSON, METHOD_CLOSE_PROVISIONING_SESSION,
    NONCE_JSON, PIN_POLICY_SPECIFIERS_JSON, PLATFORM_NEGOTIATION_REQUEST, PRIVACY_ENABLED_JSON,
    PROVISIONING_FINALIZATION_REQUEST, PROVISIONING_INITIALIZATION_REQUEST,
    PUK_POLICY_SPECIFIERS_JSON, SERVER_EPHEMERAL_KEY_JSON, SERVER_SESSION_ID_JSON,
    SERVER_TIME_JSON, SESSION_KEY_ALGORITHM_JSON, SESSION_KEY_LIMIT_JSON, SESSION_LIFE_TIME_JSON,
    SUBMIT_URL_JSON, UNLOCK_KEYS_JSON,
};
use super::messages::message;
use super::post_operation::{PostOperationKind, TargetKey};
use super::state::ServerState;
use super::transcript::{MacContext, SessionMac, Transcript};
use super::types::ProtocolPhase;
use crate::crypto::PublicKey;
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, JsonValue, ObjectWriter};

impl ServerState {
    /// `PlatformNegotiationRequest`: session id, submit URL and the
    /// capabilities to query.
    pub fn platform_negotiation_request(&mut self) -> JcsResult<JsonObject> {
        let result = self.encode_platform_negotiation();
        self.settle(result)
    }

    fn encode_platform_negotiation(&mut self) -> JcsResult<JsonObject> {
        self.check_state(true, ProtocolPhase::PlatformNegotiation)?;
        let mut writer = message(PLATFORM_NEGOTIATION_REQUEST)?
            .set_string(SERVER_SESSION_ID_JSON, self.server_session_id.as_str())?
            .set_string(SUBMIT_URL_JSON, self.config.issuer_uri())?;
        if self.config.privacy_enabled {
            writer = writer.set_bool(PRIVACY_ENABLED_JSON, true)?;
        }
        if !self.capabilities.is_empty() {
            writer = writer.set_object(BASIC_CAPABILITIES_JSON, self.capabilities.write()?)?;
        }
        Ok(writer.build())
    }

    /// `ProvisioningInitializationRequest`: the server ephemeral key and the
    /// session parameters the device attests to.
    pub fn provisioning_initialization_request(&mut self) -> JcsResult<JsonObject> {
        let result = self.encode_provisioning_initialization();
        self.settle(result)
    }

    fn encode_provisioning_initialization(&mut self) -> JcsResult<JsonObject> {
        self.check_state(true, ProtocolPhase::ProvisioningInitialization)?;
        let ephemeral_key = self.crypto.generate_ephemeral_key()?;
        let server_time = Self::new_server_time();
        let mut writer = message(PROVISIONING_INITIALIZATION_REQUEST)?
            .set_string(SERVER_SESSION_ID_JSON, self.server_session_id.as_str())?
            .set_string(SUBMIT_URL_JSON, self.config.issuer_uri())?
            .set_string(SESSION_KEY_ALGORITHM_JSON, ALGORITHM_SESSION_ATTEST_1)?
            .set_int(SESSION_KEY_LIMIT_JSON, i32::from(self.config.key_limit))?
            .set_int53(SESSION_LIFE_TIME_JSON, i64::from(self.config.session_lifetime))?
            .set_object(
                SERVER_EPHEMERAL_KEY_JSON,
                PublicKey::Ec(ephemeral_key.clone()).to_jwk()?,
            )?;
        if let Some(key) = &self.key_management_key {
            writer = writer.set_object(KEY_MANAGEMENT_KEY_JSON, key.to_jwk()?)?;
        }
        writer = writer.set_date_time(SERVER_TIME_JSON, server_time)?;
        self.server_ephemeral_key = Some(ephemeral_key);
        self.server_time = Some(server_time);
        Ok(writer.build())
    }

    /// `CredentialDiscoveryRequest`: one lookup per queued key-management
    /// key, each authorized by that key.
    pub fn credential_discovery_request(&mut self) -> JcsResult<JsonObject> {
        let result = self.encode_credential_discovery();
        self.settle(result)
    }

    fn encode_credential_discovery(&mut self) -> JcsResult<JsonObject> {
        self.check_state(true, ProtocolPhase::CredentialDiscovery)?;
        if self.lookup_specifiers.is_empty() {
            return Err(ErrorCode::E500_ProtocolState(
                "no lookup specifiers".to_string(),
            ));
        }
        let mut hasher = Sha256::new();
        hasher.update(self.client_session_id.as_bytes());
        hasher.update(self.server_session_id.as_bytes());
        let nonce = hasher.finalize().to_vec();

        let mut specifiers = Vec::with_capacity(self.lookup_specifiers.len());
        for specifier in &self.lookup_specifiers {
            let mut t = Transcript::new();
            t.add_string(&specifier.id)?;
            t.add_array(&nonce)?;
            let authorization = self
                .crypto
                .generate_key_management_authorization(&specifier.key_management_key, t.as_bytes())?;
            let object = ObjectWriter::new()
                .set_string(ID_JSON, specifier.id.as_str())?
                .set_binary(NONCE_JSON, &nonce)?
                .set_object(KEY_MANAGEMENT_KEY_JSON, specifier.key_management_key.to_jwk()?)?
                .set_binary(AUTHORIZATION_JSON, &authorization)?
                .build();
            specifiers.push(JsonValue::from(object));
        }
        Ok(message(CREDENTIAL_DISCOVERY_REQUEST)?
            .set_string(SERVER_SESSION_ID_JSON, self.server_session_id.as_str())?
            .set_string(SUBMIT_URL_JSON, self.config.issuer_uri())?
            .set_array(LOOKUP_SPECIFIERS_JSON, specifiers)?
            .build())
    }

    /// `KeyCreationRequest`: PUK policies, PIN policies and key entries, each
    /// MACed under the session key.
    ///
    /// Credential discovery is optional. Without lookup specifiers this
    /// request may directly follow the initialization response.
    pub fn key_creation_request(&mut self) -> JcsResult<JsonObject> {
        let result = self.encode_key_creation();
        self.settle(result)
    }

    fn encode_key_creation(&mut self) -> JcsResult<JsonObject> {
        if self.phase == ProtocolPhase::CredentialDiscovery
            && self.request_phase
            && self.lookup_specifiers.is_empty()
            && !self.aborted
        {
            self.advance(ProtocolPhase::KeyCreation);
        }
        self.check_state(true, ProtocolPhase::KeyCreation)?;
        if self.keys.is_empty() {
            return Err(ErrorCode::E500_ProtocolState("no keys requested".to_string()));
        }

        let mut ctx = SessionMac {
            crypto: self.crypto.as_ref(),
            counter: &mut self.mac_sequence_counter,
        };
        let mut puk_policies = Vec::with_capacity(self.puk_policies.len());
        for policy in &self.puk_policies {
            puk_policies.push(JsonValue::from(policy.write(&mut ctx)?));
        }
        let mut pin_policies = Vec::with_capacity(self.pin_policies.len());
        for policy in &self.pin_policies {
            pin_policies.push(JsonValue::from(policy.write(&mut ctx)?));
        }
        let mut keys = Vec::with_capacity(self.keys.len());
        for key in &mut self.keys {
            let policy = match key.pin_policy_id.as_deref() {
                Some(id) => Some(
                    self.pin_policies
                        .iter()
                        .find(|p| p.id == id)
                        .ok_or_else(|| ErrorCode::E507_UnknownKeyId(id.to_string()))?,
                ),
                None => None,
            };
            keys.push(JsonValue::from(key.write_request(&mut ctx, policy)?));
        }

        let mut writer = message(KEY_CREATION_REQUEST)?
            .set_string(SERVER_SESSION_ID_JSON, self.server_session_id.as_str())?
            .set_string(SUBMIT_URL_JSON, self.config.issuer_uri())?
            .set_string(KEY_ENTRY_ALGORITHM_JSON, ALGORITHM_KEY_ATTEST_1)?;
        if !puk_policies.is_empty() {
            writer = writer.set_array(PUK_POLICY_SPECIFIERS_JSON, puk_policies)?;
        }
        if !pin_policies.is_empty() {
            writer = writer.set_array(PIN_POLICY_SPECIFIERS_JSON, pin_policies)?;
        }
        Ok(writer.set_array(KEY_ENTRY_SPECIFIERS_JSON, keys)?.build())
    }

    /// `ProvisioningFinalizationRequest`: certificates, imports, extensions,
    /// post-provisioning operations and the close-session MAC.
    pub fn provisioning_finalization_request(&mut self) -> JcsResult<JsonObject> {
        let result = self.encode_provisioning_finalization();
        self.settle(result)
    }

    fn encode_provisioning_finalization(&mut self) -> JcsResult<JsonObject> {
        self.check_state(true, ProtocolPhase::ProvisioningFinalization)?;
        let nonce = self.crypto.generate_nonce()?;

        let crypto = self.crypto.as_ref();
        let client_session_id = self.client_session_id.as_str();
        let server_session_id = self.server_session_id.as_str();
        let authorize = |target: &TargetKey| -> JcsResult<Vec<u8>> {
            let data = target.authorization_data(client_session_id, server_session_id)?;
            crypto.generate_key_management_authorization(&target.key_management_key, &data)
        };
        let mut ctx = SessionMac {
            crypto,
            counter: &mut self.mac_sequence_counter,
        };

        let mut issued_keys = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let authorization = match &key.post_operation {
                Some(operation) => Some(authorize(&operation.target)?),
                None => None,
            };
            issued_keys.push(JsonValue::from(
                key.write_finalization(&mut ctx, authorization.as_deref())?,
            ));
        }

        let mut session_operations = Vec::with_capacity(2);
        for (name, kind) in [
            (UNLOCK_KEYS_JSON, PostOperationKind::UnlockKey),
            (DELETE_KEYS_JSON, PostOperationKind::DeleteKey),
        ] {
            let mut written = Vec::new();
            for operation in self.post_operations.of_kind(kind) {
                let authorization = authorize(&operation.target)?;
                let mac = ctx.mac(&operation.mac_data(None, &authorization)?, kind.method())?;
                written.push(JsonValue::from(operation.write(&authorization, &mac)?));
            }
            if !written.is_empty() {
                session_operations.push((name, written));
            }
        }

        let mut t = Transcript::new();
        t.add_string(client_session_id)?;
        t.add_string(server_session_id)?;
        t.add_string(self.config.issuer_uri())?;
        t.add_array(&nonce)?;
        let close_mac = ctx.mac(t.as_bytes(), METHOD_CLOSE_PROVISIONING_SESSION)?;

        let mut writer = message(PROVISIONING_FINALIZATION_REQUEST)?
            .set_string(SERVER_SESSION_ID_JSON, server_session_id)?
            .set_string(SUBMIT_URL_JSON, self.config.issuer_uri())?;
        if !issued_keys.is_empty() {
            writer = writer.set_array(ISSUED_KEYS_JSON, issued_keys)?;
        }
        for (name, operations) in session_operations {
            writer = writer.set_array(name, operations)?;
        }
        let request = writer
            .set_binary(NONCE_JSON, &nonce)?
            .set_binary(MAC_JSON, &close_mac)?
            .build();
        self.close_nonce = Some(nonce);
        Ok(request)
    }
}
