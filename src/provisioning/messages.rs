//! Client response decoders and message framing.
//!
//! Every KeyGen2 message is a JSON object carrying `@context` (the KeyGen2
//! namespace) and `@qualifier` (the message name). Decoders are strict: the
//! framing must match and unknown properties are rejected.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::constants::{
    ALGORITHMS_JSON, ATTESTATION_JSON, BASIC_CAPABILITIES_JSON, CERTIFICATE_PATH_JSON,
    CLIENT_ATTRIBUTES_JSON, CLIENT_EPHEMERAL_KEY_JSON, CLIENT_SESSION_ID_JSON, CLIENT_TIME_JSON,
    CLOSE_ATTESTATION_JSON, CONTEXT_JSON, CREDENTIAL_DISCOVERY_RESPONSE,
    DEVICE_CERTIFICATE_PATH_JSON, EXTENSIONS_JSON, GENERATED_KEYS_JSON, ID_JSON,
    KEY_CREATION_RESPONSE, KEYGEN2_NS, LOCKED_JSON, LOOKUP_RESULTS_JSON,
    MATCHING_CREDENTIALS_JSON, PLATFORM_NEGOTIATION_RESPONSE, PROVISIONING_FINALIZATION_RESPONSE,
    PROVISIONING_INITIALIZATION_RESPONSE, PUBLIC_KEY_JSON, QUALIFIER_JSON, SERVER_CERT_FP_JSON,
    SERVER_SESSION_ID_JSON, SERVER_TIME_JSON,
};
use super::types::ProtocolPhase;
use crate::crypto::{Certificate, PublicKey};
use crate::envelope::SIGNATURE_JSON;
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, ObjectWriter};

/// Start a message with its framing properties.
pub(crate) fn message(qualifier: &str) -> JcsResult<ObjectWriter> {
    ObjectWriter::new()
        .set_string(CONTEXT_JSON, KEYGEN2_NS)?
        .set_string(QUALIFIER_JSON, qualifier)
}

fn check_framing(object: &JsonObject, qualifier: &str) -> JcsResult<()> {
    let context = object.get_string(CONTEXT_JSON)?;
    if context != KEYGEN2_NS {
        return Err(ErrorCode::E208_InvalidValue(
            CONTEXT_JSON.to_string(),
            context.to_string(),
        ));
    }
    let found = object.get_string(QUALIFIER_JSON)?;
    if found != qualifier {
        return Err(ErrorCode::E208_InvalidValue(
            QUALIFIER_JSON.to_string(),
            found.to_string(),
        ));
    }
    Ok(())
}

fn read_certificate_path(object: &JsonObject, name: &str) -> JcsResult<Vec<Certificate>> {
    let path: Vec<Certificate> = object
        .get_binary_array(name)?
        .into_iter()
        .map(Certificate)
        .collect();
    if path.is_empty() {
        return Err(ErrorCode::E208_InvalidValue(
            name.to_string(),
            "empty certificate path".to_string(),
        ));
    }
    Ok(path)
}

fn string_set(object: &JsonObject, name: &str) -> JcsResult<BTreeSet<String>> {
    Ok(object
        .get_string_array_conditional(name)?
        .into_iter()
        .collect())
}

/// Algorithms, client attributes and extensions a session may use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Algorithm URIs
    pub algorithms: BTreeSet<String>,
    /// Client attribute URIs
    pub client_attributes: BTreeSet<String>,
    /// Extension type URIs
    pub extensions: BTreeSet<String>,
}

impl Capabilities {
    /// Nothing requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query an algorithm.
    pub fn add_algorithm(&mut self, uri: impl Into<String>) -> &mut Self {
        self.algorithms.insert(uri.into());
        self
    }

    /// Query a client attribute.
    pub fn add_client_attribute(&mut self, uri: impl Into<String>) -> &mut Self {
        self.client_attributes.insert(uri.into());
        self
    }

    /// Query an extension.
    pub fn add_extension(&mut self, uri: impl Into<String>) -> &mut Self {
        self.extensions.insert(uri.into());
        self
    }

    /// True when no capability is listed.
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty() && self.client_attributes.is_empty() && self.extensions.is_empty()
    }

    pub(crate) fn write(&self) -> JcsResult<JsonObject> {
        let mut writer = ObjectWriter::new();
        for (name, set) in [
            (ALGORITHMS_JSON, &self.algorithms),
            (CLIENT_ATTRIBUTES_JSON, &self.client_attributes),
            (EXTENSIONS_JSON, &self.extensions),
        ] {
            if !set.is_empty() {
                let values: Vec<&str> = set.iter().map(String::as_str).collect();
                writer = writer.set_string_array(name, &values)?;
            }
        }
        Ok(writer.build())
    }

    /// Decode a `basicCapabilities` object.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        object.expect_only(&[ALGORITHMS_JSON, CLIENT_ATTRIBUTES_JSON, EXTENSIONS_JSON])?;
        Ok(Self {
            algorithms: string_set(object, ALGORITHMS_JSON)?,
            client_attributes: string_set(object, CLIENT_ATTRIBUTES_JSON)?,
            extensions: string_set(object, EXTENSIONS_JSON)?,
        })
    }
}

/// Answer to the platform negotiation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformNegotiationResponse {
    /// Echoed server session id
    pub server_session_id: String,
    /// The subset of the queried capabilities the device supports
    pub capabilities: Capabilities,
}

impl PlatformNegotiationResponse {
    /// Decode and validate.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        check_framing(object, PLATFORM_NEGOTIATION_RESPONSE)?;
        object.expect_only(&[
            CONTEXT_JSON,
            QUALIFIER_JSON,
            SERVER_SESSION_ID_JSON,
            BASIC_CAPABILITIES_JSON,
        ])?;
        let capabilities = match object.get_object_conditional(BASIC_CAPABILITIES_JSON)? {
            Some(c) => Capabilities::decode(c)?,
            None => Capabilities::new(),
        };
        Ok(Self {
            server_session_id: object.get_string(SERVER_SESSION_ID_JSON)?.to_string(),
            capabilities,
        })
    }
}

/// Answer to the provisioning initialization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningInitializationResponse {
    /// Echoed server session id
    pub server_session_id: String,
    /// Session id chosen by the device
    pub client_session_id: String,
    /// Echoed server time
    pub server_time: DateTime<Utc>,
    /// Device time, bound into the session attestation
    pub client_time: DateTime<Utc>,
    /// Device ephemeral key
    pub client_ephemeral_key: p256::PublicKey,
    /// Device certificate path unless privacy is enabled
    pub device_certificate_path: Option<Vec<Certificate>>,
    /// SHA-256 of the server's TLS certificate
    pub server_certificate_fingerprint: Option<Vec<u8>>,
    /// Session attestation
    pub attestation: Vec<u8>,
    // The whole message, needed to check its HMAC signature
    pub(crate) signed_object: JsonObject,
}

impl ProvisioningInitializationResponse {
    /// Decode and validate. The signature is checked by the state machine
    /// once the session key exists.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        check_framing(object, PROVISIONING_INITIALIZATION_RESPONSE)?;
        object.expect_only(&[
            CONTEXT_JSON,
            QUALIFIER_JSON,
            SERVER_SESSION_ID_JSON,
            CLIENT_SESSION_ID_JSON,
            SERVER_TIME_JSON,
            CLIENT_TIME_JSON,
            CLIENT_EPHEMERAL_KEY_JSON,
            DEVICE_CERTIFICATE_PATH_JSON,
            SERVER_CERT_FP_JSON,
            ATTESTATION_JSON,
            SIGNATURE_JSON,
        ])?;
        object.get_object(SIGNATURE_JSON)?;
        let client_ephemeral_key = PublicKey::from_jwk(object.get_object(CLIENT_EPHEMERAL_KEY_JSON)?)?
            .as_ec()?
            .clone();
        let device_certificate_path = if object.contains(DEVICE_CERTIFICATE_PATH_JSON) {
            Some(read_certificate_path(object, DEVICE_CERTIFICATE_PATH_JSON)?)
        } else {
            None
        };
        Ok(Self {
            server_session_id: object.get_string(SERVER_SESSION_ID_JSON)?.to_string(),
            client_session_id: object.get_string(CLIENT_SESSION_ID_JSON)?.to_string(),
            server_time: object.get_date_time(SERVER_TIME_JSON)?,
            client_time: object.get_date_time(CLIENT_TIME_JSON)?,
            client_ephemeral_key,
            device_certificate_path,
            server_certificate_fingerprint: object.get_binary_conditional(SERVER_CERT_FP_JSON)?,
            attestation: object.get_binary(ATTESTATION_JSON)?,
            signed_object: object.clone(),
        })
    }
}

/// A credential from an earlier session matching a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingCredential {
    /// Client session id of the issuing session
    pub client_session_id: String,
    /// Server session id of the issuing session
    pub server_session_id: String,
    /// Certificate path, end-entity first
    pub certificate_path: Vec<Certificate>,
    /// PIN blocked
    pub locked: bool,
}

/// Result for one lookup specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    /// Lookup specifier id
    pub id: String,
    /// Matches, possibly none
    pub matching_credentials: Vec<MatchingCredential>,
}

/// Answer to the credential discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDiscoveryResponse {
    /// Echoed client session id
    pub client_session_id: String,
    /// Echoed server session id
    pub server_session_id: String,
    /// One result per lookup specifier
    pub lookup_results: Vec<LookupResult>,
}

impl CredentialDiscoveryResponse {
    /// Decode and validate.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        check_framing(object, CREDENTIAL_DISCOVERY_RESPONSE)?;
        object.expect_only(&[
            CONTEXT_JSON,
            QUALIFIER_JSON,
            CLIENT_SESSION_ID_JSON,
            SERVER_SESSION_ID_JSON,
            LOOKUP_RESULTS_JSON,
        ])?;
        let mut lookup_results = Vec::new();
        for result in object.get_object_array(LOOKUP_RESULTS_JSON)? {
            result.expect_only(&[ID_JSON, MATCHING_CREDENTIALS_JSON])?;
            let mut matching_credentials = Vec::new();
            for credential in result.get_object_array(MATCHING_CREDENTIALS_JSON)? {
                credential.expect_only(&[
                    CLIENT_SESSION_ID_JSON,
                    SERVER_SESSION_ID_JSON,
                    CERTIFICATE_PATH_JSON,
                    LOCKED_JSON,
                ])?;
                matching_credentials.push(MatchingCredential {
                    client_session_id: credential.get_string(CLIENT_SESSION_ID_JSON)?.to_string(),
                    server_session_id: credential.get_string(SERVER_SESSION_ID_JSON)?.to_string(),
                    certificate_path: read_certificate_path(credential, CERTIFICATE_PATH_JSON)?,
                    locked: credential.get_bool_conditional(LOCKED_JSON, false)?,
                });
            }
            lookup_results.push(LookupResult {
                id: result.get_string(ID_JSON)?.to_string(),
                matching_credentials,
            });
        }
        Ok(Self {
            client_session_id: object.get_string(CLIENT_SESSION_ID_JSON)?.to_string(),
            server_session_id: object.get_string(SERVER_SESSION_ID_JSON)?.to_string(),
            lookup_results,
        })
    }
}

/// A key generated by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    /// Key id from the request
    pub id: String,
    /// Generated public key
    pub public_key: PublicKey,
    /// Key attestation
    pub attestation: Vec<u8>,
}

/// Answer to the key creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCreationResponse {
    /// Echoed client session id
    pub client_session_id: String,
    /// Echoed server session id
    pub server_session_id: String,
    /// Generated keys in device order
    pub generated_keys: Vec<GeneratedKey>,
}

impl KeyCreationResponse {
    /// Decode and validate.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        check_framing(object, KEY_CREATION_RESPONSE)?;
        object.expect_only(&[
            CONTEXT_JSON,
            QUALIFIER_JSON,
            CLIENT_SESSION_ID_JSON,
            SERVER_SESSION_ID_JSON,
            GENERATED_KEYS_JSON,
        ])?;
        let mut generated_keys = Vec::new();
        for key in object.get_object_array(GENERATED_KEYS_JSON)? {
            key.expect_only(&[ID_JSON, PUBLIC_KEY_JSON, ATTESTATION_JSON])?;
            generated_keys.push(GeneratedKey {
                id: key.get_string(ID_JSON)?.to_string(),
                public_key: PublicKey::from_jwk(key.get_object(PUBLIC_KEY_JSON)?)?,
                attestation: key.get_binary(ATTESTATION_JSON)?,
            });
        }
        Ok(Self {
            client_session_id: object.get_string(CLIENT_SESSION_ID_JSON)?.to_string(),
            server_session_id: object.get_string(SERVER_SESSION_ID_JSON)?.to_string(),
            generated_keys,
        })
    }
}

/// Answer to the finalization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningFinalizationResponse {
    /// Echoed client session id
    pub client_session_id: String,
    /// Echoed server session id
    pub server_session_id: String,
    /// Attestation of the close nonce
    pub close_attestation: Vec<u8>,
}

impl ProvisioningFinalizationResponse {
    /// Decode and validate.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        check_framing(object, PROVISIONING_FINALIZATION_RESPONSE)?;
        object.expect_only(&[
            CONTEXT_JSON,
            QUALIFIER_JSON,
            CLIENT_SESSION_ID_JSON,
            SERVER_SESSION_ID_JSON,
            CLOSE_ATTESTATION_JSON,
        ])?;
        Ok(Self {
            client_session_id: object.get_string(CLIENT_SESSION_ID_JSON)?.to_string(),
            server_session_id: object.get_string(SERVER_SESSION_ID_JSON)?.to_string(),
            close_attestation: object.get_binary(CLOSE_ATTESTATION_JSON)?,
        })
    }
}

/// Any client response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMessage {
    /// `PlatformNegotiationResponse`
    PlatformNegotiation(PlatformNegotiationResponse),
    /// `ProvisioningInitializationResponse`
    ProvisioningInitialization(Box<ProvisioningInitializationResponse>),
    /// `CredentialDiscoveryResponse`
    CredentialDiscovery(CredentialDiscoveryResponse),
    /// `KeyCreationResponse`
    KeyCreation(KeyCreationResponse),
    /// `ProvisioningFinalizationResponse`
    ProvisioningFinalization(ProvisioningFinalizationResponse),
}

impl ResponseMessage {
    /// Decode by `@qualifier`.
    pub fn decode(object: &JsonObject) -> JcsResult<Self> {
        match object.get_string(QUALIFIER_JSON)? {
            PLATFORM_NEGOTIATION_RESPONSE => {
                PlatformNegotiationResponse::decode(object).map(Self::PlatformNegotiation)
            }
            PROVISIONING_INITIALIZATION_RESPONSE => ProvisioningInitializationResponse::decode(
                object,
            )
            .map(|r| Self::ProvisioningInitialization(Box::new(r))),
            CREDENTIAL_DISCOVERY_RESPONSE => {
                CredentialDiscoveryResponse::decode(object).map(Self::CredentialDiscovery)
            }
            KEY_CREATION_RESPONSE => KeyCreationResponse::decode(object).map(Self::KeyCreation),
            PROVISIONING_FINALIZATION_RESPONSE => {
                ProvisioningFinalizationResponse::decode(object).map(Self::ProvisioningFinalization)
            }
            other => Err(ErrorCode::E208_InvalidValue(
                QUALIFIER_JSON.to_string(),
                other.to_string(),
            )),
        }
    }

    /// Phase this response completes.
    pub fn phase(&self) -> ProtocolPhase {
        match self {
            Self::PlatformNegotiation(_) => ProtocolPhase::PlatformNegotiation,
            Self::ProvisioningInitialization(_) => ProtocolPhase::ProvisioningInitialization,
            Self::CredentialDiscovery(_) => ProtocolPhase::CredentialDiscovery,
            Self::KeyCreation(_) => ProtocolPhase::KeyCreation,
            Self::ProvisioningFinalization(_) => ProtocolPhase::ProvisioningFinalization,
        }
    }
}
