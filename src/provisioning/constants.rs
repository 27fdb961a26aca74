//! Protocol constants: key-store method names, KDF labels and wire names.

/// Session attestation algorithm.
pub const ALGORITHM_SESSION_ATTEST_1: &str = "https://webpki.github.io/sks/algorithm#session.1";

/// Key attestation algorithm.
pub const ALGORITHM_KEY_ATTEST_1: &str = "https://webpki.github.io/sks/algorithm#key.1";

/// Placeholder for absent string arguments in MAC transcripts.
pub const CRYPTO_STRING_NOT_AVAILABLE: &str = "#N/A";

/// Device id used when no device certificate is presented.
pub const KDF_ANONYMOUS: &[u8] = b"Anonymous";
/// Key modifier for device attestations.
pub const KDF_DEVICE_ATTESTATION: &[u8] = b"Device Attestation";
/// Key modifier for the session encryption key.
pub const KDF_ENCRYPTION_KEY: &[u8] = b"Encryption Key";
/// Key modifier for the client's HMAC signature.
pub const KDF_EXTERNAL_SIGNATURE: &[u8] = b"External Signature";
/// Label bound into key-management authorizations.
pub const KDF_TARGET_MODIFICATION: &[u8] = b"Target Modification";

pub(crate) const METHOD_CREATE_PUK_POLICY: &[u8] = b"createPukPolicy";
pub(crate) const METHOD_CREATE_PIN_POLICY: &[u8] = b"createPinPolicy";
pub(crate) const METHOD_CREATE_KEY_ENTRY: &[u8] = b"createKeyEntry";
pub(crate) const METHOD_SET_CERTIFICATE_PATH: &[u8] = b"setCertificatePath";
pub(crate) const METHOD_IMPORT_SYMMETRIC_KEY: &[u8] = b"importSymmetricKey";
pub(crate) const METHOD_IMPORT_PRIVATE_KEY: &[u8] = b"importPrivateKey";
pub(crate) const METHOD_ADD_EXTENSION: &[u8] = b"addExtension";
pub(crate) const METHOD_POST_DELETE_KEY: &[u8] = b"postDeleteKey";
pub(crate) const METHOD_POST_UNLOCK_KEY: &[u8] = b"postUnlockKey";
pub(crate) const METHOD_POST_UPDATE_KEY: &[u8] = b"postUpdateKey";
pub(crate) const METHOD_POST_CLONE_KEY_PROTECTION: &[u8] = b"postCloneKeyProtection";
pub(crate) const METHOD_CLOSE_PROVISIONING_SESSION: &[u8] = b"closeProvisioningSession";

/// Plain extension
pub const SUB_TYPE_EXTENSION: u8 = 0x00;
/// Session-encrypted extension
pub const SUB_TYPE_ENCRYPTED_EXTENSION: u8 = 0x01;
/// Property bag
pub const SUB_TYPE_PROPERTY_BAG: u8 = 0x02;
/// Logotype image
pub const SUB_TYPE_LOGOTYPE: u8 = 0x03;

/// Longest accepted protocol identifier.
pub const MAX_LENGTH_ID_TYPE: usize = 32;

/// Longest accepted server seed.
pub const MAX_LENGTH_SERVER_SEED: usize = 64;

/// Message namespace.
pub const KEYGEN2_NS: &str = "https://webpki.github.io/keygen2";

pub(crate) const CONTEXT_JSON: &str = "@context";
pub(crate) const QUALIFIER_JSON: &str = "@qualifier";

pub(crate) const PLATFORM_NEGOTIATION_REQUEST: &str = "PlatformNegotiationRequest";
pub(crate) const PLATFORM_NEGOTIATION_RESPONSE: &str = "PlatformNegotiationResponse";
pub(crate) const PROVISIONING_INITIALIZATION_REQUEST: &str = "ProvisioningInitializationRequest";
pub(crate) const PROVISIONING_INITIALIZATION_RESPONSE: &str = "ProvisioningInitializationResponse";
pub(crate) const CREDENTIAL_DISCOVERY_REQUEST: &str = "CredentialDiscoveryRequest";
pub(crate) const CREDENTIAL_DISCOVERY_RESPONSE: &str = "CredentialDiscoveryResponse";
pub(crate) const KEY_CREATION_REQUEST: &str = "KeyCreationRequest";
pub(crate) const KEY_CREATION_RESPONSE: &str = "KeyCreationResponse";
pub(crate) const PROVISIONING_FINALIZATION_REQUEST: &str = "ProvisioningFinalizationRequest";
pub(crate) const PROVISIONING_FINALIZATION_RESPONSE: &str = "ProvisioningFinalizationResponse";

pub(crate) const SERVER_SESSION_ID_JSON: &str = "serverSessionId";
pub(crate) const CLIENT_SESSION_ID_JSON: &str = "clientSessionId";
pub(crate) const SUBMIT_URL_JSON: &str = "submitUrl";
pub(crate) const PRIVACY_ENABLED_JSON: &str = "privacyEnabled";
pub(crate) const BASIC_CAPABILITIES_JSON: &str = "basicCapabilities";
pub(crate) const ALGORITHMS_JSON: &str = "algorithms";
pub(crate) const CLIENT_ATTRIBUTES_JSON: &str = "clientAttributes";
pub(crate) const EXTENSIONS_JSON: &str = "extensions";

pub(crate) const SESSION_KEY_ALGORITHM_JSON: &str = "sessionKeyAlgorithm";
pub(crate) const SESSION_KEY_LIMIT_JSON: &str = "sessionKeyLimit";
pub(crate) const SESSION_LIFE_TIME_JSON: &str = "sessionLifeTime";
pub(crate) const SERVER_EPHEMERAL_KEY_JSON: &str = "serverEphemeralKey";
pub(crate) const CLIENT_EPHEMERAL_KEY_JSON: &str = "clientEphemeralKey";
pub(crate) const KEY_MANAGEMENT_KEY_JSON: &str = "keyManagementKey";
pub(crate) const SERVER_TIME_JSON: &str = "serverTime";
pub(crate) const CLIENT_TIME_JSON: &str = "clientTime";
pub(crate) const DEVICE_CERTIFICATE_PATH_JSON: &str = "deviceCertificatePath";
pub(crate) const SERVER_CERT_FP_JSON: &str = "serverCertificateFingerprint";
pub(crate) const ATTESTATION_JSON: &str = "attestation";

pub(crate) const LOOKUP_SPECIFIERS_JSON: &str = "lookupSpecifiers";
pub(crate) const LOOKUP_RESULTS_JSON: &str = "lookupResults";
pub(crate) const MATCHING_CREDENTIALS_JSON: &str = "matchingCredentials";
pub(crate) const CERTIFICATE_PATH_JSON: &str = "certificatePath";
pub(crate) const LOCKED_JSON: &str = "locked";
pub(crate) const NONCE_JSON: &str = "nonce";
pub(crate) const ID_JSON: &str = "id";

pub(crate) const KEY_ENTRY_ALGORITHM_JSON: &str = "keyEntryAlgorithm";
pub(crate) const PUK_POLICY_SPECIFIERS_JSON: &str = "pukPolicySpecifiers";
pub(crate) const PIN_POLICY_SPECIFIERS_JSON: &str = "pinPolicySpecifiers";
pub(crate) const KEY_ENTRY_SPECIFIERS_JSON: &str = "keyEntrySpecifiers";
pub(crate) const PUK_POLICY_ID_JSON: &str = "pukPolicyId";
pub(crate) const PIN_POLICY_ID_JSON: &str = "pinPolicyId";
pub(crate) const ENCRYPTED_PUK_JSON: &str = "encryptedPuk";
pub(crate) const ENCRYPTED_PIN_JSON: &str = "encryptedPin";
pub(crate) const FORMAT_JSON: &str = "format";
pub(crate) const RETRY_LIMIT_JSON: &str = "retryLimit";
pub(crate) const MIN_LENGTH_JSON: &str = "minLength";
pub(crate) const MAX_LENGTH_JSON: &str = "maxLength";
pub(crate) const USER_MODIFIABLE_JSON: &str = "userModifiable";
pub(crate) const GROUPING_JSON: &str = "grouping";
pub(crate) const PATTERN_RESTRICTIONS_JSON: &str = "patternRestrictions";
pub(crate) const INPUT_METHOD_JSON: &str = "inputMethod";
pub(crate) const SERVER_SEED_JSON: &str = "serverSeed";
pub(crate) const DEVICE_PIN_PROTECTION_JSON: &str = "devicePinProtection";
pub(crate) const ENABLE_PIN_CACHING_JSON: &str = "enablePinCaching";
pub(crate) const BIOMETRIC_PROTECTION_JSON: &str = "biometricProtection";
pub(crate) const EXPORT_PROTECTION_JSON: &str = "exportProtection";
pub(crate) const DELETE_PROTECTION_JSON: &str = "deleteProtection";
pub(crate) const FRIENDLY_NAME_JSON: &str = "friendlyName";
pub(crate) const APP_USAGE_JSON: &str = "appUsage";
pub(crate) const KEY_ALGORITHM_JSON: &str = "keyAlgorithm";
pub(crate) const KEY_PARAMETERS_JSON: &str = "keyParameters";
pub(crate) const ENDORSED_ALGORITHMS_JSON: &str = "endorsedAlgorithms";
pub(crate) const MAC_JSON: &str = "mac";

pub(crate) const GENERATED_KEYS_JSON: &str = "generatedKeys";
pub(crate) const PUBLIC_KEY_JSON: &str = "publicKey";

pub(crate) const ISSUED_KEYS_JSON: &str = "issuedKeys";
pub(crate) const IMPORT_SYMMETRIC_KEY_JSON: &str = "importSymmetricKey";
pub(crate) const IMPORT_PRIVATE_KEY_JSON: &str = "importPrivateKey";
pub(crate) const ENCRYPTED_KEY_JSON: &str = "encryptedKey";
pub(crate) const TYPE_JSON: &str = "type";
pub(crate) const EXTENSION_DATA_JSON: &str = "extensionData";
pub(crate) const ENCRYPTED_EXTENSION_DATA_JSON: &str = "encryptedExtensionData";
pub(crate) const LOGOTYPE_JSON: &str = "logotype";
pub(crate) const MIME_TYPE_JSON: &str = "mimeType";
pub(crate) const PROPERTIES_JSON: &str = "properties";
pub(crate) const NAME_JSON: &str = "name";
pub(crate) const VALUE_JSON: &str = "value";
pub(crate) const WRITABLE_JSON: &str = "writable";
pub(crate) const UPDATE_KEY_JSON: &str = "updateKey";
pub(crate) const CLONE_KEY_PROTECTION_JSON: &str = "cloneKeyProtection";
pub(crate) const UNLOCK_KEYS_JSON: &str = "unlockKeys";
pub(crate) const DELETE_KEYS_JSON: &str = "deleteKeys";
pub(crate) const CERTIFICATE_FINGERPRINT_JSON: &str = "certificateFingerprint";
pub(crate) const AUTHORIZATION_JSON: &str = "authorization";
pub(crate) const CLOSE_ATTESTATION_JSON: &str = "closeAttestation";
