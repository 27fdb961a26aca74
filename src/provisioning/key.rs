//! Requested key entries.
//!
//! A [`Key`] is created by [`ServerState`](super::ServerState), configured by
//! the issuer through the setters below, written into the key creation
//! request, filled in from the key creation response and finally written
//! again, with certificates and imports, into the finalization request.

use std::collections::BTreeSet;

use super::constants::{
    ALGORITHM_KEY_ATTEST_1, APP_USAGE_JSON, BIOMETRIC_PROTECTION_JSON, CERTIFICATE_PATH_JSON,
    CLONE_KEY_PROTECTION_JSON, CRYPTO_STRING_NOT_AVAILABLE, DELETE_PROTECTION_JSON,
    DEVICE_PIN_PROTECTION_JSON, ENABLE_PIN_CACHING_JSON, ENCRYPTED_KEY_JSON, ENCRYPTED_PIN_JSON,
    ENDORSED_ALGORITHMS_JSON, EXPORT_PROTECTION_JSON, EXTENSIONS_JSON, FRIENDLY_NAME_JSON, ID_JSON,
    IMPORT_PRIVATE_KEY_JSON, IMPORT_SYMMETRIC_KEY_JSON, KEY_ALGORITHM_JSON, KEY_PARAMETERS_JSON,
    MAC_JSON, METHOD_ADD_EXTENSION, METHOD_CREATE_KEY_ENTRY, METHOD_IMPORT_PRIVATE_KEY,
    METHOD_IMPORT_SYMMETRIC_KEY, METHOD_SET_CERTIFICATE_PATH, PIN_POLICY_ID_JSON,
    SERVER_SEED_JSON, UPDATE_KEY_JSON,
};
use super::extension::Extension;
use super::policy::PinPolicy;
use super::post_operation::{PostOperation, PostOperationKind};
use super::transcript::{MacContext, Transcript};
use super::types::{AppUsage, BiometricProtection, DeleteProtection, ExportProtection, KeySpecifier};
use super::validation::{validate_pin_caching, validate_server_seed};
use crate::crypto::{Certificate, PublicKey};
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, JsonValue, ObjectWriter};

/// A key the device is asked to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub(crate) id: String,
    pub(crate) app_usage: AppUsage,
    pub(crate) specifier: KeySpecifier,
    pub(crate) pin_policy_id: Option<String>,
    pub(crate) encrypted_pin: Option<Vec<u8>>,
    pub(crate) device_pin_protection: bool,
    pub(crate) enable_pin_caching: Option<bool>,
    pub(crate) biometric_protection: Option<BiometricProtection>,
    pub(crate) export_protection: Option<ExportProtection>,
    pub(crate) delete_protection: Option<DeleteProtection>,
    pub(crate) friendly_name: Option<String>,
    pub(crate) server_seed: Option<Vec<u8>>,
    pub(crate) endorsed_algorithms: BTreeSet<String>,
    pub(crate) extensions: Vec<Extension>,
    pub(crate) certificate_path: Option<Vec<Certificate>>,
    pub(crate) symmetric_key: Option<Vec<u8>>,
    pub(crate) private_key: Option<Vec<u8>>,
    pub(crate) post_operation: Option<PostOperation>,
    // Counter value reserved right after the createKeyEntry MAC
    pub(crate) attestation_counter: Option<[u8; 2]>,
    pub(crate) public_key: Option<PublicKey>,
    pub(crate) attestation: Option<Vec<u8>>,
}

impl Key {
    pub(crate) fn new(
        id: String,
        app_usage: AppUsage,
        specifier: KeySpecifier,
        pin_policy_id: Option<String>,
        encrypted_pin: Option<Vec<u8>>,
        device_pin_protection: bool,
    ) -> Self {
        Self {
            id,
            app_usage,
            specifier,
            pin_policy_id,
            encrypted_pin,
            device_pin_protection,
            enable_pin_caching: None,
            biometric_protection: None,
            export_protection: None,
            delete_protection: None,
            friendly_name: None,
            server_seed: None,
            endorsed_algorithms: BTreeSet::new(),
            extensions: Vec::new(),
            certificate_path: None,
            symmetric_key: None,
            private_key: None,
            post_operation: None,
            attestation_counter: None,
            public_key: None,
            attestation: None,
        }
    }

    /// Key id, e.g. `Key.1`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Intended usage.
    pub fn app_usage(&self) -> AppUsage {
        self.app_usage
    }

    /// Requested algorithm.
    pub fn key_specifier(&self) -> &KeySpecifier {
        &self.specifier
    }

    /// PIN policy governing this key.
    pub fn pin_policy_id(&self) -> Option<&str> {
        self.pin_policy_id.as_deref()
    }

    /// Session-encrypted preset PIN.
    pub fn encrypted_pin(&self) -> Option<&[u8]> {
        self.encrypted_pin.as_deref()
    }

    /// Protected by the device PIN.
    pub fn device_pin_protection(&self) -> bool {
        self.device_pin_protection
    }

    /// Protected by a PIN policy or the device PIN.
    pub fn is_pin_protected(&self) -> bool {
        self.pin_policy_id.is_some() || self.device_pin_protection
    }

    /// Friendly name shown by the key store.
    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    /// Public key from the key creation response.
    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    /// Key attestation from the key creation response.
    pub fn attestation(&self) -> Option<&[u8]> {
        self.attestation.as_deref()
    }

    /// Certificate path, end-entity first.
    pub fn certificate_path(&self) -> Option<&[Certificate]> {
        self.certificate_path.as_deref()
    }

    /// Extensions in insertion order.
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Clone or update operation bound to this key.
    pub fn post_operation(&self) -> Option<&PostOperation> {
        self.post_operation.as_ref()
    }

    /// Property bags among the extensions.
    pub fn property_bags(&self) -> impl Iterator<Item = &Extension> {
        self.extensions
            .iter()
            .filter(|e| matches!(e, Extension::PropertyBag { .. }))
    }

    /// Set the friendly name.
    pub fn set_friendly_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Set the server seed, at most 64 bytes.
    pub fn set_server_seed(&mut self, seed: Vec<u8>) -> JcsResult<&mut Self> {
        validate_server_seed(&seed)?;
        self.server_seed = Some(seed);
        Ok(self)
    }

    /// Enable or disable PIN caching. Enabling requires a trusted-GUI PIN
    /// policy, checked when the request is written.
    pub fn set_enable_pin_caching(&mut self, flag: bool) -> &mut Self {
        self.enable_pin_caching = Some(flag);
        self
    }

    /// Set the biometric option.
    pub fn set_biometric_protection(&mut self, protection: BiometricProtection) -> &mut Self {
        self.biometric_protection = Some(protection);
        self
    }

    /// Set the export policy. Defaults to non-exportable.
    pub fn set_export_protection(&mut self, protection: ExportProtection) -> &mut Self {
        self.export_protection = Some(protection);
        self
    }

    /// Set the delete policy.
    pub fn set_delete_protection(&mut self, protection: DeleteProtection) -> &mut Self {
        self.delete_protection = Some(protection);
        self
    }

    /// Replace the endorsed algorithm URIs. They are kept sorted.
    pub fn set_endorsed_algorithms<S: AsRef<str>>(&mut self, algorithms: &[S]) -> &mut Self {
        self.endorsed_algorithms = algorithms.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    /// Attach the issued certificate path, end-entity first.
    pub fn set_certificate_path(&mut self, path: Vec<Certificate>) -> &mut Self {
        self.certificate_path = Some(path);
        self
    }

    /// Import a symmetric key. Encrypted under the session key when written.
    pub fn set_symmetric_key(&mut self, key: Vec<u8>) -> &mut Self {
        self.symmetric_key = Some(key);
        self
    }

    /// Import a PKCS#8 private key. Encrypted under the session key when
    /// written.
    pub fn set_private_key(&mut self, pkcs8_der: Vec<u8>) -> &mut Self {
        self.private_key = Some(pkcs8_der);
        self
    }

    /// Add an extension. Types are unique per key.
    pub fn add_extension(&mut self, extension: Extension) -> JcsResult<&mut Self> {
        if self
            .extensions
            .iter()
            .any(|e| e.extension_type() == extension.extension_type())
        {
            return Err(ErrorCode::E600_DuplicateIdentifier(
                extension.extension_type().to_string(),
            ));
        }
        self.extensions.push(extension);
        Ok(self)
    }

    pub(crate) fn set_post_operation(&mut self, operation: PostOperation) -> JcsResult<()> {
        self.check_post_operation()?;
        self.post_operation = Some(operation);
        Ok(())
    }

    pub(crate) fn check_post_operation(&self) -> JcsResult<()> {
        if self.post_operation.is_some() {
            return Err(ErrorCode::E504_PostOperationConflict(format!(
                "clone or update already set for {}",
                self.id
            )));
        }
        if self.is_pin_protected() {
            return Err(ErrorCode::E504_PostOperationConflict(format!(
                "clone/update key {} cannot be PIN protected",
                self.id
            )));
        }
        Ok(())
    }

    fn end_entity_certificate(&self) -> JcsResult<&Certificate> {
        self.certificate_path
            .as_deref()
            .and_then(<[Certificate]>::first)
            .ok_or_else(|| {
                ErrorCode::E506_PolicyViolation(format!("missing certificate path for {}", self.id))
            })
    }

    /// Key entry of the key creation request.
    pub(crate) fn write_request(
        &mut self,
        ctx: &mut dyn MacContext,
        pin_policy: Option<&PinPolicy>,
    ) -> JcsResult<JsonObject> {
        let enable_pin_caching = self.enable_pin_caching.unwrap_or(false);
        validate_pin_caching(enable_pin_caching, pin_policy)?;

        let mut t = Transcript::new();
        t.add_string(&self.id)?;
        t.add_string(ALGORITHM_KEY_ATTEST_1)?;
        t.add_array(self.server_seed.as_deref().unwrap_or_default())?;
        t.add_string(
            self.pin_policy_id
                .as_deref()
                .unwrap_or(CRYPTO_STRING_NOT_AVAILABLE),
        )?;
        match &self.encrypted_pin {
            Some(pin) => t.add_array(pin)?,
            None => t.add_string(CRYPTO_STRING_NOT_AVAILABLE)?,
        }
        t.add_bool(self.device_pin_protection);
        t.add_bool(enable_pin_caching);
        t.add_byte(
            self.biometric_protection
                .unwrap_or(BiometricProtection::None)
                .sks_value(),
        );
        t.add_byte(
            self.export_protection
                .unwrap_or(ExportProtection::NonExportable)
                .sks_value(),
        );
        t.add_byte(
            self.delete_protection
                .unwrap_or(DeleteProtection::None)
                .sks_value(),
        );
        t.add_byte(self.app_usage.sks_value());
        t.add_string(self.friendly_name.as_deref().unwrap_or(""))?;
        t.add_string(self.specifier.algorithm.uri())?;
        t.add_array(self.specifier.parameters.as_deref().unwrap_or_default())?;
        for algorithm in &self.endorsed_algorithms {
            t.add_string(algorithm)?;
        }
        let mac = ctx.mac(t.as_bytes(), METHOD_CREATE_KEY_ENTRY)?;
        self.attestation_counter = Some(ctx.reserve_counter()?);

        let mut writer = ObjectWriter::new()
            .set_string(ID_JSON, self.id.as_str())?
            .set_string_conditional(PIN_POLICY_ID_JSON, self.pin_policy_id.as_deref())?;
        if let Some(seed) = &self.server_seed {
            writer = writer.set_binary(SERVER_SEED_JSON, seed)?;
        }
        if self.device_pin_protection {
            writer = writer.set_bool(DEVICE_PIN_PROTECTION_JSON, true)?;
        }
        if let Some(pin) = &self.encrypted_pin {
            writer = writer.set_binary(ENCRYPTED_PIN_JSON, pin)?;
        }
        if let Some(flag) = self.enable_pin_caching {
            writer = writer.set_bool(ENABLE_PIN_CACHING_JSON, flag)?;
        }
        if let Some(p) = self.biometric_protection {
            writer = writer.set_string(BIOMETRIC_PROTECTION_JSON, p.protocol_name())?;
        }
        if let Some(p) = self.export_protection {
            writer = writer.set_string(EXPORT_PROTECTION_JSON, p.protocol_name())?;
        }
        if let Some(p) = self.delete_protection {
            writer = writer.set_string(DELETE_PROTECTION_JSON, p.protocol_name())?;
        }
        writer = writer
            .set_string_conditional(FRIENDLY_NAME_JSON, self.friendly_name.as_deref())?
            .set_string(APP_USAGE_JSON, self.app_usage.protocol_name())?
            .set_string(KEY_ALGORITHM_JSON, self.specifier.algorithm.uri())?;
        if let Some(parameters) = &self.specifier.parameters {
            writer = writer.set_binary(KEY_PARAMETERS_JSON, parameters)?;
        }
        if !self.endorsed_algorithms.is_empty() {
            let algorithms: Vec<&str> = self.endorsed_algorithms.iter().map(String::as_str).collect();
            writer = writer.set_string_array(ENDORSED_ALGORITHMS_JSON, &algorithms)?;
        }
        Ok(writer.set_binary(MAC_JSON, &mac)?.build())
    }

    /// Issued key entry of the finalization request. `authorization` is the
    /// key-management signature for a bound clone or update operation.
    pub(crate) fn write_finalization(
        &self,
        ctx: &mut dyn MacContext,
        authorization: Option<&[u8]>,
    ) -> JcsResult<JsonObject> {
        let path = self.certificate_path.as_deref().unwrap_or_default();
        let ee = self.end_entity_certificate()?.as_der().to_vec();

        let mut t = Transcript::new();
        t.add_string(&self.id)?;
        for certificate in path {
            t.add_array(certificate.as_der())?;
        }
        let path_mac = ctx.mac(t.as_bytes(), METHOD_SET_CERTIFICATE_PATH)?;

        let certificates: Vec<&[u8]> = path.iter().map(Certificate::as_der).collect();
        let mut writer = ObjectWriter::new()
            .set_string(ID_JSON, self.id.as_str())?
            .set_binary_array(CERTIFICATE_PATH_JSON, &certificates)?
            .set_binary(MAC_JSON, &path_mac)?;

        for (name, method, plain) in [
            (
                IMPORT_SYMMETRIC_KEY_JSON,
                METHOD_IMPORT_SYMMETRIC_KEY,
                &self.symmetric_key,
            ),
            (
                IMPORT_PRIVATE_KEY_JSON,
                METHOD_IMPORT_PRIVATE_KEY,
                &self.private_key,
            ),
        ] {
            if let Some(plain) = plain {
                let encrypted = ctx.encrypt(plain)?;
                let mut t = Transcript::new();
                t.add_array(&ee)?;
                t.add_array(&encrypted)?;
                let mac = ctx.mac(t.as_bytes(), method)?;
                writer = writer.set_object(
                    name,
                    ObjectWriter::new()
                        .set_binary(ENCRYPTED_KEY_JSON, &encrypted)?
                        .set_binary(MAC_JSON, &mac)?,
                )?;
            }
        }

        if !self.extensions.is_empty() {
            let mut array = Vec::with_capacity(self.extensions.len());
            for extension in &self.extensions {
                let mac = ctx.mac(&extension.mac_data(&ee)?, METHOD_ADD_EXTENSION)?;
                array.push(JsonValue::from(extension.write(&mac)?));
            }
            writer = writer.set_array(EXTENSIONS_JSON, array)?;
        }

        if let Some(operation) = &self.post_operation {
            let authorization = authorization.ok_or_else(|| {
                ErrorCode::E500_ProtocolState(format!("missing authorization for {}", self.id))
            })?;
            let mac = ctx.mac(
                &operation.mac_data(Some(&ee), authorization)?,
                operation.kind.method(),
            )?;
            let name = match operation.kind {
                PostOperationKind::UpdateKey => UPDATE_KEY_JSON,
                _ => CLONE_KEY_PROTECTION_JSON,
            };
            writer = writer.set_object(name, operation.write(authorization, &mac)?)?;
        }
        Ok(writer.build())
    }
}
