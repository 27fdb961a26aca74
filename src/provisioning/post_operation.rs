//! Post-provisioning operations on keys issued in earlier sessions.

use sha2::{Digest, Sha256};

use super::constants::{
    AUTHORIZATION_JSON, CERTIFICATE_FINGERPRINT_JSON, CLIENT_SESSION_ID_JSON,
    KDF_TARGET_MODIFICATION, MAC_JSON, METHOD_POST_CLONE_KEY_PROTECTION, METHOD_POST_DELETE_KEY,
    METHOD_POST_UNLOCK_KEY, METHOD_POST_UPDATE_KEY, SERVER_SESSION_ID_JSON,
};
use super::transcript::Transcript;
use crate::crypto::{Certificate, PublicKey};
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, ObjectWriter};

/// Kind of operation on a target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostOperationKind {
    /// Remove the target
    DeleteKey,
    /// Reset the target's PIN retry counter
    UnlockKey,
    /// Replace the target with a new key
    UpdateKey,
    /// Give a new key the target's PIN protection
    CloneKeyProtection,
}

impl PostOperationKind {
    pub(crate) fn method(self) -> &'static [u8] {
        match self {
            Self::DeleteKey => METHOD_POST_DELETE_KEY,
            Self::UnlockKey => METHOD_POST_UNLOCK_KEY,
            Self::UpdateKey => METHOD_POST_UPDATE_KEY,
            Self::CloneKeyProtection => METHOD_POST_CLONE_KEY_PROTECTION,
        }
    }

    /// True for operations attached to a newly created key.
    pub fn is_key_level(self) -> bool {
        matches!(self, Self::UpdateKey | Self::CloneKeyProtection)
    }
}

/// A key from an earlier provisioning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetKey {
    /// Client session id of the session that issued the key
    pub client_session_id: String,
    /// Server session id of that session
    pub server_session_id: String,
    /// End-entity certificate of the key
    pub certificate: Certificate,
    /// Key-management key of that session
    pub key_management_key: PublicKey,
}

impl TargetKey {
    /// Identify a target key.
    pub fn new(
        client_session_id: impl Into<String>,
        server_session_id: impl Into<String>,
        certificate: Certificate,
        key_management_key: PublicKey,
    ) -> Self {
        Self {
            client_session_id: client_session_id.into(),
            server_session_id: server_session_id.into(),
            certificate,
            key_management_key,
        }
    }

    /// Same session ids and certificate. The key-management key does not
    /// take part.
    pub fn same_target(&self, other: &TargetKey) -> bool {
        self.client_session_id == other.client_session_id
            && self.server_session_id == other.server_session_id
            && self.certificate == other.certificate
    }

    /// SHA-256 of the certificate.
    pub fn certificate_fingerprint(&self) -> Vec<u8> {
        Sha256::digest(self.certificate.as_der()).to_vec()
    }

    /// Data the key-management key signs to authorize an operation within
    /// the current session.
    pub fn authorization_data(
        &self,
        client_session_id: &str,
        server_session_id: &str,
    ) -> JcsResult<Vec<u8>> {
        let mut t = Transcript::new();
        t.add_array(KDF_TARGET_MODIFICATION)?;
        t.add_string(client_session_id)?;
        t.add_string(server_session_id)?;
        t.add_array(&self.certificate_fingerprint())?;
        Ok(t.into_bytes())
    }
}

/// A queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOperation {
    /// What to do
    pub kind: PostOperationKind,
    /// Which key
    pub target: TargetKey,
}

impl PostOperation {
    /// MAC transcript. Key-level operations are bound to the new key's
    /// certificate.
    pub fn mac_data(
        &self,
        new_key_certificate: Option<&[u8]>,
        authorization: &[u8],
    ) -> JcsResult<Vec<u8>> {
        let mut t = Transcript::new();
        if let Some(certificate) = new_key_certificate {
            t.add_array(certificate)?;
        }
        t.add_string(&self.target.client_session_id)?;
        t.add_string(&self.target.server_session_id)?;
        t.add_array(&self.target.certificate_fingerprint())?;
        t.add_array(authorization)?;
        Ok(t.into_bytes())
    }

    pub(crate) fn write(&self, authorization: &[u8], mac: &[u8]) -> JcsResult<JsonObject> {
        Ok(ObjectWriter::new()
            .set_string(CLIENT_SESSION_ID_JSON, self.target.client_session_id.as_str())?
            .set_string(SERVER_SESSION_ID_JSON, self.target.server_session_id.as_str())?
            .set_binary(
                CERTIFICATE_FINGERPRINT_JSON,
                &self.target.certificate_fingerprint(),
            )?
            .set_binary(AUTHORIZATION_JSON, authorization)?
            .set_binary(MAC_JSON, mac)?
            .build())
    }
}

/// All operations queued in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostOperations {
    operations: Vec<PostOperation>,
}

impl PostOperations {
    /// Check `operation` against the queue without adding it.
    ///
    /// On the same target, a delete combines with nothing and an update
    /// happens at most once.
    pub fn check(&self, operation: &PostOperation) -> JcsResult<()> {
        for queued in self
            .operations
            .iter()
            .filter(|q| q.target.same_target(&operation.target))
        {
            let kinds = [queued.kind, operation.kind];
            if kinds.contains(&PostOperationKind::DeleteKey) {
                return Err(ErrorCode::E504_PostOperationConflict(
                    "delete cannot be combined with other management operations".to_string(),
                ));
            }
            if kinds.contains(&PostOperationKind::UpdateKey) {
                return Err(ErrorCode::E504_PostOperationConflict(
                    "update can only be performed once per key".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Queue an operation after [`PostOperations::check`].
    pub fn add(&mut self, operation: PostOperation) -> JcsResult<()> {
        self.check(&operation)?;
        self.operations.push(operation);
        Ok(())
    }

    /// Queued operations of one kind, in insertion order.
    pub fn of_kind(&self, kind: PostOperationKind) -> impl Iterator<Item = &PostOperation> {
        self.operations.iter().filter(move |o| o.kind == kind)
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
