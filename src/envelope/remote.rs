//! Collaborators injected into verification.
//!
//! The envelope layer performs no I/O and no certificate path validation of
//! its own. Callers plug those in through these traits.

use crate::crypto::{Certificate, PublicKey};
use crate::error::JcsResult;

/// Resolves `jku` / `x5u` references.
pub trait RemoteKeyReader {
    /// Fetch the public key published at `uri`.
    fn read_public_key(&self, uri: &str) -> JcsResult<PublicKey>;

    /// Fetch the certificate path published at `uri`, signer first.
    fn read_certificate_path(&self, uri: &str) -> JcsResult<Vec<Certificate>>;
}

/// Decides whether a certificate path is trusted.
pub trait TrustVerifier {
    /// Validate `path` and return the signer's public key.
    ///
    /// Untrusted paths fail with `E306_UntrustedCertificate`.
    fn verify_path(&self, path: &[Certificate]) -> JcsResult<PublicKey>;
}
