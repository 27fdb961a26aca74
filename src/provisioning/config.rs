//! Provisioning session configuration.

use std::borrow::Cow;

/// Per-session parameters announced in the initialization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session lifetime in seconds, bound into the session attestation
    pub session_lifetime: u32,
    /// Maximum number of keys the session may create
    pub key_limit: u16,
    /// Ask the device to stay anonymous (no device certificate)
    pub privacy_enabled: bool,
    /// Issuer URI, also the submit URL of every request
    pub issuer_uri: Cow<'static, str>,
    /// Prefix of generated key ids
    pub key_prefix: &'static str,
    /// Prefix of generated PIN policy ids
    pub pin_prefix: &'static str,
    /// Prefix of generated PUK policy ids
    pub puk_prefix: &'static str,
}

impl SessionConfig {
    /// Ten-hour sessions, at most 50 keys, device certificate requested.
    pub const fn standard() -> Self {
        Self {
            session_lifetime: 36_000,
            key_limit: 50,
            privacy_enabled: false,
            issuer_uri: Cow::Borrowed("https://localhost/keygen2"),
            key_prefix: "Key.",
            pin_prefix: "PIN.",
            puk_prefix: "PUK.",
        }
    }

    /// Issuer URI as a string slice.
    pub fn issuer_uri(&self) -> &str {
        &self.issuer_uri
    }

    /// Set the issuer URI.
    pub fn with_issuer_uri(mut self, uri: impl Into<Cow<'static, str>>) -> Self {
        self.issuer_uri = uri.into();
        self
    }

    /// Set the session lifetime in seconds.
    pub const fn with_session_lifetime(mut self, seconds: u32) -> Self {
        self.session_lifetime = seconds;
        self
    }

    /// Set the key limit.
    pub const fn with_key_limit(mut self, limit: u16) -> Self {
        self.key_limit = limit;
        self
    }

    /// Enable or disable privacy mode.
    pub const fn with_privacy_enabled(mut self, enabled: bool) -> Self {
        self.privacy_enabled = enabled;
        self
    }

    /// Replace the id prefixes.
    pub const fn with_prefixes(
        mut self,
        key_prefix: &'static str,
        pin_prefix: &'static str,
        puk_prefix: &'static str,
    ) -> Self {
        self.key_prefix = key_prefix;
        self.pin_prefix = pin_prefix;
        self.puk_prefix = puk_prefix;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::standard()
    }
}
