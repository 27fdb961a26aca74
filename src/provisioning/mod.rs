//! KeyGen2 provisioning, server side.
//!
//! # Architecture
//!
//! - [`state`] - [`ServerState`], the issuer's protocol state machine
//! - [`requests`] - Request encoders for every phase
//! - [`messages`] - Strict decoders for the device's responses
//! - [`server_crypto`] - Session key agreement, MACs and encryption behind a trait
//! - [`transcript`] - Length-prefixed MAC transcripts and the sequence counter
//! - [`key`], [`policy`], [`extension`], [`post_operation`] - What a session provisions
//! - [`types`], [`constants`], [`validation`], [`config`] - Supporting definitions
//!
//! # Protocol
//!
//! ```text
//! PLATFORM_NEGOTIATION -> PROVISIONING_INITIALIZATION -> CREDENTIAL_DISCOVERY
//!     -> KEY_CREATION -> PROVISIONING_FINALIZATION -> DONE
//! ```
//!
//! The issuer alternates `*_request` and [`ServerState::update`]. Credential
//! discovery is skipped when no lookup is queued. Every MAC the issuer sends
//! consumes one value of a 16-bit sequence counter shared with the device,
//! so requests must be written in protocol order.

pub mod config;
pub mod constants;
pub mod extension;
pub mod key;
pub mod messages;
pub mod policy;
pub mod post_operation;
pub mod requests;
pub mod server_crypto;
pub mod state;
pub mod transcript;
pub mod types;
pub mod validation;

pub use config::SessionConfig;
pub use extension::{Extension, Property};
pub use key::Key;
pub use messages::{
    Capabilities, CredentialDiscoveryResponse, GeneratedKey, KeyCreationResponse, LookupResult,
    MatchingCredential, PlatformNegotiationResponse, ProvisioningFinalizationResponse,
    ProvisioningInitializationResponse, ResponseMessage,
};
pub use policy::{PinPolicy, PukPolicy};
pub use post_operation::{PostOperation, PostOperationKind, PostOperations, TargetKey};
pub use server_crypto::{default_signature_algorithm, ServerCryptoInterface, SoftwareServerCrypto};
pub use state::{LookupSpecifier, ServerState};
pub use transcript::{MacContext, Transcript};
pub use types::{
    AppUsage, BiometricProtection, DeleteProtection, ExportProtection, Grouping, InputMethod,
    KeyAlgorithm, KeySpecifier, PassphraseFormat, PatternRestriction, ProtocolPhase,
};
