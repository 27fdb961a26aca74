//! Protocol enumerations and key specifiers.

use std::fmt;

use rsa::traits::PublicKeyParts;

use crate::crypto::PublicKey;
use crate::error::{ErrorCode, JcsResult};

/// Protocol phases in the order they are traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolPhase {
    /// Capabilities exchange
    PlatformNegotiation,
    /// Session key agreement
    ProvisioningInitialization,
    /// Lookup of existing credentials
    CredentialDiscovery,
    /// Key generation in the device
    KeyCreation,
    /// Certificates, imports, extensions and post operations
    ProvisioningFinalization,
    /// Terminal
    Done,
}

impl fmt::Display for ProtocolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PlatformNegotiation => "PLATFORM_NEGOTIATION",
            Self::ProvisioningInitialization => "PROVISIONING_INITIALIZATION",
            Self::CredentialDiscovery => "CREDENTIAL_DISCOVERY",
            Self::KeyCreation => "KEY_CREATION",
            Self::ProvisioningFinalization => "PROVISIONING_FINALIZATION",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Enumerations carried on the wire by name and into MACs by byte value.
macro_rules! protocol_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = ($wire:literal, $sks:literal)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Name used in protocol messages.
            pub fn protocol_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }

            /// Value used in MAC transcripts.
            pub fn sks_value(self) -> u8 {
                match self {
                    $(Self::$variant => $sks),+
                }
            }

            /// Parse a protocol name.
            pub fn from_protocol_name(name: &str) -> JcsResult<Self> {
                match name {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(ErrorCode::E208_InvalidValue(
                        stringify!($name).to_string(),
                        other.to_string(),
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.protocol_name())
            }
        }
    };
}

protocol_enum! {
    /// PIN and PUK character set.
    PassphraseFormat {
        /// Digits only
        Numeric = ("numeric", 0x00),
        /// Digits and upper-case letters
        Alphanumeric = ("alphanumeric", 0x01),
        /// Any UTF-8
        String = ("string", 0x02),
        /// Raw bytes
        Binary = ("binary", 0x03),
    }
}

protocol_enum! {
    /// How keys sharing a PIN policy relate to each other.
    Grouping {
        /// Every key has its own PIN
        None = ("none", 0x00),
        /// All keys share one PIN
        Shared = ("shared", 0x01),
        /// Signature keys differ from the rest
        SignaturePlusStandard = ("signature+standard", 0x02),
        /// Every key has a distinct PIN
        Unique = ("unique", 0x03),
    }
}

protocol_enum! {
    /// PIN entry channel.
    InputMethod {
        /// No restriction
        Any = ("any", 0x00),
        /// Supplied by software
        Programmatic = ("programmatic", 0x01),
        /// Secure dialog only
        TrustedGui = ("trusted-gui", 0x02),
    }
}

protocol_enum! {
    /// Biometric option.
    BiometricProtection {
        /// PIN only
        None = ("none", 0x00),
        /// Biometric or PIN
        Alternative = ("alternative", 0x01),
        /// Biometric and PIN
        Combined = ("combined", 0x02),
        /// Biometric only
        Exclusive = ("exclusive", 0x03),
    }
}

protocol_enum! {
    /// Who may export the private key.
    ExportProtection {
        /// Anyone
        None = ("none", 0x00),
        /// PIN holder
        Pin = ("pin", 0x01),
        /// PUK holder
        Puk = ("puk", 0x02),
        /// Nobody
        NonExportable = ("non-exportable", 0x03),
    }
}

protocol_enum! {
    /// Who may delete the key.
    DeleteProtection {
        /// Anyone
        None = ("none", 0x00),
        /// PIN holder
        Pin = ("pin", 0x01),
        /// PUK holder
        Puk = ("puk", 0x02),
        /// Only the issuer through key management
        NonDeletable = ("non-deletable", 0x03),
    }
}

protocol_enum! {
    /// Intended key usage.
    AppUsage {
        /// Signing
        Signature = ("signature", 0x00),
        /// Client authentication
        Authentication = ("authentication", 0x01),
        /// Decryption
        Encryption = ("encryption", 0x02),
        /// Anything
        Universal = ("universal", 0x03),
    }
}

/// PIN pattern restrictions, MACed as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternRestriction {
    /// "11"
    TwoInARow,
    /// "111"
    ThreeInARow,
    /// "1234"
    Sequence,
    /// Any character repeated
    Repeated,
    /// Alphanumeric PINs lacking a character class
    MissingGroup,
}

impl PatternRestriction {
    /// Name used in protocol messages.
    pub fn protocol_name(self) -> &'static str {
        match self {
            Self::TwoInARow => "two-in-a-row",
            Self::ThreeInARow => "three-in-a-row",
            Self::Sequence => "sequence",
            Self::Repeated => "repeated",
            Self::MissingGroup => "missing-group",
        }
    }

    /// Bit in the MACed mask.
    pub fn mask_bit(self) -> u8 {
        match self {
            Self::TwoInARow => 0x01,
            Self::ThreeInARow => 0x02,
            Self::Sequence => 0x04,
            Self::Repeated => 0x08,
            Self::MissingGroup => 0x10,
        }
    }

    /// Combined mask of a set of restrictions.
    pub fn mask(restrictions: &[PatternRestriction]) -> u8 {
        restrictions.iter().fold(0, |acc, r| acc | r.mask_bit())
    }
}

/// Algorithms a device can be asked to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// NIST P-256
    EcP256,
    /// RSA with a 2048-bit modulus
    Rsa2048,
    /// RSA with a 3072-bit modulus
    Rsa3072,
    /// RSA with a 4096-bit modulus
    Rsa4096,
}

impl KeyAlgorithm {
    /// Algorithm URI.
    pub fn uri(self) -> &'static str {
        match self {
            Self::EcP256 => "https://webpki.github.io/sks/algorithm#ec.nist.p256",
            Self::Rsa2048 => "https://webpki.github.io/sks/algorithm#rsa2048",
            Self::Rsa3072 => "https://webpki.github.io/sks/algorithm#rsa3072",
            Self::Rsa4096 => "https://webpki.github.io/sks/algorithm#rsa4096",
        }
    }

    /// Parse an algorithm URI.
    pub fn from_uri(uri: &str) -> JcsResult<Self> {
        [Self::EcP256, Self::Rsa2048, Self::Rsa3072, Self::Rsa4096]
            .into_iter()
            .find(|a| a.uri() == uri)
            .ok_or_else(|| ErrorCode::E303_UnsupportedAlgorithm(uri.to_string()))
    }

    /// True when `key` belongs to this algorithm.
    pub fn matches(self, key: &PublicKey) -> bool {
        match (self, key) {
            (Self::EcP256, PublicKey::Ec(_)) => true,
            (Self::Rsa2048, PublicKey::Rsa(k)) => k.size() * 8 == 2048,
            (Self::Rsa3072, PublicKey::Rsa(k)) => k.size() * 8 == 3072,
            (Self::Rsa4096, PublicKey::Rsa(k)) => k.size() * 8 == 4096,
            _ => false,
        }
    }
}

/// Requested key algorithm with optional algorithm parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpecifier {
    /// Algorithm to generate
    pub algorithm: KeyAlgorithm,
    /// Opaque parameters, e.g. an RSA exponent
    pub parameters: Option<Vec<u8>>,
}

impl KeySpecifier {
    /// Specifier without parameters.
    pub fn new(algorithm: KeyAlgorithm) -> Self {
        Self {
            algorithm,
            parameters: None,
        }
    }

    /// Attach algorithm parameters.
    pub fn with_parameters(mut self, parameters: Vec<u8>) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

impl From<KeyAlgorithm> for KeySpecifier {
    fn from(algorithm: KeyAlgorithm) -> Self {
        Self::new(algorithm)
    }
}
