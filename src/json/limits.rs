//! Resource limits applied while parsing untrusted JSON.
//!
//! Provisioning messages and signed documents arrive from the network, so
//! the parser refuses inputs that would exhaust memory or stack before any
//! cryptographic processing starts.

/// Largest integer a JSON number may carry without losing precision (2^53 - 1).
pub const MAX_SAFE_INT: i64 = (1i64 << 53) - 1;

/// Smallest safe integer (-(2^53 - 1)).
pub const MIN_SAFE_INT: i64 = -MAX_SAFE_INT;

/// Parser limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum total input size in bytes (E110)
    pub max_input_size: u64,
    /// Maximum nesting depth for arrays/objects (E111)
    pub max_nesting_depth: u64,
    /// Maximum decoded string length in bytes (E112)
    pub max_string_length: u64,
    /// Maximum number of properties in an object (E113)
    pub max_object_fields: u64,
    /// Maximum number of elements in an array (E114)
    pub max_array_length: u64,
}

impl Limits {
    /// Limits for protocol messages and signed documents.
    pub const fn strict() -> Self {
        Self {
            max_input_size: 4 * 1024 * 1024, // 4 MiB (certificate paths, logotypes)
            max_nesting_depth: 32,
            max_string_length: 1024 * 1024,
            max_object_fields: 1024,
            max_array_length: 10_000,
        }
    }

    /// Generous limits for local tooling.
    pub const fn lenient() -> Self {
        Self {
            max_input_size: 64 * 1024 * 1024,
            max_nesting_depth: 256,
            max_string_length: 16 * 1024 * 1024,
            max_object_fields: 100_000,
            max_array_length: 1_000_000,
        }
    }

    /// Check if an integer can be written as a bare JSON number.
    pub fn is_safe_integer(value: i64) -> bool {
        (MIN_SAFE_INT..=MAX_SAFE_INT).contains(&value)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::strict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_safe_int() {
        assert_eq!(MAX_SAFE_INT, 9007199254740991);
        assert_eq!(MIN_SAFE_INT, -9007199254740991);
    }

    #[test]
    fn test_safe_integer_bounds() {
        assert!(Limits::is_safe_integer(0));
        assert!(Limits::is_safe_integer(MAX_SAFE_INT));
        assert!(Limits::is_safe_integer(MIN_SAFE_INT));
        assert!(!Limits::is_safe_integer(MAX_SAFE_INT + 1));
        assert!(!Limits::is_safe_integer(MIN_SAFE_INT - 1));
    }

    #[test]
    fn test_lenient_exceeds_strict() {
        let strict = Limits::strict();
        let lenient = Limits::lenient();
        assert!(lenient.max_input_size > strict.max_input_size);
        assert!(lenient.max_nesting_depth > strict.max_nesting_depth);
        assert_eq!(Limits::default(), strict);
    }
}
