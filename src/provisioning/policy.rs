//! PIN and PUK policies.

use super::constants::{
    CRYPTO_STRING_NOT_AVAILABLE, ENCRYPTED_PUK_JSON, FORMAT_JSON, GROUPING_JSON, ID_JSON,
    INPUT_METHOD_JSON, MAC_JSON, MAX_LENGTH_JSON, METHOD_CREATE_PIN_POLICY,
    METHOD_CREATE_PUK_POLICY, MIN_LENGTH_JSON, PATTERN_RESTRICTIONS_JSON, PUK_POLICY_ID_JSON,
    RETRY_LIMIT_JSON, USER_MODIFIABLE_JSON,
};
use super::transcript::{MacContext, Transcript};
use super::types::{Grouping, InputMethod, PassphraseFormat, PatternRestriction};
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, ObjectWriter};

/// PUK policy. The PUK value is held encrypted under the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PukPolicy {
    pub(crate) id: String,
    pub(crate) encrypted_value: Vec<u8>,
    pub(crate) format: PassphraseFormat,
    pub(crate) retry_limit: u16,
}

impl PukPolicy {
    /// Policy id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// PUK format.
    pub fn format(&self) -> PassphraseFormat {
        self.format
    }

    /// Retry limit.
    pub fn retry_limit(&self) -> u16 {
        self.retry_limit
    }

    pub(crate) fn write(&self, ctx: &mut dyn MacContext) -> JcsResult<JsonObject> {
        let mut t = Transcript::new();
        t.add_string(&self.id)?;
        t.add_array(&self.encrypted_value)?;
        t.add_byte(self.format.sks_value());
        t.add_short(self.retry_limit);
        let mac = ctx.mac(t.as_bytes(), METHOD_CREATE_PUK_POLICY)?;

        Ok(ObjectWriter::new()
            .set_string(ID_JSON, self.id.as_str())?
            .set_binary(ENCRYPTED_PUK_JSON, &self.encrypted_value)?
            .set_string(FORMAT_JSON, self.format.protocol_name())?
            .set_int(RETRY_LIMIT_JSON, i32::from(self.retry_limit))?
            .set_binary(MAC_JSON, &mac)?
            .build())
    }
}

/// PIN policy shared by one or more keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPolicy {
    pub(crate) id: String,
    pub(crate) puk_policy_id: Option<String>,
    pub(crate) format: PassphraseFormat,
    pub(crate) min_length: u16,
    pub(crate) max_length: u16,
    pub(crate) retry_limit: u16,
    pub(crate) user_defined: bool,
    pub(crate) user_modifiable: Option<bool>,
    pub(crate) grouping: Option<Grouping>,
    pub(crate) pattern_restrictions: Vec<PatternRestriction>,
    pub(crate) input_method: Option<InputMethod>,
    // Preset state of the first key that used this policy
    pub(crate) first_key_preset: Option<bool>,
}

impl PinPolicy {
    pub(crate) fn new(
        id: String,
        format: PassphraseFormat,
        min_length: u16,
        max_length: u16,
        retry_limit: u16,
        puk_policy_id: Option<String>,
    ) -> JcsResult<Self> {
        if min_length > max_length {
            return Err(ErrorCode::E506_PolicyViolation(format!(
                "min_length {min_length} > max_length {max_length}"
            )));
        }
        Ok(Self {
            id,
            puk_policy_id,
            format,
            min_length,
            max_length,
            retry_limit,
            user_defined: true,
            user_modifiable: None,
            grouping: None,
            pattern_restrictions: Vec::new(),
            input_method: None,
            first_key_preset: None,
        })
    }

    /// Policy id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Governing PUK policy.
    pub fn puk_policy_id(&self) -> Option<&str> {
        self.puk_policy_id.as_deref()
    }

    /// False once a key with a preset PIN uses this policy.
    pub fn user_defined(&self) -> bool {
        self.user_defined
    }

    /// Whether the user may change the PIN. Defaults to true.
    pub fn user_modifiable(&self) -> bool {
        self.user_modifiable.unwrap_or(true)
    }

    /// Input method, if restricted.
    pub fn input_method(&self) -> Option<InputMethod> {
        self.input_method
    }

    /// Grouping, if set.
    pub fn grouping(&self) -> Option<Grouping> {
        self.grouping
    }

    /// Allow or forbid PIN changes.
    pub fn set_user_modifiable(&mut self, flag: bool) -> &mut Self {
        self.user_modifiable = Some(flag);
        self
    }

    /// Set the grouping.
    pub fn set_grouping(&mut self, grouping: Grouping) -> &mut Self {
        self.grouping = Some(grouping);
        self
    }

    /// Restrict the input method.
    pub fn set_input_method(&mut self, input_method: InputMethod) -> &mut Self {
        self.input_method = Some(input_method);
        self
    }

    /// Add a pattern restriction. Duplicates are ignored.
    pub fn add_pattern_restriction(&mut self, pattern: PatternRestriction) -> &mut Self {
        if !self.pattern_restrictions.contains(&pattern) {
            self.pattern_restrictions.push(pattern);
            self.pattern_restrictions.sort();
        }
        self
    }

    /// Record one more key under this policy. Keys in a SHARED group are
    /// either all preset or none.
    pub(crate) fn register_key(&mut self, preset: bool) -> JcsResult<()> {
        match self.first_key_preset {
            None => {
                self.first_key_preset = Some(preset);
                Ok(())
            }
            Some(first) if self.grouping == Some(Grouping::Shared) && first != preset => {
                Err(ErrorCode::E506_PolicyViolation(
                    "\"shared\" PIN keys must either have no preset PIN or all be preset"
                        .to_string(),
                ))
            }
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn write(&self, ctx: &mut dyn MacContext) -> JcsResult<JsonObject> {
        let mut t = Transcript::new();
        t.add_string(&self.id)?;
        t.add_string(
            self.puk_policy_id
                .as_deref()
                .unwrap_or(CRYPTO_STRING_NOT_AVAILABLE),
        )?;
        t.add_bool(self.user_defined);
        t.add_bool(self.user_modifiable());
        t.add_byte(self.format.sks_value());
        t.add_short(self.retry_limit);
        t.add_byte(self.grouping.unwrap_or(Grouping::None).sks_value());
        t.add_byte(PatternRestriction::mask(&self.pattern_restrictions));
        t.add_short(self.min_length);
        t.add_short(self.max_length);
        t.add_byte(self.input_method.unwrap_or(InputMethod::Any).sks_value());
        let mac = ctx.mac(t.as_bytes(), METHOD_CREATE_PIN_POLICY)?;

        let mut writer = ObjectWriter::new()
            .set_string(ID_JSON, self.id.as_str())?
            .set_string_conditional(PUK_POLICY_ID_JSON, self.puk_policy_id.as_deref())?
            .set_int(MIN_LENGTH_JSON, i32::from(self.min_length))?
            .set_int(MAX_LENGTH_JSON, i32::from(self.max_length))?
            .set_int(RETRY_LIMIT_JSON, i32::from(self.retry_limit))?
            .set_string(FORMAT_JSON, self.format.protocol_name())?;
        if let Some(flag) = self.user_modifiable {
            writer = writer.set_bool(USER_MODIFIABLE_JSON, flag)?;
        }
        if let Some(grouping) = self.grouping {
            writer = writer.set_string(GROUPING_JSON, grouping.protocol_name())?;
        }
        if !self.pattern_restrictions.is_empty() {
            let names: Vec<&str> = self
                .pattern_restrictions
                .iter()
                .map(|p| p.protocol_name())
                .collect();
            writer = writer.set_string_array(PATTERN_RESTRICTIONS_JSON, &names)?;
        }
        if let Some(method) = self.input_method {
            writer = writer.set_string(INPUT_METHOD_JSON, method.protocol_name())?;
        }
        Ok(writer.set_binary(MAC_JSON, &mac)?.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingMac(u16);

    impl MacContext for CountingMac {
        fn mac(&mut self, data: &[u8], method: &[u8]) -> JcsResult<Vec<u8>> {
            self.0 += 1;
            let mut out = method.to_vec();
            out.extend_from_slice(data);
            Ok(out)
        }

        fn reserve_counter(&mut self) -> JcsResult<[u8; 2]> {
            self.0 += 1;
            Ok((self.0 - 1).to_be_bytes())
        }

        fn encrypt(&self, data: &[u8]) -> JcsResult<Vec<u8>> {
            Ok(data.to_vec())
        }
    }

    fn policy() -> PinPolicy {
        PinPolicy::new("PIN.1".into(), PassphraseFormat::Numeric, 4, 8, 3, None).unwrap()
    }

    #[test]
    fn test_min_greater_than_max() {
        assert!(matches!(
            PinPolicy::new("PIN.1".into(), PassphraseFormat::Numeric, 9, 8, 3, None),
            Err(ErrorCode::E506_PolicyViolation(_))
        ));
    }

    #[test]
    fn test_shared_grouping_all_or_none_preset() {
        let mut shared = policy();
        shared.set_grouping(Grouping::Shared);
        shared.register_key(true).unwrap();
        shared.register_key(true).unwrap();
        assert!(matches!(
            shared.register_key(false),
            Err(ErrorCode::E506_PolicyViolation(_))
        ));

        let mut unique = policy();
        unique.set_grouping(Grouping::Unique);
        unique.register_key(true).unwrap();
        unique.register_key(false).unwrap();
    }

    #[test]
    fn test_pin_policy_mac_layout() {
        let mut p = policy();
        p.set_input_method(InputMethod::TrustedGui)
            .add_pattern_restriction(PatternRestriction::Repeated)
            .add_pattern_restriction(PatternRestriction::TwoInARow);
        let mut ctx = CountingMac(0);
        let written = p.write(&mut ctx).unwrap();
        let mac = written.get_binary(MAC_JSON).unwrap();

        let mut expected = METHOD_CREATE_PIN_POLICY.to_vec();
        expected.extend_from_slice(&[0, 5]);
        expected.extend_from_slice(b"PIN.1");
        expected.extend_from_slice(&[0, 4]);
        expected.extend_from_slice(b"#N/A");
        // user defined, user modifiable, format, retry limit
        expected.extend_from_slice(&[1, 1, 0, 0, 3]);
        // grouping, pattern mask, min, max, input method
        expected.extend_from_slice(&[0, 0x09, 0, 4, 0, 8, 2]);
        assert_eq!(mac, expected);
        assert_eq!(
            written.get_string_array(PATTERN_RESTRICTIONS_JSON).unwrap(),
            vec!["two-in-a-row", "repeated"]
        );
        assert!(!written.contains(USER_MODIFIABLE_JSON));
        assert_eq!(ctx.0, 1);
    }

    #[test]
    fn test_puk_policy_write() {
        let puk = PukPolicy {
            id: "PUK.1".into(),
            encrypted_value: vec![1, 2, 3],
            format: PassphraseFormat::Alphanumeric,
            retry_limit: 10,
        };
        let mut ctx = CountingMac(0);
        let written = puk.write(&mut ctx).unwrap();
        assert_eq!(written.get_binary(ENCRYPTED_PUK_JSON).unwrap(), vec![1, 2, 3]);
        assert_eq!(written.get_string(FORMAT_JSON).unwrap(), "alphanumeric");
        assert_eq!(written.get_int(RETRY_LIMIT_JSON).unwrap(), 10);
    }
}
