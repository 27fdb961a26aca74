//! Typed property access on parsed objects.
//!
//! Protocol decoders read messages through these getters instead of matching
//! on [`JsonValue`] directly. Missing properties, wrong types and malformed
//! binary or date values each map to their own error code.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use super::types::{JsonObject, JsonValue};
use crate::error::{ErrorCode, JcsResult};

/// Decode base64url without padding, rejecting any other alphabet.
pub fn base64url_decode(text: &str) -> JcsResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|_| ErrorCode::E205_InvalidBase64(text.to_string()))
}

impl JsonObject {
    /// Property value, failing if absent.
    pub fn get_property(&self, name: &str) -> JcsResult<&JsonValue> {
        self.get(name)
            .ok_or_else(|| ErrorCode::E203_MissingProperty(name.to_string()))
    }

    fn mismatch(name: &str, expected: &'static str, found: &JsonValue) -> ErrorCode {
        ErrorCode::E204_TypeMismatch(name.to_string(), expected, found.type_name())
    }

    /// String property.
    pub fn get_string(&self, name: &str) -> JcsResult<&str> {
        let value = self.get_property(name)?;
        value
            .as_str()
            .ok_or_else(|| Self::mismatch(name, "string", value))
    }

    /// String property, `None` when absent.
    pub fn get_string_conditional(&self, name: &str) -> JcsResult<Option<&str>> {
        if self.contains(name) {
            self.get_string(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Boolean property.
    pub fn get_bool(&self, name: &str) -> JcsResult<bool> {
        let value = self.get_property(name)?;
        value
            .as_bool()
            .ok_or_else(|| Self::mismatch(name, "boolean", value))
    }

    /// Boolean property with a default when absent.
    pub fn get_bool_conditional(&self, name: &str, default: bool) -> JcsResult<bool> {
        if self.contains(name) {
            self.get_bool(name)
        } else {
            Ok(default)
        }
    }

    /// Integer property within the 53-bit safe range.
    pub fn get_int53(&self, name: &str) -> JcsResult<i64> {
        let value = self.get_property(name)?;
        value
            .as_number()
            .ok_or_else(|| Self::mismatch(name, "number", value))?
            .as_int53()
    }

    /// 32-bit integer property.
    pub fn get_int(&self, name: &str) -> JcsResult<i32> {
        let value = self.get_property(name)?;
        value
            .as_number()
            .ok_or_else(|| Self::mismatch(name, "number", value))?
            .as_i32()
    }

    /// Double property.
    pub fn get_double(&self, name: &str) -> JcsResult<f64> {
        let value = self.get_property(name)?;
        value
            .as_number()
            .map(|n| n.as_f64())
            .ok_or_else(|| Self::mismatch(name, "number", value))
    }

    /// 64-bit integer written as a decimal string.
    pub fn get_long(&self, name: &str) -> JcsResult<i64> {
        let text = self.get_string(name)?;
        text.parse()
            .map_err(|_| ErrorCode::E208_InvalidValue(name.to_string(), text.to_string()))
    }

    /// Arbitrary-precision integer written as a decimal string.
    pub fn get_big_integer(&self, name: &str) -> JcsResult<i128> {
        let text = self.get_string(name)?;
        text.parse()
            .map_err(|_| ErrorCode::E208_InvalidValue(name.to_string(), text.to_string()))
    }

    /// Binary property (base64url).
    pub fn get_binary(&self, name: &str) -> JcsResult<Vec<u8>> {
        base64url_decode(self.get_string(name)?)
    }

    /// Binary property, `None` when absent.
    pub fn get_binary_conditional(&self, name: &str) -> JcsResult<Option<Vec<u8>>> {
        if self.contains(name) {
            self.get_binary(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// RFC 3339 timestamp, normalized to UTC.
    pub fn get_date_time(&self, name: &str) -> JcsResult<DateTime<Utc>> {
        let text = self.get_string(name)?;
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ErrorCode::E206_InvalidDateTime(text.to_string()))
    }

    /// Nested object property.
    pub fn get_object(&self, name: &str) -> JcsResult<&JsonObject> {
        let value = self.get_property(name)?;
        value
            .as_object()
            .ok_or_else(|| Self::mismatch(name, "object", value))
    }

    /// Nested object property, `None` when absent.
    pub fn get_object_conditional(&self, name: &str) -> JcsResult<Option<&JsonObject>> {
        if self.contains(name) {
            self.get_object(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Array property.
    pub fn get_array(&self, name: &str) -> JcsResult<&[JsonValue]> {
        let value = self.get_property(name)?;
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| Self::mismatch(name, "array", value))
    }

    /// Array property whose elements must all be objects.
    pub fn get_object_array(&self, name: &str) -> JcsResult<Vec<&JsonObject>> {
        self.get_array(name)?
            .iter()
            .map(|v| v.as_object().ok_or_else(|| Self::mismatch(name, "object", v)))
            .collect()
    }

    /// Array of strings.
    pub fn get_string_array(&self, name: &str) -> JcsResult<Vec<String>> {
        self.get_array(name)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Self::mismatch(name, "string", v))
            })
            .collect()
    }

    /// Array of strings, empty when absent.
    pub fn get_string_array_conditional(&self, name: &str) -> JcsResult<Vec<String>> {
        if self.contains(name) {
            self.get_string_array(name)
        } else {
            Ok(Vec::new())
        }
    }

    /// Array of base64url values.
    pub fn get_binary_array(&self, name: &str) -> JcsResult<Vec<Vec<u8>>> {
        self.get_string_array(name)?
            .iter()
            .map(|s| base64url_decode(s))
            .collect()
    }

    /// Fail on any property outside `allowed`.
    pub fn expect_only(&self, allowed: &[&str]) -> JcsResult<()> {
        match self.names().find(|n| !allowed.contains(n)) {
            Some(unexpected) => Err(ErrorCode::E207_UnexpectedProperty(unexpected.to_string())),
            None => Ok(()),
        }
    }
}
