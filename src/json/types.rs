//! JSON value model.
//!
//! Objects keep their properties in insertion order. Order matters: signatures
//! are computed over the serialized bytes, and reordering properties would
//! change them.
//!
//! Numbers keep the text they were parsed from next to their IEEE-754 value.
//! The serializer always writes the canonical form of the value, while typed
//! readers can inspect the lexical form.

use std::fmt;

use super::limits::{MAX_SAFE_INT, MIN_SAFE_INT};
use super::number;
use crate::error::{ErrorCode, JcsResult};

/// A finite JSON number.
#[derive(Debug, Clone)]
pub struct JsonNumber {
    value: f64,
    lexical: String,
}

impl JsonNumber {
    /// Create a number from a double. Fails for NaN and Infinity.
    pub fn from_f64(value: f64) -> JcsResult<Self> {
        let lexical = number::format_f64(value)?;
        Ok(Self { value, lexical })
    }

    /// Create a number from an integer inside the safe range.
    pub fn from_int53(value: i64) -> JcsResult<Self> {
        if !(MIN_SAFE_INT..=MAX_SAFE_INT).contains(&value) {
            return Err(ErrorCode::E202_UnsafeInteger(value.to_string()));
        }
        Ok(Self {
            value: value as f64,
            lexical: value.to_string(),
        })
    }

    /// Create a number from literal text, validating the JSON grammar.
    pub fn from_lexical(text: &str) -> JcsResult<Self> {
        let value = number::parse_lexical(text)?;
        Ok(Self {
            value,
            lexical: text.to_string(),
        })
    }

    /// The IEEE-754 value.
    pub fn as_f64(&self) -> f64 {
        self.value
    }

    /// The text this number was created from.
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// Canonical ES6 representation.
    pub fn canonical(&self) -> String {
        // Finite by construction, formatting cannot fail.
        number::format_f64(self.value).unwrap_or_else(|_| self.lexical.clone())
    }

    /// Read as an integer within the 53-bit safe range.
    pub fn as_int53(&self) -> JcsResult<i64> {
        let v = self.value;
        if v.fract() != 0.0 || v.abs() > MAX_SAFE_INT as f64 {
            return Err(ErrorCode::E109_IntegerOutOfRange(self.lexical.clone()));
        }
        Ok(v as i64)
    }

    /// Read as a 32-bit signed integer.
    pub fn as_i32(&self) -> JcsResult<i32> {
        let v = self.as_int53()?;
        i32::try_from(v).map_err(|_| ErrorCode::E109_IntegerOutOfRange(self.lexical.clone()))
    }
}

impl PartialEq for JsonNumber {
    fn eq(&self, other: &Self) -> bool {
        // -0 == 0, and NaN cannot occur
        self.value == other.value
    }
}

impl Eq for JsonNumber {}

impl fmt::Display for JsonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// An insertion-ordered JSON object with unique property names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonObject {
    properties: Vec<(String, JsonValue)>,
}

impl JsonObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True if the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// True if a property with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.properties.iter().any(|(n, _)| n == name)
    }

    /// Look up a property.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Look up a property for modification.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut JsonValue> {
        self.properties
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Append a property. Fails with `E600_DuplicateIdentifier` if the name exists.
    pub fn insert(&mut self, name: impl Into<String>, value: JsonValue) -> JcsResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ErrorCode::E600_DuplicateIdentifier(name));
        }
        self.properties.push((name, value));
        Ok(())
    }

    /// Replace the value of an existing property, or append it.
    pub fn set(&mut self, name: impl Into<String>, value: JsonValue) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.properties.push((name, value)),
        }
    }

    /// Remove a property, preserving the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<JsonValue> {
        let index = self.properties.iter().position(|(n, _)| n == name)?;
        Some(self.properties.remove(index).1)
    }

    /// Property names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }

    /// Properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.properties.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl IntoIterator for JsonObject {
    type Item = (String, JsonValue);
    type IntoIter = std::vec::IntoIter<(String, JsonValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_iter()
    }
}

/// A JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JsonValue {
    /// JSON null literal
    #[default]
    Null,
    /// JSON boolean
    Bool(bool),
    /// Finite JSON number
    Number(JsonNumber),
    /// JSON string
    String(String),
    /// JSON array
    Array(Vec<JsonValue>),
    /// JSON object with insertion-ordered properties
    Object(JsonObject),
}

impl JsonValue {
    /// Returns true if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    /// Returns true if this is a boolean value.
    pub fn is_bool(&self) -> bool {
        matches!(self, JsonValue::Bool(_))
    }

    /// Returns true if this is a number value.
    pub fn is_number(&self) -> bool {
        matches!(self, JsonValue::Number(_))
    }

    /// Returns true if this is a string value.
    pub fn is_string(&self) -> bool {
        matches!(self, JsonValue::String(_))
    }

    /// Returns true if this is an array value.
    pub fn is_array(&self) -> bool {
        matches!(self, JsonValue::Array(_))
    }

    /// Returns true if this is an object value.
    pub fn is_object(&self) -> bool {
        matches!(self, JsonValue::Object(_))
    }

    /// Arrays and objects are complex, everything else is a simple value.
    pub fn is_complex(&self) -> bool {
        self.is_array() || self.is_object()
    }

    /// Returns the boolean value if this is a Bool, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number if this is a Number, None otherwise.
    pub fn as_number(&self) -> Option<&JsonNumber> {
        match self {
            JsonValue::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a reference to the array if this is an Array, None otherwise.
    pub fn as_array(&self) -> Option<&Vec<JsonValue>> {
        match self {
            JsonValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns a reference to the object if this is an Object, None otherwise.
    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            JsonValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable access to an object value.
    pub fn as_object_mut(&mut self) -> Option<&mut JsonObject> {
        match self {
            JsonValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get a value from an object by key.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Get a value from an array by index.
    pub fn get_index(&self, index: usize) -> Option<&JsonValue> {
        match self {
            JsonValue::Array(arr) => arr.get(index),
            _ => None,
        }
    }

    /// Returns the type name as a string for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "boolean",
            JsonValue::Number(_) => "number",
            JsonValue::String(_) => "string",
            JsonValue::Array(_) => "array",
            JsonValue::Object(_) => "object",
        }
    }
}

impl From<bool> for JsonValue {
    fn from(b: bool) -> Self {
        JsonValue::Bool(b)
    }
}

impl From<&str> for JsonValue {
    fn from(s: &str) -> Self {
        JsonValue::String(s.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(s: String) -> Self {
        JsonValue::String(s)
    }
}

impl From<JsonObject> for JsonValue {
    fn from(o: JsonObject) -> Self {
        JsonValue::Object(o)
    }
}

impl From<Vec<JsonValue>> for JsonValue {
    fn from(a: Vec<JsonValue>) -> Self {
        JsonValue::Array(a)
    }
}
