//! Deterministic JSON serialization and a fluent object builder.
//!
//! # Output formats
//!
//! - [`OutputFormat::Normalized`]: compact, no whitespace. These bytes are
//!   the input to every signature, MAC and authenticated-data computation.
//! - [`OutputFormat::Pretty`]: two-space indentation and a trailing newline.
//! - [`OutputFormat::PrettyJsNative`]: pretty layout for embedding in a
//!   `<script>` block. Identifier-like property names are unquoted and
//!   `<`, `>`, `&` are written as unicode escapes.
//! - [`OutputFormat::PrettyHtml`]: pretty layout rendered as HTML with
//!   colored spans.
//!
//! Properties are written in insertion order. Purely numeric property names
//! must come first and ascend, otherwise serialization fails: ES6 engines
//! enumerate such names before all others, which would change the bytes a
//! JavaScript verifier sees.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use super::types::{JsonNumber, JsonObject, JsonValue};
use crate::error::{ErrorCode, JcsResult};

/// Scalar arrays longer than this (in UTF-16 units) print one value per line.
const SIMPLE_ARRAY_LINE_LIMIT: usize = 100;

const STANDARD_INDENT: usize = 2;
const HTML_INDENT: usize = 4;

const HTML_VARIABLE_COLOR: &str = "#008000";
const HTML_STRING_COLOR: &str = "#0000C0";
const HTML_PROPERTY_COLOR: &str = "#C00000";
const HTML_KEYWORD_COLOR: &str = "#606060";

/// Serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Compact form used for cryptographic operations
    Normalized,
    /// Human-readable, two-space indent
    Pretty,
    /// Pretty JavaScript object literal
    PrettyJsNative,
    /// Pretty HTML fragment
    PrettyHtml,
}

impl OutputFormat {
    fn pretty(self) -> bool {
        self != OutputFormat::Normalized
    }

    fn javascript(self) -> bool {
        self == OutputFormat::PrettyJsNative
    }

    fn html(self) -> bool {
        self == OutputFormat::PrettyHtml
    }

    /// Parse a format name as used on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "normalized" => Some(Self::Normalized),
            "pretty" => Some(Self::Pretty),
            "js" => Some(Self::PrettyJsNative),
            "html" => Some(Self::PrettyHtml),
            _ => None,
        }
    }
}

/// Serialize a value in the given format.
pub fn serialize(value: &JsonValue, format: OutputFormat) -> JcsResult<String> {
    let mut serializer = Serializer::new(format);
    serializer.print_one_element(value)?;
    if !format.javascript() {
        serializer.new_line();
    }
    Ok(serializer.buffer)
}

/// Serialize an object in the given format.
pub fn serialize_object(object: &JsonObject, format: OutputFormat) -> JcsResult<String> {
    let mut serializer = Serializer::new(format);
    serializer.print_object(object)?;
    if !format.javascript() {
        serializer.new_line();
    }
    Ok(serializer.buffer)
}

/// NORMALIZED UTF-8 bytes of a value.
pub fn normalize(value: &JsonValue) -> JcsResult<Vec<u8>> {
    serialize(value, OutputFormat::Normalized).map(String::into_bytes)
}

/// NORMALIZED UTF-8 bytes of an object.
pub fn normalize_object(object: &JsonObject) -> JcsResult<Vec<u8>> {
    serialize_object(object, OutputFormat::Normalized).map(String::into_bytes)
}

/// Encode binary data the way every binary property is written.
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

struct Serializer {
    buffer: String,
    indent: usize,
    indent_factor: usize,
    format: OutputFormat,
}

impl Serializer {
    fn new(format: OutputFormat) -> Self {
        Self {
            buffer: String::new(),
            indent: 0,
            indent_factor: if format.html() {
                HTML_INDENT
            } else {
                STANDARD_INDENT
            },
            format,
        }
    }

    fn new_line(&mut self) {
        if self.format.pretty() {
            self.buffer
                .push_str(if self.format.html() { "<br>" } else { "\n" });
        }
    }

    fn single_space(&mut self) {
        if self.format.pretty() {
            self.buffer
                .push_str(if self.format.html() { "&nbsp;" } else { " " });
        }
    }

    fn space_out(&mut self) {
        for _ in 0..self.indent {
            self.single_space();
        }
    }

    fn indent_line(&mut self) {
        self.indent += self.indent_factor;
    }

    fn undent_line(&mut self) {
        self.indent = self.indent.saturating_sub(self.indent_factor);
    }

    fn new_undent_space(&mut self) {
        self.new_line();
        self.undent_line();
        self.space_out();
    }

    fn new_indent_space(&mut self) {
        self.new_line();
        self.indent_line();
        self.space_out();
    }

    fn print_one_element(&mut self, value: &JsonValue) -> JcsResult<()> {
        match value {
            JsonValue::Array(array) => self.print_array(array),
            JsonValue::Object(object) => self.print_object(object),
            scalar => {
                self.print_scalar(scalar);
                Ok(())
            }
        }
    }

    fn print_object(&mut self, object: &JsonObject) -> JcsResult<()> {
        self.buffer.push('{');
        self.indent_line();
        let mut next = false;
        let mut last_index = i64::MIN;
        for (name, value) in object.iter() {
            let current_index = numeric_name_index(name)?;
            if current_index < last_index {
                return Err(ErrorCode::E201_NumericPropertyOrder(name.to_string()));
            }
            last_index = current_index;
            if next {
                self.buffer.push(',');
            }
            self.new_line();
            next = true;
            self.print_property(name);
            self.print_one_element(value)?;
        }
        self.new_undent_space();
        self.buffer.push('}');
        Ok(())
    }

    fn print_array(&mut self, array: &[JsonValue]) -> JcsResult<()> {
        self.buffer.push('[');
        if let Some(first) = array.first() {
            let mixed = array.iter().any(|v| {
                first.is_complex() != v.is_complex()
                    || (first.is_complex() && first.type_name() != v.type_name())
            });
            if mixed || (array.len() == 1 && first.is_object()) {
                for (i, value) in array.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(',');
                    }
                    self.print_one_element(value)?;
                }
            } else if first.is_object() {
                for (i, value) in array.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(',');
                    }
                    if let JsonValue::Object(object) = value {
                        self.print_object(object)?;
                    }
                }
            } else if first.is_array() {
                self.new_indent_space();
                for (i, value) in array.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(',');
                    }
                    if let JsonValue::Array(sub) = value {
                        self.print_array(sub)?;
                    }
                }
                self.new_undent_space();
            } else {
                self.print_array_simple(array);
            }
        }
        self.buffer.push(']');
        Ok(())
    }

    fn print_array_simple(&mut self, array: &[JsonValue]) {
        let total: usize = array
            .iter()
            .map(|v| raw_text(v).encode_utf16().count())
            .sum();
        let broken_lines = total > SIMPLE_ARRAY_LINE_LIMIT;
        if broken_lines {
            self.indent_line();
            self.new_line();
        }
        for (i, value) in array.iter().enumerate() {
            if i > 0 {
                self.buffer.push(',');
                if broken_lines {
                    self.new_line();
                }
            }
            if broken_lines {
                self.space_out();
            }
            self.print_scalar(value);
        }
        if broken_lines {
            self.new_undent_space();
        }
    }

    fn print_property(&mut self, name: &str) {
        self.space_out();
        self.print_string(name, true);
        self.buffer.push(':');
        self.single_space();
    }

    fn print_scalar(&mut self, value: &JsonValue) {
        match value {
            JsonValue::String(s) => self.print_string(s, false),
            other => {
                let text = raw_text(other);
                if self.format.html() {
                    self.buffer.push_str("<span style=\"color:");
                    self.buffer.push_str(HTML_VARIABLE_COLOR);
                    self.buffer.push_str("\">");
                }
                self.buffer.push_str(&text);
                if self.format.html() {
                    self.buffer.push_str("</span>");
                }
            }
        }
    }

    fn print_string(&mut self, string: &str, property: bool) {
        let html = self.format.html();
        let javascript = self.format.javascript();
        let quoted = !property || !javascript || !is_js_identifier(string);
        if html {
            let color = if !property {
                HTML_STRING_COLOR
            } else if string.starts_with('@') {
                HTML_KEYWORD_COLOR
            } else {
                HTML_PROPERTY_COLOR
            };
            self.buffer.push_str("&quot;<span style=\"color:");
            self.buffer.push_str(color);
            self.buffer.push_str("\">");
        } else if quoted {
            self.buffer.push('"');
        }
        for c in string.chars() {
            if html {
                match c {
                    '<' => {
                        self.buffer.push_str("&lt;");
                        continue;
                    }
                    '>' => {
                        self.buffer.push_str("&gt;");
                        continue;
                    }
                    '&' => {
                        self.buffer.push_str("&amp;");
                        continue;
                    }
                    '"' => {
                        self.buffer.push_str("\\&quot;");
                        continue;
                    }
                    _ => {}
                }
            }
            match c {
                '\\' => self.buffer.push_str("\\\\"),
                '"' => self.buffer.push_str("\\\""),
                '\x08' => self.buffer.push_str("\\b"),
                '\x0C' => self.buffer.push_str("\\f"),
                '\n' => self.buffer.push_str("\\n"),
                '\r' => self.buffer.push_str("\\r"),
                '\t' => self.buffer.push_str("\\t"),
                '&' if javascript => self.buffer.push_str("\\u0026"),
                '>' if javascript => self.buffer.push_str("\\u003e"),
                '<' if javascript => self.buffer.push_str("\\u003c"),
                c if (c as u32) < 0x20 => {
                    self.buffer.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => self.buffer.push(c),
            }
        }
        if html {
            self.buffer.push_str("</span>&quot;");
        } else if quoted {
            self.buffer.push('"');
        }
    }
}

/// Unescaped text of a scalar as it appears in output.
fn raw_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.canonical(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => String::new(),
    }
}

/// Ordering key for a property name: its value if purely numeric, else max.
///
/// A numeric name too large for `i64` cannot be ordered and is rejected.
fn numeric_name_index(name: &str) -> JcsResult<i64> {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse::<i64>().map_err(|_| ErrorCode::E201_NumericPropertyOrder(name.to_string()))
    } else {
        Ok(i64::MAX)
    }
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '$' || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '_')
}

/// Fluent builder for JSON objects.
///
/// Each setter consumes the builder and hands it back, so a chain reads
/// `ObjectWriter::new().set_string("a", "b")?.set_int("n", 1)?`. Setting a
/// name twice fails with `E600_DuplicateIdentifier`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectWriter {
    object: JsonObject,
}

impl ObjectWriter {
    /// Start an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue writing into an existing object.
    pub fn from_object(object: JsonObject) -> Self {
        Self { object }
    }

    /// Set any value.
    pub fn set_value(mut self, name: &str, value: JsonValue) -> JcsResult<Self> {
        self.object.insert(name, value)?;
        Ok(self)
    }

    /// Set a string property.
    pub fn set_string(self, name: &str, value: impl Into<String>) -> JcsResult<Self> {
        self.set_value(name, JsonValue::String(value.into()))
    }

    /// Set a 32-bit integer property.
    pub fn set_int(self, name: &str, value: i32) -> JcsResult<Self> {
        self.set_int53(name, i64::from(value))
    }

    /// Set an integer property. Fails outside the 53-bit safe range.
    pub fn set_int53(self, name: &str, value: i64) -> JcsResult<Self> {
        let number = JsonNumber::from_int53(value)?;
        self.set_value(name, JsonValue::Number(number))
    }

    /// Set a 64-bit integer, written as a decimal string.
    pub fn set_long(self, name: &str, value: i64) -> JcsResult<Self> {
        self.set_string(name, value.to_string())
    }

    /// Set an arbitrary-precision integer, written as a decimal string.
    pub fn set_big_integer(self, name: &str, value: i128) -> JcsResult<Self> {
        self.set_string(name, value.to_string())
    }

    /// Set a double property. Fails for NaN and Infinity.
    pub fn set_double(self, name: &str, value: f64) -> JcsResult<Self> {
        let number = JsonNumber::from_f64(value)?;
        self.set_value(name, JsonValue::Number(number))
    }

    /// Set a boolean property.
    pub fn set_bool(self, name: &str, value: bool) -> JcsResult<Self> {
        self.set_value(name, JsonValue::Bool(value))
    }

    /// Set a null property.
    pub fn set_null(self, name: &str) -> JcsResult<Self> {
        self.set_value(name, JsonValue::Null)
    }

    /// Set binary data as base64url without padding.
    pub fn set_binary(self, name: &str, data: &[u8]) -> JcsResult<Self> {
        self.set_string(name, base64url_encode(data))
    }

    /// Set a UTC timestamp with second precision (`2016-02-03T10:15:30Z`).
    pub fn set_date_time(self, name: &str, value: DateTime<Utc>) -> JcsResult<Self> {
        self.set_string(name, value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Set an array of strings.
    pub fn set_string_array<S: AsRef<str>>(self, name: &str, values: &[S]) -> JcsResult<Self> {
        let array = values
            .iter()
            .map(|s| JsonValue::String(s.as_ref().to_string()))
            .collect();
        self.set_value(name, JsonValue::Array(array))
    }

    /// Set an array of binary values.
    pub fn set_binary_array<B: AsRef<[u8]>>(self, name: &str, values: &[B]) -> JcsResult<Self> {
        let array = values
            .iter()
            .map(|b| JsonValue::String(base64url_encode(b.as_ref())))
            .collect();
        self.set_value(name, JsonValue::Array(array))
    }

    /// Set a nested object.
    pub fn set_object(self, name: &str, object: impl Into<JsonObject>) -> JcsResult<Self> {
        self.set_value(name, JsonValue::Object(object.into()))
    }

    /// Set an array of arbitrary values.
    pub fn set_array(self, name: &str, values: Vec<JsonValue>) -> JcsResult<Self> {
        self.set_value(name, JsonValue::Array(values))
    }

    /// Set an optional string. `None` leaves the object unchanged.
    pub fn set_string_conditional(self, name: &str, value: Option<&str>) -> JcsResult<Self> {
        match value {
            Some(v) => self.set_string(name, v),
            None => Ok(self),
        }
    }

    /// Borrow the object being built.
    pub fn as_object(&self) -> &JsonObject {
        &self.object
    }

    /// Finish and return the object.
    pub fn build(self) -> JsonObject {
        self.object
    }

    /// Serialize the object being built.
    pub fn serialize(&self, format: OutputFormat) -> JcsResult<String> {
        serialize_object(&self.object, format)
    }
}

impl From<ObjectWriter> for JsonObject {
    fn from(writer: ObjectWriter) -> Self {
        writer.object
    }
}

impl From<ObjectWriter> for JsonValue {
    fn from(writer: ObjectWriter) -> Self {
        JsonValue::Object(writer.object)
    }
}
