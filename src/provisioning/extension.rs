//! Key extensions.
//!
//! Extensions travel in the finalization request and are bound to their key
//! by an `addExtension` MAC over the end-entity certificate, type, sub type,
//! qualifier and extension data.

use super::constants::{
    ENCRYPTED_EXTENSION_DATA_JSON, EXTENSION_DATA_JSON, LOGOTYPE_JSON, MAC_JSON, MIME_TYPE_JSON,
    NAME_JSON, PROPERTIES_JSON, SUB_TYPE_ENCRYPTED_EXTENSION, SUB_TYPE_EXTENSION,
    SUB_TYPE_LOGOTYPE, SUB_TYPE_PROPERTY_BAG, TYPE_JSON, VALUE_JSON, WRITABLE_JSON,
};
use super::transcript::Transcript;
use crate::error::{ErrorCode, JcsResult};
use crate::json::{JsonObject, JsonValue, ObjectWriter};

/// One entry of a property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name, unique within the bag
    pub name: String,
    /// Initial value
    pub value: String,
    /// Whether the user may change the value
    pub writable: bool,
}

/// A key extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// Opaque data
    Plain {
        /// Extension type URI
        extension_type: String,
        /// Payload
        data: Vec<u8>,
    },
    /// Data encrypted under the session key
    Encrypted {
        /// Extension type URI
        extension_type: String,
        /// Session-encrypted payload
        encrypted_data: Vec<u8>,
    },
    /// Image with its MIME type
    Logotype {
        /// Extension type URI
        extension_type: String,
        /// MIME type, the MAC qualifier
        mime_type: String,
        /// Image bytes
        data: Vec<u8>,
    },
    /// Named values
    PropertyBag {
        /// Extension type URI
        extension_type: String,
        /// Properties in insertion order
        properties: Vec<Property>,
    },
}

impl Extension {
    /// Plain extension.
    pub fn plain(extension_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Plain {
            extension_type: extension_type.into(),
            data: data.into(),
        }
    }

    /// Logotype.
    pub fn logotype(
        extension_type: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self::Logotype {
            extension_type: extension_type.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Empty property bag; fill with [`Extension::with_property`].
    pub fn property_bag(extension_type: impl Into<String>) -> Self {
        Self::PropertyBag {
            extension_type: extension_type.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property to a bag. Duplicate names are rejected.
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        writable: bool,
    ) -> JcsResult<Self> {
        let name = name.into();
        let Self::PropertyBag { properties, .. } = &mut self else {
            return Err(ErrorCode::E506_PolicyViolation(format!(
                "property \"{name}\" added to a non property bag extension"
            )));
        };
        if properties.iter().any(|p| p.name == name) {
            return Err(ErrorCode::E600_DuplicateIdentifier(name));
        }
        properties.push(Property {
            name,
            value: value.into(),
            writable,
        });
        Ok(self)
    }

    /// Extension type URI.
    pub fn extension_type(&self) -> &str {
        match self {
            Self::Plain { extension_type, .. }
            | Self::Encrypted { extension_type, .. }
            | Self::Logotype { extension_type, .. }
            | Self::PropertyBag { extension_type, .. } => extension_type,
        }
    }

    /// Key-store sub type byte.
    pub fn sub_type(&self) -> u8 {
        match self {
            Self::Plain { .. } => SUB_TYPE_EXTENSION,
            Self::Encrypted { .. } => SUB_TYPE_ENCRYPTED_EXTENSION,
            Self::PropertyBag { .. } => SUB_TYPE_PROPERTY_BAG,
            Self::Logotype { .. } => SUB_TYPE_LOGOTYPE,
        }
    }

    /// MAC qualifier: the MIME type for logotypes, empty otherwise.
    pub fn qualifier(&self) -> &str {
        match self {
            Self::Logotype { mime_type, .. } => mime_type,
            _ => "",
        }
    }

    /// Bytes stored by the key store.
    ///
    /// Property bags serialize as (name, writable, value) per property.
    pub fn extension_data(&self) -> JcsResult<Vec<u8>> {
        match self {
            Self::Plain { data, .. } | Self::Logotype { data, .. } => Ok(data.clone()),
            Self::Encrypted { encrypted_data, .. } => Ok(encrypted_data.clone()),
            Self::PropertyBag { properties, .. } => {
                let mut t = Transcript::new();
                for p in properties {
                    t.add_string(&p.name)?;
                    t.add_bool(p.writable);
                    t.add_string(&p.value)?;
                }
                Ok(t.into_bytes())
            }
        }
    }

    /// Transcript for the `addExtension` MAC.
    pub fn mac_data(&self, end_entity_certificate: &[u8]) -> JcsResult<Vec<u8>> {
        let mut t = Transcript::new();
        t.add_array(end_entity_certificate)?;
        t.add_string(self.extension_type())?;
        t.add_byte(self.sub_type());
        t.add_string(self.qualifier())?;
        t.add_blob(&self.extension_data()?)?;
        Ok(t.into_bytes())
    }

    pub(crate) fn write(&self, mac: &[u8]) -> JcsResult<JsonObject> {
        let writer = ObjectWriter::new()
            .set_string(TYPE_JSON, self.extension_type())?
            .set_binary(MAC_JSON, mac)?;
        let writer = match self {
            Self::Plain { data, .. } => writer.set_binary(EXTENSION_DATA_JSON, data)?,
            Self::Encrypted { encrypted_data, .. } => {
                writer.set_binary(ENCRYPTED_EXTENSION_DATA_JSON, encrypted_data)?
            }
            Self::Logotype {
                mime_type, data, ..
            } => writer
                .set_string(MIME_TYPE_JSON, mime_type.as_str())?
                .set_binary(LOGOTYPE_JSON, data)?,
            Self::PropertyBag { properties, .. } => {
                if properties.is_empty() {
                    return Err(ErrorCode::E506_PolicyViolation(format!(
                        "empty property bag: {}",
                        self.extension_type()
                    )));
                }
                let mut array = Vec::with_capacity(properties.len());
                for p in properties {
                    let mut entry = ObjectWriter::new()
                        .set_string(NAME_JSON, p.name.as_str())?
                        .set_string(VALUE_JSON, p.value.as_str())?;
                    if p.writable {
                        entry = entry.set_bool(WRITABLE_JSON, true)?;
                    }
                    array.push(JsonValue::from(entry));
                }
                writer.set_array(PROPERTIES_JSON, array)?
            }
        };
        Ok(writer.build())
    }

    /// Decode an extension written into a finalization request, returning
    /// it with its MAC.
    pub fn decode(object: &JsonObject) -> JcsResult<(Self, Vec<u8>)> {
        let extension_type = object.get_string(TYPE_JSON)?.to_string();
        let mac = object.get_binary(MAC_JSON)?;
        let extension = if let Some(data) = object.get_binary_conditional(EXTENSION_DATA_JSON)? {
            object.expect_only(&[TYPE_JSON, MAC_JSON, EXTENSION_DATA_JSON])?;
            Self::Plain {
                extension_type,
                data,
            }
        } else if let Some(encrypted_data) =
            object.get_binary_conditional(ENCRYPTED_EXTENSION_DATA_JSON)?
        {
            object.expect_only(&[TYPE_JSON, MAC_JSON, ENCRYPTED_EXTENSION_DATA_JSON])?;
            Self::Encrypted {
                extension_type,
                encrypted_data,
            }
        } else if object.contains(LOGOTYPE_JSON) {
            object.expect_only(&[TYPE_JSON, MAC_JSON, MIME_TYPE_JSON, LOGOTYPE_JSON])?;
            Self::Logotype {
                extension_type,
                mime_type: object.get_string(MIME_TYPE_JSON)?.to_string(),
                data: object.get_binary(LOGOTYPE_JSON)?,
            }
        } else {
            object.expect_only(&[TYPE_JSON, MAC_JSON, PROPERTIES_JSON])?;
            let mut bag = Self::property_bag(extension_type);
            for entry in object.get_object_array(PROPERTIES_JSON)? {
                entry.expect_only(&[NAME_JSON, VALUE_JSON, WRITABLE_JSON])?;
                bag = bag.with_property(
                    entry.get_string(NAME_JSON)?,
                    entry.get_string(VALUE_JSON)?,
                    entry.get_bool_conditional(WRITABLE_JSON, false)?,
                )?;
            }
            bag
        };
        Ok((extension, mac))
    }
}
