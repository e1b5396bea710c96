//! Message schemas: per-message field tables with wire offsets and the
//! crc extra schema fingerprint.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::crc::MavCrc;
use crate::error::ParseError;
use crate::types::FieldType;
use crate::{CHECKSUM_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE, SIGNATURE_SIZE};

/// A resolved field: its type and the byte offset of its first element,
/// measured from the start of the message buffer (so payload offsets begin
/// at [`HEADER_SIZE`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Field {
    pub field_type: FieldType,
    pub offset: usize,
}

/// An immutable message schema.
///
/// Built through [`MessageDefinitionBuilder`], which assigns offsets in the
/// order mandated by the MAVLink serialization rules: non-extension fields
/// stable-sorted by descending base type size, extension fields appended in
/// declaration order.
#[derive(Debug)]
pub struct MessageDefinition {
    name: String,
    id: u32,
    fields: IndexMap<String, Field>,
    extension_start: usize,
    crc_extra: u8,
    max_payload_length: usize,
    max_buffer_length: usize,
}

impl MessageDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The 8-bit schema fingerprint mixed into every frame checksum.
    pub fn crc_extra(&self) -> u8 {
        self.crc_extra
    }

    /// Payload length when no trailing zero bytes are elided.
    pub fn max_payload_length(&self) -> usize {
        self.max_payload_length
    }

    /// Size of the largest possible frame of this message.
    pub fn max_buffer_length(&self) -> usize {
        self.max_buffer_length
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields in wire offset order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_extension_field(&self, name: &str) -> bool {
        self.fields
            .get_index_of(name)
            .is_some_and(|index| index >= self.extension_start)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

pub struct MessageDefinitionBuilder {
    name: String,
    id: u32,
    fields: Vec<(String, FieldType)>,
    extension_fields: Vec<(String, FieldType)>,
}

impl MessageDefinitionBuilder {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
            fields: Vec::new(),
            extension_fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push((name.into(), field_type));
        self
    }

    pub fn extension_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.extension_fields.push((name.into(), field_type));
        self
    }

    pub fn build(self) -> Result<MessageDefinition, ParseError> {
        let Self {
            name,
            id,
            mut fields,
            extension_fields,
        } = self;

        let mut seen = HashSet::new();
        for (field_name, field_type) in fields.iter().chain(extension_fields.iter()) {
            if !seen.insert(field_name.as_str()) {
                return Err(ParseError::DuplicateField {
                    message: name.clone(),
                    field: field_name.clone(),
                });
            }
            if field_type.array_size == 0 {
                return Err(ParseError::InvalidArraySize {
                    message: name.clone(),
                    field: field_name.clone(),
                });
            }
        }

        // The serialization rules sort main fields by their base type size;
        // the sort must be stable so equally sized fields keep declaration
        // order. Extension fields are never reordered.
        fields.sort_by_key(|(_, field_type)| core::cmp::Reverse(field_type.base_type.size()));

        let mut offset = HEADER_SIZE;
        let mut resolved = IndexMap::with_capacity(fields.len() + extension_fields.len());
        let mut crc = MavCrc::new();
        crc.accumulate_str(&name);
        crc.accumulate_str(" ");

        for (field_name, field_type) in fields {
            crc.accumulate_str(field_type.base_type.crc_name());
            crc.accumulate_str(" ");
            crc.accumulate_str(&field_name);
            crc.accumulate_str(" ");
            if field_type.array_size > 1 {
                crc.accumulate(field_type.array_size as u8);
            }
            resolved.insert(field_name, Field { field_type, offset });
            offset += field_type.wire_size();
        }
        let crc_extra = crc.extra();
        let extension_start = resolved.len();

        for (field_name, field_type) in extension_fields {
            resolved.insert(field_name, Field { field_type, offset });
            offset += field_type.wire_size();
        }

        let max_payload_length = offset - HEADER_SIZE;
        if max_payload_length > MAX_PAYLOAD_SIZE {
            return Err(ParseError::PayloadTooLarge {
                message: name.clone(),
                length: max_payload_length,
            });
        }

        Ok(MessageDefinition {
            name,
            id,
            fields: resolved,
            extension_start,
            crc_extra,
            max_payload_length,
            max_buffer_length: offset + CHECKSUM_SIZE + SIGNATURE_SIZE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    #[test]
    fn sorts_main_fields_by_descending_size() {
        let definition = MessageDefinitionBuilder::new("TEST", 7)
            .field("small", FieldType::scalar(BaseType::UInt8))
            .field("large", FieldType::scalar(BaseType::UInt64))
            .field("medium", FieldType::scalar(BaseType::UInt16))
            .build()
            .unwrap();

        assert_eq!(definition.field("large").unwrap().offset, HEADER_SIZE);
        assert_eq!(definition.field("medium").unwrap().offset, HEADER_SIZE + 8);
        assert_eq!(definition.field("small").unwrap().offset, HEADER_SIZE + 10);
        assert_eq!(definition.max_payload_length(), 11);
    }

    #[test]
    fn equal_sizes_keep_declaration_order() {
        let definition = MessageDefinitionBuilder::new("TEST", 7)
            .field("b", FieldType::scalar(BaseType::UInt32))
            .field("a", FieldType::scalar(BaseType::Int32))
            .field("c", FieldType::scalar(BaseType::Float))
            .build()
            .unwrap();

        assert_eq!(definition.field("b").unwrap().offset, HEADER_SIZE);
        assert_eq!(definition.field("a").unwrap().offset, HEADER_SIZE + 4);
        assert_eq!(definition.field("c").unwrap().offset, HEADER_SIZE + 8);
    }

    #[test]
    fn extensions_append_after_main_fields_unsorted() {
        let definition = MessageDefinitionBuilder::new("TEST", 7)
            .field("main", FieldType::scalar(BaseType::UInt8))
            .extension_field("ext_small", FieldType::scalar(BaseType::UInt8))
            .extension_field("ext_large", FieldType::scalar(BaseType::UInt64))
            .build()
            .unwrap();

        assert_eq!(definition.field("main").unwrap().offset, HEADER_SIZE);
        assert_eq!(definition.field("ext_small").unwrap().offset, HEADER_SIZE + 1);
        assert_eq!(definition.field("ext_large").unwrap().offset, HEADER_SIZE + 2);
        assert!(definition.is_extension_field("ext_small"));
        assert!(!definition.is_extension_field("main"));
    }

    #[test]
    fn crc_extra_ignores_extension_fields() {
        let base = MessageDefinitionBuilder::new("TEST", 7)
            .field("main", FieldType::scalar(BaseType::UInt8))
            .build()
            .unwrap();
        let extended = MessageDefinitionBuilder::new("TEST", 7)
            .field("main", FieldType::scalar(BaseType::UInt8))
            .extension_field("ext", FieldType::scalar(BaseType::UInt32))
            .build()
            .unwrap();

        assert_eq!(base.crc_extra(), extended.crc_extra());
        assert_ne!(base.max_payload_length(), extended.max_payload_length());
    }

    #[test]
    fn rejects_duplicate_fields_and_zero_arrays() {
        let duplicate = MessageDefinitionBuilder::new("TEST", 7)
            .field("x", FieldType::scalar(BaseType::UInt8))
            .field("x", FieldType::scalar(BaseType::UInt8))
            .build();
        assert!(matches!(duplicate, Err(ParseError::DuplicateField { .. })));

        let empty_array = MessageDefinitionBuilder::new("TEST", 7)
            .field("x", FieldType::array(BaseType::UInt8, 0))
            .build();
        assert!(matches!(empty_array, Err(ParseError::InvalidArraySize { .. })));
    }

    #[test]
    fn rejects_oversized_payload() {
        let oversized = MessageDefinitionBuilder::new("TEST", 7)
            .field("a", FieldType::array(BaseType::UInt8, 200))
            .field("b", FieldType::array(BaseType::UInt8, 56))
            .build();
        assert!(matches!(oversized, Err(ParseError::PayloadTooLarge { .. })));
    }
}
