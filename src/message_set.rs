//! The set of message definitions and enum constants a system speaks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::crc::calculate_crc;
use crate::definition::MessageDefinition;
use crate::error::ParseError;
use crate::message::{Header, Message};
use crate::types::PeerAddress;
use crate::xml;
use crate::{
    CHECKSUM_SIZE, HEADER_SIZE, INCOMPAT_FLAG_SIGNED, MAV_STX, MAV_STX_V2, MAX_MESSAGE_SIZE,
    SIGNATURE_SIZE, V1_HEADER_OFFSET,
};

/// A message named either by its numeric id or by its schema name.
///
/// Lets the lookup style APIs accept both: `set.create(0)` and
/// `set.create("HEARTBEAT")`.
#[derive(Debug, Clone, Copy)]
pub enum MessageIdent<'a> {
    Id(u32),
    Name(&'a str),
}

impl<'a> From<u32> for MessageIdent<'a> {
    fn from(id: u32) -> Self {
        MessageIdent::Id(id)
    }
}

impl<'a> From<&'a str> for MessageIdent<'a> {
    fn from(name: &'a str) -> Self {
        MessageIdent::Name(name)
    }
}

/// Message definitions indexed by name and id, plus the flat map of enum
/// entry constants.
///
/// Populated additively from XML files or strings; loading the same
/// message twice overwrites the earlier definition.
#[derive(Default)]
pub struct MessageSet {
    by_name: HashMap<String, Arc<MessageDefinition>>,
    by_id: HashMap<u32, Arc<MessageDefinition>>,
    enums: HashMap<String, u64>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a definition file directly into a fresh set.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let mut set = Self::new();
        set.load_file(path)?;
        Ok(set)
    }

    /// Merge a definition file, following `<include>` elements relative to
    /// the containing file.
    ///
    /// The merge is atomic: on any error the set is left unchanged.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), ParseError> {
        let mut staging = Self::new();
        xml::load_file(path.as_ref(), &mut staging)?;
        self.merge(staging);
        Ok(())
    }

    /// Merge definitions from an XML string. `<include>` elements resolve
    /// relative to the process working directory.
    ///
    /// The merge is atomic: on any error the set is left unchanged.
    pub fn load_str(&mut self, text: &str) -> Result<(), ParseError> {
        let mut staging = Self::new();
        xml::load_str(text, Path::new(""), &mut staging)?;
        self.merge(staging);
        Ok(())
    }

    fn merge(&mut self, staging: Self) {
        self.by_name.extend(staging.by_name);
        self.by_id.extend(staging.by_id);
        self.enums.extend(staging.enums);
    }

    /// Register a definition; an existing definition with the same name or
    /// id is replaced.
    pub fn add_definition(&mut self, definition: MessageDefinition) {
        let definition = Arc::new(definition);
        self.by_name
            .insert(definition.name().to_owned(), Arc::clone(&definition));
        self.by_id.insert(definition.id(), definition);
    }

    pub(crate) fn insert_enum(&mut self, name: String, value: u64) {
        self.enums.insert(name, value);
    }

    pub fn definition<'a>(
        &self,
        ident: impl Into<MessageIdent<'a>>,
    ) -> Option<&Arc<MessageDefinition>> {
        match ident.into() {
            MessageIdent::Id(id) => self.by_id.get(&id),
            MessageIdent::Name(name) => self.by_name.get(name),
        }
    }

    pub fn contains<'a>(&self, ident: impl Into<MessageIdent<'a>>) -> bool {
        self.definition(ident).is_some()
    }

    pub fn id_for(&self, name: &str) -> Result<u32, ParseError> {
        self.by_name
            .get(name)
            .map(|definition| definition.id())
            .ok_or_else(|| ParseError::UnknownMessageName(name.to_owned()))
    }

    /// The value of an enum entry, e.g. `MAV_CMD_NAV_TAKEOFF`.
    pub fn enum_value(&self, entry: &str) -> Result<u64, ParseError> {
        self.enums
            .get(entry)
            .copied()
            .ok_or_else(|| ParseError::UnknownEnumEntry(entry.to_owned()))
    }

    /// Number of known message definitions.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Create a new unframed message with an all-zero payload.
    pub fn create<'a>(&self, ident: impl Into<MessageIdent<'a>>) -> Result<Message, ParseError> {
        let ident = ident.into();
        let definition = self.definition(ident).ok_or_else(|| match ident {
            MessageIdent::Id(id) => ParseError::UnknownMessageId(id),
            MessageIdent::Name(name) => ParseError::UnknownMessageName(name.to_owned()),
        })?;
        Ok(Message::new(Arc::clone(definition)))
    }

    /// Parse one complete v1 or v2 frame from a byte slice.
    ///
    /// This is the transport-free entry point; streams go through
    /// [`crate::StreamParser`].
    pub fn parse_message(&self, data: &[u8]) -> Result<Message, ParseError> {
        if data.is_empty() {
            return Err(ParseError::FrameTooShort(0));
        }
        let (v1, base) = match data[0] {
            MAV_STX_V2 => (false, 0),
            MAV_STX => (true, V1_HEADER_OFFSET),
            magic => return Err(ParseError::InvalidMagic(magic)),
        };
        let header_len = HEADER_SIZE - base;
        if data.len() < header_len {
            return Err(ParseError::FrameTooShort(data.len()));
        }

        // Nest the frame into the shared buffer layout so v1 and v2 use
        // the same payload offsets.
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        buf[base..base + header_len].copy_from_slice(&data[..header_len]);

        let header = Header::new(&buf, v1);
        let payload_length = usize::from(header.len());
        let signature_len = if !v1 && header.incompat_flags() & INCOMPAT_FLAG_SIGNED != 0 {
            SIGNATURE_SIZE
        } else {
            0
        };
        let wire_length = header_len + payload_length + CHECKSUM_SIZE + signature_len;
        if data.len() < wire_length {
            return Err(ParseError::FrameTooShort(data.len()));
        }
        let message_id = header.message_id();
        buf[HEADER_SIZE..HEADER_SIZE + payload_length + CHECKSUM_SIZE + signature_len]
            .copy_from_slice(&data[header_len..wire_length]);

        let definition = self
            .by_id
            .get(&message_id)
            .ok_or(ParseError::UnknownMessageId(message_id))?;

        let crc_offset = HEADER_SIZE + payload_length;
        let received = u16::from_le_bytes([buf[crc_offset], buf[crc_offset + 1]]);
        let computed = calculate_crc(&buf[base + 1..crc_offset], definition.crc_extra());
        if received != computed {
            return Err(ParseError::CrcMismatch);
        }

        Ok(Message::from_wire(
            Arc::clone(definition),
            PeerAddress::BROADCAST,
            crc_offset,
            v1,
            buf,
        ))
    }
}
