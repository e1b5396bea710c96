//! Dynamic messages: a wire-layout buffer plus a reference to the schema
//! that describes it.

use core::fmt;
use std::sync::Arc;

use crate::bytes::Bytes;
use crate::bytes_mut::BytesMut;
use crate::crc::calculate_crc;
use crate::definition::{Field, MessageDefinition};
use crate::error::MessageError;
use crate::types::{BaseType, NodeId, PeerAddress, Value};
use crate::{
    MavlinkVersion, CHECKSUM_SIZE, HEADER_SIZE, MAV_STX, MAV_STX_V2, MAX_MESSAGE_SIZE,
    V1_HEADER_OFFSET,
};

/// Read access to the frame header of a [`Message`].
///
/// The same buffer holds both framings; a v1 header is 4 bytes shorter and
/// nests at [`V1_HEADER_OFFSET`] so that the payload stays at a fixed
/// offset.
#[derive(Clone, Copy)]
pub struct Header<'a> {
    buf: &'a [u8],
    v1: bool,
}

impl<'a> Header<'a> {
    pub(crate) fn new(buf: &'a [u8], v1: bool) -> Self {
        Self { buf, v1 }
    }

    #[inline]
    fn base(&self) -> usize {
        if self.v1 {
            V1_HEADER_OFFSET
        } else {
            0
        }
    }

    #[inline]
    pub fn magic(&self) -> u8 {
        self.buf[self.base()]
    }

    #[inline]
    pub fn len(&self) -> u8 {
        self.buf[self.base() + 1]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// v2 incompatibility flags; always 0 for a v1 frame.
    #[inline]
    pub fn incompat_flags(&self) -> u8 {
        if self.v1 {
            0
        } else {
            self.buf[2]
        }
    }

    /// v2 compatibility flags; always 0 for a v1 frame.
    #[inline]
    pub fn compat_flags(&self) -> u8 {
        if self.v1 {
            0
        } else {
            self.buf[3]
        }
    }

    #[inline]
    pub fn sequence(&self) -> u8 {
        self.buf[if self.v1 { V1_HEADER_OFFSET + 2 } else { 4 }]
    }

    #[inline]
    pub fn system_id(&self) -> u8 {
        self.buf[if self.v1 { V1_HEADER_OFFSET + 3 } else { 5 }]
    }

    #[inline]
    pub fn component_id(&self) -> u8 {
        self.buf[if self.v1 { V1_HEADER_OFFSET + 4 } else { 6 }]
    }

    #[inline]
    pub fn message_id(&self) -> u32 {
        if self.v1 {
            u32::from(self.buf[V1_HEADER_OFFSET + 5])
        } else {
            u32::from_le_bytes([self.buf[7], self.buf[8], self.buf[9], 0])
        }
    }

    /// The sender of the frame as a [`NodeId`].
    #[inline]
    pub fn source(&self) -> NodeId {
        NodeId::new(i32::from(self.system_id()), i32::from(self.component_id()))
    }
}

/// Write access to the frame header of a [`Message`].
pub struct HeaderMut<'a> {
    buf: &'a mut [u8],
    v1: bool,
}

impl<'a> HeaderMut<'a> {
    pub(crate) fn new(buf: &'a mut [u8], v1: bool) -> Self {
        Self { buf, v1 }
    }

    fn view(&self) -> Header<'_> {
        Header::new(self.buf, self.v1)
    }

    #[inline]
    pub fn system_id(&self) -> u8 {
        self.view().system_id()
    }

    #[inline]
    pub fn component_id(&self) -> u8 {
        self.view().component_id()
    }

    #[inline]
    pub(crate) fn set_magic(&mut self, value: u8) {
        let base = if self.v1 { V1_HEADER_OFFSET } else { 0 };
        self.buf[base] = value;
    }

    #[inline]
    pub(crate) fn set_len(&mut self, value: u8) {
        let base = if self.v1 { V1_HEADER_OFFSET } else { 0 };
        self.buf[base + 1] = value;
    }

    #[inline]
    pub(crate) fn set_incompat_flags(&mut self, value: u8) {
        if !self.v1 {
            self.buf[2] = value;
        }
    }

    #[inline]
    pub(crate) fn set_compat_flags(&mut self, value: u8) {
        if !self.v1 {
            self.buf[3] = value;
        }
    }

    #[inline]
    pub(crate) fn set_sequence(&mut self, value: u8) {
        self.buf[if self.v1 { V1_HEADER_OFFSET + 2 } else { 4 }] = value;
    }

    #[inline]
    pub fn set_system_id(&mut self, value: u8) {
        self.buf[if self.v1 { V1_HEADER_OFFSET + 3 } else { 5 }] = value;
    }

    #[inline]
    pub fn set_component_id(&mut self, value: u8) {
        self.buf[if self.v1 { V1_HEADER_OFFSET + 4 } else { 6 }] = value;
    }

    #[inline]
    pub(crate) fn set_message_id(&mut self, value: u32) {
        if self.v1 {
            self.buf[V1_HEADER_OFFSET + 5] = (value & 0xFF) as u8;
        } else {
            let bytes = value.to_le_bytes();
            self.buf[7..10].copy_from_slice(&bytes[..3]);
        }
    }
}

/// Reads a typed value out of a message field.
///
/// Implemented for the ten numeric scalars, `String` (`char` array fields),
/// `Vec<T>` and `[T; N]` containers of scalars.
pub trait FromMessageField: Sized {
    fn read_from(message: &Message, field_name: &str) -> Result<Self, MessageError>;
}

/// A numeric type a single field element can be read as.
///
/// The element is decoded as the base type the schema declares and then
/// converted with a plain numeric cast.
pub trait MessageScalar: Copy + 'static {
    #[doc(hidden)]
    fn from_value(value: &Value) -> Self;
}

macro_rules! impl_message_scalar {
    ($t:ty, $cast:ident) => {
        impl MessageScalar for $t {
            fn from_value(value: &Value) -> Self {
                value.$cast().unwrap_or_default()
            }
        }

        impl FromMessageField for $t {
            fn read_from(message: &Message, field_name: &str) -> Result<Self, MessageError> {
                message.get_at(field_name, 0)
            }
        }
    };
}

impl_message_scalar!(u8, cast_u8);
impl_message_scalar!(u16, cast_u16);
impl_message_scalar!(u32, cast_u32);
impl_message_scalar!(u64, cast_u64);
impl_message_scalar!(i8, cast_i8);
impl_message_scalar!(i16, cast_i16);
impl_message_scalar!(i32, cast_i32);
impl_message_scalar!(i64, cast_i64);
impl_message_scalar!(f32, cast_f32);
impl_message_scalar!(f64, cast_f64);

impl FromMessageField for String {
    fn read_from(message: &Message, field_name: &str) -> Result<Self, MessageError> {
        message.read_string(field_name)
    }
}

impl<T: MessageScalar> FromMessageField for Vec<T> {
    fn read_from(message: &Message, field_name: &str) -> Result<Self, MessageError> {
        let field = message.field(field_name)?;
        let size = field.field_type.array_size;
        let mut out = Self::with_capacity(size);
        for index in 0..size {
            out.push(T::from_value(&message.read_native(&field, index)));
        }
        Ok(out)
    }
}

impl<T: MessageScalar + Default, const N: usize> FromMessageField for [T; N] {
    fn read_from(message: &Message, field_name: &str) -> Result<Self, MessageError> {
        let field = message.field(field_name)?;
        let size = field.field_type.array_size;
        if N < size {
            return Err(MessageError::OutOfRange {
                field: field_name.to_owned(),
                index: N,
                size,
            });
        }
        let mut out = [T::default(); N];
        for (index, slot) in out.iter_mut().enumerate().take(size) {
            *slot = T::from_value(&message.read_native(&field, index));
        }
        Ok(out)
    }
}

/// A single MAVLink message.
///
/// Owns a fixed wire-layout buffer and references the schema it was created
/// from. A message starts out unframed with an all-zero payload, is filled
/// through the typed setters and framed once with [`Message::finalize`]
/// before sending. Any setter call on a finalized message clears the frame
/// trailer and drops back to the unframed state.
#[derive(Clone)]
pub struct Message {
    definition: Arc<MessageDefinition>,
    source_peer: PeerAddress,
    buf: [u8; MAX_MESSAGE_SIZE],
    crc_offset: Option<usize>,
    v1_framed: bool,
}

impl Message {
    pub(crate) fn new(definition: Arc<MessageDefinition>) -> Self {
        Self {
            definition,
            source_peer: PeerAddress::BROADCAST,
            buf: [0u8; MAX_MESSAGE_SIZE],
            crc_offset: None,
            v1_framed: false,
        }
    }

    pub(crate) fn from_wire(
        definition: Arc<MessageDefinition>,
        source_peer: PeerAddress,
        crc_offset: usize,
        v1_framed: bool,
        buf: [u8; MAX_MESSAGE_SIZE],
    ) -> Self {
        Self {
            definition,
            source_peer,
            buf,
            crc_offset: Some(crc_offset),
            v1_framed,
        }
    }

    pub fn definition(&self) -> &MessageDefinition {
        &self.definition
    }

    pub fn id(&self) -> u32 {
        self.definition.id()
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The transport peer this message was received from; the broadcast
    /// address for locally created messages.
    pub fn source_peer(&self) -> PeerAddress {
        self.source_peer
    }

    pub fn header(&self) -> Header<'_> {
        Header::new(&self.buf, self.v1_framed)
    }

    pub fn header_mut(&mut self) -> HeaderMut<'_> {
        HeaderMut::new(&mut self.buf, self.v1_framed)
    }

    pub fn is_finalized(&self) -> bool {
        self.crc_offset.is_some()
    }

    /// Total on-wire length of the finalized frame.
    pub fn wire_size(&self) -> Option<usize> {
        self.crc_offset.map(|crc_offset| {
            let start = if self.v1_framed { V1_HEADER_OFFSET } else { 0 };
            crc_offset + CHECKSUM_SIZE - start
        })
    }

    /// The bytes to hand to a transport.
    ///
    /// After finalize this is the complete frame, starting at the framing
    /// magic; before finalize it is the whole backing buffer.
    pub fn data(&self) -> &[u8] {
        match self.crc_offset {
            Some(crc_offset) => {
                let start = if self.v1_framed { V1_HEADER_OFFSET } else { 0 };
                &self.buf[start..crc_offset + CHECKSUM_SIZE]
            }
            None => &self.buf[..],
        }
    }

    fn field(&self, name: &str) -> Result<Field, MessageError> {
        self.definition
            .field(name)
            .copied()
            .ok_or_else(|| MessageError::FieldNotFound {
                message: self.definition.name().to_owned(),
                field: name.to_owned(),
            })
    }

    /// End of readable payload for a field: the frame end when finalized
    /// (reads beyond it zero-extend), the field width otherwise.
    fn payload_end(&self, field: &Field) -> usize {
        match self.crc_offset {
            Some(crc_offset) => crc_offset,
            None => field.offset + field.field_type.wire_size(),
        }
    }

    fn read_native(&self, field: &Field, index: usize) -> Value {
        let base = field.field_type.base_type;
        let start = field.offset + index * base.size();
        let end = self.payload_end(field);

        // A truncated frame elides trailing zero bytes; reads past the
        // frame end therefore decode from a zeroed scratch buffer.
        let mut scratch = [0u8; 8];
        if start < end {
            let available = base.size().min(end - start);
            scratch[..available].copy_from_slice(&self.buf[start..start + available]);
        }

        let mut bytes = Bytes::new(&scratch);
        match base {
            BaseType::Char => Value::Char(bytes.get_u8()),
            BaseType::UInt8 => Value::UInt8(bytes.get_u8()),
            BaseType::UInt16 => Value::UInt16(bytes.get_u16_le()),
            BaseType::UInt32 => Value::UInt32(bytes.get_u32_le()),
            BaseType::UInt64 => Value::UInt64(bytes.get_u64_le()),
            BaseType::Int8 => Value::Int8(bytes.get_i8()),
            BaseType::Int16 => Value::Int16(bytes.get_i16_le()),
            BaseType::Int32 => Value::Int32(bytes.get_i32_le()),
            BaseType::Int64 => Value::Int64(bytes.get_i64_le()),
            BaseType::Float => Value::Float(bytes.get_f32_le()),
            BaseType::Double => Value::Double(bytes.get_f64_le()),
        }
    }

    fn read_string(&self, field_name: &str) -> Result<String, MessageError> {
        let field = self.field(field_name)?;
        if field.field_type.base_type != BaseType::Char {
            return Err(MessageError::TypeMismatch {
                field: field_name.to_owned(),
                requested: "a string",
            });
        }
        let end = self.payload_end(&field);
        let max_len = field
            .field_type
            .array_size
            .min(end.saturating_sub(field.offset));
        let raw = &self.buf[field.offset..field.offset + max_len];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(max_len);
        Ok(String::from_utf8_lossy(&raw[..len]).into_owned())
    }

    /// Read a field as `T`.
    ///
    /// Scalars read element 0 with a numeric cast from the declared base
    /// type, `String` reads `char` arrays, `Vec<T>` and `[T; N]` read whole
    /// arrays element-wise.
    pub fn get<T: FromMessageField>(&self, field_name: &str) -> Result<T, MessageError> {
        T::read_from(self, field_name)
    }

    /// Read a single array element as `T`.
    pub fn get_at<T: MessageScalar>(
        &self,
        field_name: &str,
        index: usize,
    ) -> Result<T, MessageError> {
        let field = self.field(field_name)?;
        if index >= field.field_type.array_size {
            return Err(MessageError::OutOfRange {
                field: field_name.to_owned(),
                index,
                size: field.field_type.array_size,
            });
        }
        Ok(T::from_value(&self.read_native(&field, index)))
    }

    /// Read a field in its natural dynamic representation: a scalar for
    /// scalar fields, a string for `char` arrays, a vector otherwise.
    pub fn get_value(&self, field_name: &str) -> Result<Value, MessageError> {
        let field = self.field(field_name)?;
        let base = field.field_type.base_type;
        if field.field_type.array_size <= 1 {
            return Ok(self.read_native(&field, 0));
        }
        Ok(match base {
            BaseType::Char => Value::String(self.read_string(field_name)?),
            BaseType::UInt8 => Value::UInt8Array(self.get(field_name)?),
            BaseType::UInt16 => Value::UInt16Array(self.get(field_name)?),
            BaseType::UInt32 => Value::UInt32Array(self.get(field_name)?),
            BaseType::UInt64 => Value::UInt64Array(self.get(field_name)?),
            BaseType::Int8 => Value::Int8Array(self.get(field_name)?),
            BaseType::Int16 => Value::Int16Array(self.get(field_name)?),
            BaseType::Int32 => Value::Int32Array(self.get(field_name)?),
            BaseType::Int64 => Value::Int64Array(self.get(field_name)?),
            BaseType::Float => Value::FloatArray(self.get(field_name)?),
            BaseType::Double => Value::DoubleArray(self.get(field_name)?),
        })
    }

    /// Write a field. Scalar values write element 0, strings write `char`
    /// arrays, sequences write array fields element-wise.
    ///
    /// Returns `&mut Self` so setters can be chained.
    pub fn set(
        &mut self,
        field_name: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, MessageError> {
        self.set_value(field_name, &value.into())?;
        Ok(self)
    }

    /// Write a single array element.
    pub fn set_at(
        &mut self,
        field_name: &str,
        value: impl Into<Value>,
        index: usize,
    ) -> Result<&mut Self, MessageError> {
        let value = value.into();
        if !value.is_scalar() {
            return Err(MessageError::TypeMismatch {
                field: field_name.to_owned(),
                requested: "a scalar element",
            });
        }
        let field = self.field(field_name)?;
        self.write_scalar(field_name, &field, &value, index)?;
        Ok(self)
    }

    /// Write a field from its dynamic representation.
    pub fn set_value(&mut self, field_name: &str, value: &Value) -> Result<(), MessageError> {
        let field = self.field(field_name)?;
        match value {
            Value::String(s) => self.write_string(field_name, &field, s),
            Value::UInt8Array(v) => self.write_array(field_name, &field, v, Value::UInt8),
            Value::UInt16Array(v) => self.write_array(field_name, &field, v, Value::UInt16),
            Value::UInt32Array(v) => self.write_array(field_name, &field, v, Value::UInt32),
            Value::UInt64Array(v) => self.write_array(field_name, &field, v, Value::UInt64),
            Value::Int8Array(v) => self.write_array(field_name, &field, v, Value::Int8),
            Value::Int16Array(v) => self.write_array(field_name, &field, v, Value::Int16),
            Value::Int32Array(v) => self.write_array(field_name, &field, v, Value::Int32),
            Value::Int64Array(v) => self.write_array(field_name, &field, v, Value::Int64),
            Value::FloatArray(v) => self.write_array(field_name, &field, v, Value::Float),
            Value::DoubleArray(v) => self.write_array(field_name, &field, v, Value::Double),
            scalar => self.write_scalar(field_name, &field, scalar, 0),
        }
    }

    fn write_array<T: Copy>(
        &mut self,
        field_name: &str,
        field: &Field,
        items: &[T],
        wrap: impl Fn(T) -> Value,
    ) -> Result<(), MessageError> {
        if items.len() > field.field_type.array_size {
            return Err(MessageError::OutOfRange {
                field: field_name.to_owned(),
                index: items.len(),
                size: field.field_type.array_size,
            });
        }
        for (index, item) in items.iter().enumerate() {
            self.write_scalar(field_name, field, &wrap(*item), index)?;
        }
        Ok(())
    }

    fn write_string(
        &mut self,
        field_name: &str,
        field: &Field,
        value: &str,
    ) -> Result<(), MessageError> {
        if field.field_type.base_type != BaseType::Char {
            return Err(MessageError::TypeMismatch {
                field: field_name.to_owned(),
                requested: "a string",
            });
        }
        let size = field.field_type.array_size;
        if value.len() > size {
            return Err(MessageError::OutOfRange {
                field: field_name.to_owned(),
                index: value.len(),
                size,
            });
        }
        // an interior NUL would silently truncate every read of the field
        if value.as_bytes().contains(&0) {
            return Err(MessageError::InvalidData {
                field: field_name.to_owned(),
                reason: "string contains an interior NUL byte".to_owned(),
            });
        }
        self.unfinalize();
        let mut writer = BytesMut::new(&mut self.buf[field.offset..field.offset + size]);
        writer.put_slice(value.as_bytes());
        // terminating NUL only when there is room left
        if value.len() < size {
            writer.put_u8(0);
        }
        Ok(())
    }

    fn write_scalar(
        &mut self,
        field_name: &str,
        field: &Field,
        value: &Value,
        index: usize,
    ) -> Result<(), MessageError> {
        let base = field.field_type.base_type;
        if index >= field.field_type.array_size {
            return Err(MessageError::OutOfRange {
                field: field_name.to_owned(),
                index,
                size: field.field_type.array_size,
            });
        }
        let mismatch = || MessageError::TypeMismatch {
            field: field_name.to_owned(),
            requested: "a numeric value",
        };

        self.unfinalize();
        let offset = field.offset + index * base.size();
        let mut writer = BytesMut::new(&mut self.buf[offset..offset + base.size()]);
        match base {
            BaseType::Char | BaseType::UInt8 => {
                writer.put_u8(value.cast_u8().ok_or_else(mismatch)?)
            }
            BaseType::UInt16 => writer.put_u16_le(value.cast_u16().ok_or_else(mismatch)?),
            BaseType::UInt32 => writer.put_u32_le(value.cast_u32().ok_or_else(mismatch)?),
            BaseType::UInt64 => writer.put_u64_le(value.cast_u64().ok_or_else(mismatch)?),
            BaseType::Int8 => writer.put_i8(value.cast_i8().ok_or_else(mismatch)?),
            BaseType::Int16 => writer.put_i16_le(value.cast_i16().ok_or_else(mismatch)?),
            BaseType::Int32 => writer.put_i32_le(value.cast_i32().ok_or_else(mismatch)?),
            BaseType::Int64 => writer.put_i64_le(value.cast_i64().ok_or_else(mismatch)?),
            BaseType::Float => writer.put_f32_le(value.cast_f32().ok_or_else(mismatch)?),
            BaseType::Double => writer.put_f64_le(value.cast_f64().ok_or_else(mismatch)?),
        }
        Ok(())
    }

    /// Drop the framed state: zero everything from the checksum on and mark
    /// the buffer unframed. Every write goes through this.
    fn unfinalize(&mut self) {
        if let Some(crc_offset) = self.crc_offset.take() {
            self.buf[crc_offset..].fill(0);
            self.v1_framed = false;
        }
    }

    /// Frame the message for sending and return the total wire length.
    ///
    /// v2 frames elide trailing zero payload bytes down to a minimum of one
    /// byte; v1 frames always carry the full payload. The system and
    /// component id bytes are filled from `sender` only when still zero, so
    /// ids placed through [`Message::header_mut`] beforehand win.
    ///
    /// Finalizing an already finalized message re-frames it.
    pub fn finalize(&mut self, sequence: u8, sender: NodeId, version: MavlinkVersion) -> usize {
        self.unfinalize();
        let v1 = version == MavlinkVersion::V1;
        self.v1_framed = v1;

        let max_payload = self.definition.max_payload_length();
        let payload_length = if v1 {
            max_payload
        } else {
            remove_trailing_zeroes(&self.buf[HEADER_SIZE..HEADER_SIZE + max_payload]).max(1)
        };

        let message_id = self.definition.id();
        let mut header = HeaderMut::new(&mut self.buf, v1);
        header.set_magic(if v1 { MAV_STX } else { MAV_STX_V2 });
        header.set_len(payload_length as u8);
        if !v1 {
            header.set_incompat_flags(0);
            header.set_compat_flags(0);
        }
        header.set_sequence(sequence);
        if header.system_id() == 0 {
            header.set_system_id(sender.system_id as u8);
        }
        if header.component_id() == 0 {
            header.set_component_id(sender.component_id as u8);
        }
        header.set_message_id(message_id);

        let crc_offset = HEADER_SIZE + payload_length;
        let crc_start = if v1 { V1_HEADER_OFFSET + 1 } else { 1 };
        let crc = calculate_crc(
            &self.buf[crc_start..crc_offset],
            self.definition.crc_extra(),
        );
        let mut writer = BytesMut::new(&mut self.buf[crc_offset..crc_offset + CHECKSUM_SIZE]);
        writer.put_u16_le(crc);
        self.crc_offset = Some(crc_offset);

        let total = crc_offset + CHECKSUM_SIZE;
        if v1 {
            total - V1_HEADER_OFFSET
        } else {
            total
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("finalized", &self.is_finalized())
            .field("source_peer", &self.source_peer)
            .finish()
    }
}

/// Payload length with trailing zero bytes elided; at least one byte
/// remains even if it is zero.
fn remove_trailing_zeroes(data: &[u8]) -> usize {
    let mut len = data.len();
    while len > 1 && data[len - 1] == 0 {
        len -= 1;
    }
    len
}
