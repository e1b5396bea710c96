//! The scalar type system of the MAVLink schema and the identities used on
//! the wire and on the network.

use core::fmt;

/// Wildcard for system / component id filters.
pub const ANY_ID: i32 = -1;

const DEFAULT_ID: i32 = 97;

/// A MAVLink system / component pair.
///
/// Either field may be [`ANY_ID`] when the id is used as a filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub system_id: i32,
    pub component_id: i32,
}

impl NodeId {
    /// Matches every node when used as a filter.
    pub const ANY: Self = Self {
        system_id: ANY_ID,
        component_id: ANY_ID,
    };

    pub const fn new(system_id: i32, component_id: i32) -> Self {
        Self {
            system_id,
            component_id,
        }
    }

    /// Filter semantics: each field matches when it is equal or [`ANY_ID`]
    /// on either side.
    pub fn matches(&self, other: &Self) -> bool {
        (self.system_id == ANY_ID
            || other.system_id == ANY_ID
            || self.system_id == other.system_id)
            && (self.component_id == ANY_ID
                || other.component_id == ANY_ID
                || self.component_id == other.component_id)
    }
}

impl Default for NodeId {
    /// The id used when the user does not pick one.
    fn default() -> Self {
        Self::new(DEFAULT_ID, DEFAULT_ID)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system_id, self.component_id)
    }
}

/// Transport level identity of a remote endpoint.
///
/// For IP transports `address` holds the IPv4 address with the first octet
/// in the least significant byte; for serial links it is an opaque
/// interface id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress {
    pub address: u32,
    pub port: u16,
    pub is_serial: bool,
}

impl PeerAddress {
    /// The distinguished broadcast peer.
    pub const BROADCAST: Self = Self {
        address: 0,
        port: 0,
        is_serial: false,
    };

    pub const fn new(address: u32, port: u16) -> Self {
        Self {
            address,
            port,
            is_serial: false,
        }
    }

    pub const fn serial(interface_id: u32) -> Self {
        Self {
            address: interface_id,
            port: 0,
            is_serial: true,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.address == 0 && self.port == 0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_serial {
            write!(f, "serial {:x}", self.address)
        } else {
            let octets = self.address.to_le_bytes();
            write!(
                f,
                "{}.{}.{}.{}:{}",
                octets[0], octets[1], octets[2], octets[3], self.port
            )
        }
    }
}

/// The closed set of scalar types a MAVLink field can have.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    Char,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
}

impl BaseType {
    /// Size of one element on the wire.
    pub const fn size(self) -> usize {
        match self {
            Self::Char | Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float => 4,
            Self::UInt64 | Self::Int64 | Self::Double => 8,
        }
    }

    /// The wire-type spelling that goes into the crc extra fingerprint.
    pub const fn crc_name(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::UInt8 => "uint8_t",
            Self::UInt16 => "uint16_t",
            Self::UInt32 => "uint32_t",
            Self::UInt64 => "uint64_t",
            Self::Int8 => "int8_t",
            Self::Int16 => "int16_t",
            Self::Int32 => "int32_t",
            Self::Int64 => "int64_t",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

/// A field type: base type plus array length, 1 for scalars.
///
/// Strings are `char` arrays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub base_type: BaseType,
    pub array_size: usize,
}

impl FieldType {
    pub const fn scalar(base_type: BaseType) -> Self {
        Self {
            base_type,
            array_size: 1,
        }
    }

    pub const fn array(base_type: BaseType, array_size: usize) -> Self {
        Self {
            base_type,
            array_size,
        }
    }

    /// Width of the whole field on the wire.
    pub const fn wire_size(&self) -> usize {
        self.base_type.size() * self.array_size
    }
}

/// Dynamically typed field value.
///
/// This is the pivot of the get / set API: every setter argument converts
/// into a `Value` and is then coerced to the base type the schema declares
/// for the field. `char` holds a single byte, like the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Char(u8),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    UInt8Array(Vec<u8>),
    UInt16Array(Vec<u16>),
    UInt32Array(Vec<u32>),
    UInt64Array(Vec<u64>),
    Int8Array(Vec<i8>),
    Int16Array(Vec<i16>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
}

macro_rules! value_scalar_cast {
    ($name:ident, $t:ty) => {
        #[allow(clippy::unnecessary_cast)]
        pub(crate) fn $name(&self) -> Option<$t> {
            Some(match *self {
                Self::Char(v) => v as $t,
                Self::UInt8(v) => v as $t,
                Self::UInt16(v) => v as $t,
                Self::UInt32(v) => v as $t,
                Self::UInt64(v) => v as $t,
                Self::Int8(v) => v as $t,
                Self::Int16(v) => v as $t,
                Self::Int32(v) => v as $t,
                Self::Int64(v) => v as $t,
                Self::Float(v) => v as $t,
                Self::Double(v) => v as $t,
                _ => return None,
            })
        }
    };
}

impl Value {
    value_scalar_cast!(cast_u8, u8);
    value_scalar_cast!(cast_u16, u16);
    value_scalar_cast!(cast_u32, u32);
    value_scalar_cast!(cast_u64, u64);
    value_scalar_cast!(cast_i8, i8);
    value_scalar_cast!(cast_i16, i16);
    value_scalar_cast!(cast_i32, i32);
    value_scalar_cast!(cast_i64, i64);
    value_scalar_cast!(cast_f32, f32);
    value_scalar_cast!(cast_f64, f64);

    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Self::String(_)
                | Self::UInt8Array(_)
                | Self::UInt16Array(_)
                | Self::UInt32Array(_)
                | Self::UInt64Array(_)
                | Self::Int8Array(_)
                | Self::Int16Array(_)
                | Self::Int32Array(_)
                | Self::Int64Array(_)
                | Self::FloatArray(_)
                | Self::DoubleArray(_)
        )
    }
}

macro_rules! value_from {
    ($t:ty, $scalar:ident, $array:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::$scalar(v)
            }
        }

        impl From<Vec<$t>> for Value {
            fn from(v: Vec<$t>) -> Self {
                Self::$array(v)
            }
        }

        impl From<&[$t]> for Value {
            fn from(v: &[$t]) -> Self {
                Self::$array(v.to_vec())
            }
        }

        impl<const N: usize> From<[$t; N]> for Value {
            fn from(v: [$t; N]) -> Self {
                Self::$array(v.to_vec())
            }
        }
    };
}

value_from!(u8, UInt8, UInt8Array);
value_from!(u16, UInt16, UInt16Array);
value_from!(u32, UInt32, UInt32Array);
value_from!(u64, UInt64, UInt64Array);
value_from!(i8, Int8, Int8Array);
value_from!(i16, Int16, Int16Array);
value_from!(i32, Int32, Int32Array);
value_from!(i64, Int64, Int64Array);
value_from!(f32, Float, FloatArray);
value_from!(f64, Double, DoubleArray);

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v as u8)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
