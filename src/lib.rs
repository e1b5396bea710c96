//! Runtime-schema MAVLink.
//!
//! # Message sets and dynamic messages
//! Most MAVLink implementations generate code for a fixed dialect at compile
//! time. This crate instead loads message definitions from the standard
//! MAVLink XML files at runtime into a [`MessageSet`] and represents every
//! message as a [`Message`]: a wire-layout byte buffer plus a reference to
//! its [`MessageDefinition`]. Fields are read and written by name, with the
//! value coerced to the base type declared in the schema.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use dynamav::{MessageSet, MavlinkVersion, NodeId};
//!
//! let mut message_set = MessageSet::new();
//! message_set.load_file("message_definitions/common.xml")?;
//!
//! let mut heartbeat = message_set.create("HEARTBEAT")?;
//! heartbeat
//!     .set("type", 2u8)?
//!     .set("autopilot", 3u8)?
//!     .set("custom_mode", 0u32)?;
//! let wire_length = heartbeat.finalize(0, NodeId::default(), MavlinkVersion::V2);
//! let frame: &[u8] = heartbeat.data();
//! # let _ = (wire_length, frame);
//! # Ok(())
//! # }
//! ```
//!
//! # Networking
//! A [`NetworkRuntime`] drives a background receive thread over any
//! [`NetworkInterface`] byte transport, demultiplexes inbound frames by the
//! remote [`PeerAddress`] into per-peer [`Connection`]s and hands each
//! connection a send path. Connections offer callbacks and blocking
//! request/response style [`Expectation`]s with timeouts. TCP and UDP
//! transports ship behind the `tcp`/`udp` features (both on by default);
//! any other byte transport can be plugged in by implementing
//! [`NetworkInterface`].

#![deny(clippy::all)]
#![warn(clippy::use_self)]

pub mod bytes;
pub mod bytes_mut;
pub mod crc;
pub mod definition;
pub mod error;
pub mod message;
pub mod message_set;
pub mod types;
mod xml;

mod network;
pub use self::network::connection::{
    CallbackHandle, Connection, Expectation, CONNECTION_TIMEOUT,
};
pub use self::network::runtime::NetworkRuntime;
pub use self::network::stream::StreamParser;
pub use self::network::NetworkInterface;

pub mod transport;

pub use self::crc::MavCrc;
pub use self::definition::{Field, MessageDefinition, MessageDefinitionBuilder};
pub use self::error::{ConnectionError, MessageError, NetworkError, ParseError};
pub use self::message::{Header, HeaderMut, Message};
pub use self::message_set::{MessageIdent, MessageSet};
pub use self::types::{BaseType, FieldType, NodeId, PeerAddress, Value, ANY_ID};

/// Message framing marker for mavlink v1
pub const MAV_STX: u8 = 0xFE;

/// Message framing marker for mavlink v2
pub const MAV_STX_V2: u8 = 0xFD;

/// Byte offset of the nested v1 header inside the message buffer.
///
/// The v1 header is 4 bytes shorter than the v2 one; keeping the payload at
/// a fixed buffer offset for both framings means the v1 header starts here
/// instead of at 0.
pub const V1_HEADER_OFFSET: usize = 4;

/// Size of the v2 header, including the framing magic.
pub const HEADER_SIZE: usize = 10;

pub const MAX_PAYLOAD_SIZE: usize = 255;
pub const CHECKSUM_SIZE: usize = 2;
pub const SIGNATURE_SIZE: usize = 13;

/// Size of the backing buffer of a [`Message`]; the largest possible v2
/// frame (header + payload + checksum + signature).
pub const MAX_MESSAGE_SIZE: usize =
    MAX_PAYLOAD_SIZE + HEADER_SIZE + CHECKSUM_SIZE + SIGNATURE_SIZE;

/// v2 incompatibility flag bit marking a signed frame.
pub const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Versions of the Mavlink protocol that we support
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MavlinkVersion {
    V1,
    V2,
}
