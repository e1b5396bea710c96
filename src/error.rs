use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while loading message definitions from XML or while
/// resolving messages against a [`crate::MessageSet`].
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XML syntax error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    InvalidAttribute(String),
    #[error("could not read definition file {}", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("root element <mavlink> not found")]
    MissingRoot,
    #[error("element <{element}> is missing attribute \"{attribute}\"")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("unknown field type \"{0}\"")]
    UnknownFieldType(String),
    #[error("could not parse \"{0}\" as a number")]
    InvalidNumber(String),
    #[error("message {message}: duplicate field \"{field}\"")]
    DuplicateField { message: String, field: String },
    #[error("message {message}: field \"{field}\" has array size 0")]
    InvalidArraySize { message: String, field: String },
    #[error("message {message}: payload of {length} bytes exceeds the maximum of 255")]
    PayloadTooLarge { message: String, length: usize },
    #[error("no message named \"{0}\" in message set")]
    UnknownMessageName(String),
    #[error("no message with id {0} in message set")]
    UnknownMessageId(u32),
    #[error("enum entry \"{0}\" not in message set")]
    UnknownEnumEntry(String),
    #[error("frame of {0} bytes is too short to parse")]
    FrameTooShort(usize),
    #[error("invalid framing magic 0x{0:02X}")]
    InvalidMagic(u8),
    #[error("checksum mismatch")]
    CrcMismatch,
}

/// Errors raised by the typed field accessors of a [`crate::Message`].
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("field \"{field}\" does not exist in message {message}")]
    FieldNotFound { message: String, field: String },
    #[error("field \"{field}\" can not be accessed as {requested}")]
    TypeMismatch {
        field: String,
        requested: &'static str,
    },
    #[error("index or length {index} is out of range for field \"{field}\" of size {size}")]
    OutOfRange {
        field: String,
        index: usize,
        size: usize,
    },
    #[error("invalid data for field \"{field}\": {reason}")]
    InvalidData { field: String, reason: String },
}

/// Transport level failures.
///
/// Cloneable so a single failure of the shared receive path can be handed
/// to every connection of a runtime.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("network I/O error: {0}")]
    Io(Arc<std::io::Error>),
    /// The remote end closed the transport.
    #[error("network closed")]
    Closed,
    /// The transport was closed locally, e.g. during shutdown.
    #[error("network interrupted")]
    Interrupt,
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Errors surfaced by [`crate::Connection`] and [`crate::NetworkRuntime`]
/// operations that wait for or send messages.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("timed out")]
    Timeout,
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Schema(#[from] ParseError),
}
