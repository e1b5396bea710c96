//! Loads MAVLink message definitions from their XML schema files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::definition::MessageDefinitionBuilder;
use crate::error::ParseError;
use crate::message_set::MessageSet;
use crate::types::{BaseType, FieldType};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum XmlElement {
    Mavlink,
    Include,
    Enums,
    Enum,
    Entry,
    Messages,
    Message,
    Field,
    Extensions,
    Other,
}

const fn identify_element(name: &[u8]) -> XmlElement {
    use self::XmlElement::*;
    match name {
        b"mavlink" => Mavlink,
        b"include" => Include,
        b"enums" => Enums,
        b"enum" => Enum,
        b"entry" => Entry,
        b"messages" => Messages,
        b"message" => Message,
        b"field" => Field,
        b"extensions" => Extensions,
        _ => Other,
    }
}

pub(crate) fn load_file(path: &Path, out: &mut MessageSet) -> Result<(), ParseError> {
    let mut visited = HashSet::new();
    load_file_inner(path, out, &mut visited)
}

fn load_file_inner(
    path: &Path,
    out: &mut MessageSet,
    visited: &mut HashSet<PathBuf>,
) -> Result<(), ParseError> {
    visited.insert(path.to_path_buf());
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    parse(&text, &base_dir, out, visited)
}

pub(crate) fn load_str(
    text: &str,
    base_dir: &Path,
    out: &mut MessageSet,
) -> Result<(), ParseError> {
    let mut visited = HashSet::new();
    parse(text, base_dir, out, &mut visited)
}

fn parse(
    text: &str,
    base_dir: &Path,
    out: &mut MessageSet,
    visited: &mut HashSet<PathBuf>,
) -> Result<(), ParseError> {
    let mut reader = Reader::from_reader(text.as_bytes());
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut found_root = false;
    let mut builder: Option<MessageDefinitionBuilder> = None;
    let mut in_extensions = false;
    let mut include_path = String::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(bytes) => {
                let element = identify_element(bytes.name().into_inner());
                if stack.is_empty() && element != XmlElement::Mavlink {
                    return Err(ParseError::MissingRoot);
                }
                match element {
                    XmlElement::Mavlink => found_root = true,
                    XmlElement::Include => include_path.clear(),
                    XmlElement::Message => {
                        let name = required_attribute(&bytes, "message", "name")?;
                        let id = required_attribute(&bytes, "message", "id")?;
                        let id = id
                            .parse::<u32>()
                            .map_err(|_| ParseError::InvalidNumber(id))?;
                        builder = Some(MessageDefinitionBuilder::new(name, id));
                        in_extensions = false;
                    }
                    XmlElement::Field => add_field(&bytes, &mut builder, in_extensions)?,
                    XmlElement::Extensions => in_extensions = true,
                    XmlElement::Entry => add_enum_entry(&bytes, out)?,
                    _ => {}
                }
                stack.push(element);
            }
            Event::Empty(bytes) => match identify_element(bytes.name().into_inner()) {
                XmlElement::Field => add_field(&bytes, &mut builder, in_extensions)?,
                XmlElement::Extensions => in_extensions = true,
                XmlElement::Entry => add_enum_entry(&bytes, out)?,
                _ => {}
            },
            Event::Text(bytes) => {
                if stack.last() == Some(&XmlElement::Include) {
                    include_path = String::from_utf8_lossy(&bytes).into_owned();
                }
            }
            Event::End(_) => {
                match stack.last() {
                    Some(XmlElement::Message) => {
                        if let Some(finished) = builder.take() {
                            out.add_definition(finished.build()?);
                        }
                    }
                    Some(XmlElement::Include) => {
                        let file = base_dir.join(&include_path);
                        if !visited.contains(&file) {
                            debug!("following include {}", file.display());
                            load_file_inner(&file, out, visited)?;
                        }
                        include_path.clear();
                    }
                    _ => {}
                }
                stack.pop();
            }
            _ => {}
        }
        buf.clear();
    }

    if !found_root {
        return Err(ParseError::MissingRoot);
    }
    Ok(())
}

fn add_field(
    bytes: &BytesStart,
    builder: &mut Option<MessageDefinitionBuilder>,
    in_extensions: bool,
) -> Result<(), ParseError> {
    let Some(pending) = builder.take() else {
        // a <field> outside of <message> carries no meaning
        return Ok(());
    };
    let name = required_attribute(bytes, "field", "name")?;
    let field_type = parse_field_type(&required_attribute(bytes, "field", "type")?)?;
    *builder = Some(if in_extensions {
        pending.extension_field(name, field_type)
    } else {
        pending.field(name, field_type)
    });
    Ok(())
}

fn add_enum_entry(bytes: &BytesStart, out: &mut MessageSet) -> Result<(), ParseError> {
    let name = required_attribute(bytes, "entry", "name")?;
    let value = required_attribute(bytes, "entry", "value")?;
    out.insert_enum(name, parse_enum_value(&value)?);
    Ok(())
}

fn required_attribute(
    bytes: &BytesStart,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, ParseError> {
    for attr in bytes.attributes() {
        let attr = attr.map_err(|e| ParseError::InvalidAttribute(e.to_string()))?;
        if attr.key.into_inner() == attribute.as_bytes() {
            return Ok(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    Err(ParseError::MissingAttribute { element, attribute })
}

/// Field type strings are `BASE` or `BASE[N]`. The match is on the string
/// prefix so the reserved pseudo-type `uint8_t_mavlink_version` falls back
/// to a plain `uint8_t`.
fn parse_field_type(type_string: &str) -> Result<FieldType, ParseError> {
    const BASE_TYPES: &[(&str, BaseType)] = &[
        ("uint8_t", BaseType::UInt8),
        ("uint16_t", BaseType::UInt16),
        ("uint32_t", BaseType::UInt32),
        ("uint64_t", BaseType::UInt64),
        ("int8_t", BaseType::Int8),
        ("int16_t", BaseType::Int16),
        ("int32_t", BaseType::Int32),
        ("int64_t", BaseType::Int64),
        ("char", BaseType::Char),
        ("float", BaseType::Float),
        ("double", BaseType::Double),
    ];

    let array_size = match type_string.find('[') {
        Some(start) => {
            let digits = type_string[start + 1..]
                .strip_suffix(']')
                .ok_or_else(|| ParseError::UnknownFieldType(type_string.to_owned()))?;
            digits
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidNumber(digits.to_owned()))?
        }
        None => 1,
    };

    for (prefix, base_type) in BASE_TYPES {
        if type_string.starts_with(prefix) {
            return Ok(FieldType::array(*base_type, array_size));
        }
    }
    Err(ParseError::UnknownFieldType(type_string.to_owned()))
}

/// Enum values come in decimal, binary (`0b…`), hexadecimal (`0x…`) or
/// power-of-two (`2**N`) notation. Anything else, including trailing
/// garbage, is rejected.
fn parse_enum_value(value: &str) -> Result<u64, ParseError> {
    let number = |digits: &str, radix: u32| {
        u64::from_str_radix(digits, radix).map_err(|_| ParseError::InvalidNumber(value.to_owned()))
    };

    if let Some(digits) = value.strip_prefix("0b").or_else(|| value.strip_prefix("0B")) {
        return number(digits, 2);
    }
    if let Some(digits) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        return number(digits, 16);
    }
    if let Some((base, exponent)) = value.split_once("**") {
        if number(base, 10)? != 2 {
            return Err(ParseError::InvalidNumber(value.to_owned()));
        }
        let exponent = number(exponent, 10)?;
        if exponent > 63 {
            return Err(ParseError::InvalidNumber(value.to_owned()));
        }
        return Ok(1u64 << exponent);
    }
    number(value, 10)
}
