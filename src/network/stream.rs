//! Reassembles MAVLink frames out of a transport byte stream.

use std::sync::Arc;

use log::{debug, trace};

use crate::crc::calculate_crc;
use crate::error::NetworkError;
use crate::message::{Header, Message};
use crate::message_set::MessageSet;
use crate::network::NetworkInterface;
use crate::{
    CHECKSUM_SIZE, HEADER_SIZE, INCOMPAT_FLAG_SIGNED, MAV_STX, MAV_STX_V2, MAX_MESSAGE_SIZE,
    SIGNATURE_SIZE, V1_HEADER_OFFSET,
};

/// Pulls bytes from a [`NetworkInterface`] and yields parsed messages.
///
/// Bytes that do not line up with a valid frame are discarded: the parser
/// scans for a framing magic, reads the header and the length-derived rest
/// of the frame, and drops anything with an unknown message id or a bad
/// checksum before trying again. Only transport errors surface.
pub struct StreamParser {
    message_set: Arc<MessageSet>,
    interface: Arc<dyn NetworkInterface>,
}

impl StreamParser {
    pub fn new(message_set: Arc<MessageSet>, interface: Arc<dyn NetworkInterface>) -> Self {
        Self {
            message_set,
            interface,
        }
    }

    /// Block until the next well-formed, CRC-valid message arrives.
    pub fn next_message(&self) -> Result<Message, NetworkError> {
        loop {
            let mut buf = [0u8; MAX_MESSAGE_SIZE];

            // synchronize on a framing magic; the magic picks the framing
            let mut magic = [0u8; 1];
            self.interface.receive(&mut magic)?;
            let (v1, base) = match magic[0] {
                MAV_STX_V2 => (false, 0),
                MAV_STX => (true, V1_HEADER_OFFSET),
                other => {
                    trace!("dropping stray byte 0x{other:02X} while synchronizing");
                    self.interface.mark_resync();
                    continue;
                }
            };
            buf[base] = magic[0];
            self.interface.receive(&mut buf[base + 1..HEADER_SIZE])?;

            let header = Header::new(&buf, v1);
            let payload_length = usize::from(header.len());
            let signature_length = if !v1 && header.incompat_flags() & INCOMPAT_FLAG_SIGNED != 0 {
                SIGNATURE_SIZE
            } else {
                0
            };
            let message_id = header.message_id();

            let body_length = payload_length + CHECKSUM_SIZE + signature_length;
            let peer = self
                .interface
                .receive(&mut buf[HEADER_SIZE..HEADER_SIZE + body_length])?;
            let crc_offset = HEADER_SIZE + payload_length;

            let Some(definition) = self.message_set.definition(message_id) else {
                // without a definition there is no crc extra, so the frame
                // can not even be validated
                debug!("dropping frame with unknown message id {message_id}");
                continue;
            };

            let received = u16::from_le_bytes([buf[crc_offset], buf[crc_offset + 1]]);
            let computed = calculate_crc(&buf[base + 1..crc_offset], definition.crc_extra());
            if received != computed {
                debug!(
                    "dropping {} frame with checksum mismatch (got {received:04X}, want {computed:04X})",
                    definition.name()
                );
                continue;
            }

            return Ok(Message::from_wire(
                Arc::clone(definition),
                peer,
                crc_offset,
                v1,
                buf,
            ));
        }
    }
}
