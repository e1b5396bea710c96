#![allow(unused)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};

use dynamav::{Message, MessageSet, NetworkError, NetworkInterface, PeerAddress};

/// The heartbeat-only schema most tests run against.
pub const HEARTBEAT_XML: &str = r#"
<mavlink>
    <messages>
        <message id="0" name="HEARTBEAT">
            <field type="uint8_t" name="type">Vehicle or component type</field>
            <field type="uint8_t" name="autopilot">Autopilot type</field>
            <field type="uint8_t" name="base_mode">System mode bitfield</field>
            <field type="uint32_t" name="custom_mode">Autopilot-specific flags</field>
            <field type="uint8_t" name="system_status">System status flag</field>
            <field type="uint8_t" name="mavlink_version">MAVLink version</field>
        </message>
    </messages>
</mavlink>
"#;

/// Heartbeat plus a second, non-heartbeat message.
pub const NETWORK_XML: &str = r#"
<mavlink>
    <messages>
        <message id="0" name="HEARTBEAT">
            <field type="uint8_t" name="type">Vehicle or component type</field>
            <field type="uint8_t" name="autopilot">Autopilot type</field>
            <field type="uint8_t" name="base_mode">System mode bitfield</field>
            <field type="uint32_t" name="custom_mode">Autopilot-specific flags</field>
            <field type="uint8_t" name="system_status">System status flag</field>
            <field type="uint8_t" name="mavlink_version">MAVLink version</field>
        </message>
        <message id="22" name="PARAM_VALUE">
            <field type="char[16]" name="param_id">Parameter id</field>
            <field type="float" name="param_value">Parameter value</field>
            <field type="uint16_t" name="param_count">Total number of parameters</field>
            <field type="uint16_t" name="param_index">Index of this parameter</field>
        </message>
    </messages>
</mavlink>
"#;

/// HEARTBEAT (type=1, autopilot=2, base_mode=3, custom_mode=4,
/// system_status=5, mavlink_version=6) finalized with seq 0 by sender
/// (253, 1).
pub const HEARTBEAT_FRAME_SYS253: &[u8] = &[
    0xFD, 0x09, 0x00, 0x00, 0x00, 0xFD, 0x01, 0x00, 0x00, 0x00, // header
    0x04, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x05, 0x06, // payload
    0x77, 0x53, // crc
];

/// The same heartbeat sent by (1, 1).
pub const HEARTBEAT_FRAME_SYS1: &[u8] = &[
    0xFD, 0x09, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, // header
    0x04, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x05, 0x06, // payload
    0x46, 0x61, // crc
];

/// A CRC-valid frame whose message id (9912) is in nobody's schema.
pub const UNKNOWN_ID_FRAME: &[u8] = &[
    0xFD, 0x04, 0x00, 0x00, 0x00, 0x01, 0x01, 0xB8, 0x26, 0x00, // header
    0xCD, 0xCC, 0x54, 0x41, // payload
    0x59, 0x8E, // crc
];

pub fn heartbeat_set() -> Arc<MessageSet> {
    let mut set = MessageSet::new();
    set.load_str(HEARTBEAT_XML).expect("schema must parse");
    Arc::new(set)
}

pub fn network_set() -> Arc<MessageSet> {
    let mut set = MessageSet::new();
    set.load_str(NETWORK_XML).expect("schema must parse");
    Arc::new(set)
}

/// The heartbeat whose golden frames are above, unframed.
pub fn make_heartbeat(set: &MessageSet) -> Message {
    let mut message = set.create("HEARTBEAT").unwrap();
    message
        .set("type", 1u8)
        .unwrap()
        .set("autopilot", 2u8)
        .unwrap()
        .set("base_mode", 3u8)
        .unwrap()
        .set("custom_mode", 4u32)
        .unwrap()
        .set("system_status", 5u8)
        .unwrap()
        .set("mavlink_version", 6u8)
        .unwrap();
    message
}

#[derive(Default)]
struct ScriptedState {
    queue: VecDeque<(u8, PeerAddress)>,
    interrupted: bool,
    fail_next: bool,
    sent: Vec<(Vec<u8>, PeerAddress)>,
    resyncs: usize,
}

/// An in-memory transport double: tests queue inbound bytes tagged with a
/// peer and inspect everything the runtime sent.
#[derive(Default)]
pub struct ScriptedInterface {
    state: Mutex<ScriptedState>,
    wakeup: Condvar,
}

impl ScriptedInterface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue inbound bytes as if they arrived from `peer`.
    pub fn push(&self, data: &[u8], peer: PeerAddress) {
        let mut state = self.state.lock().unwrap();
        state.queue.extend(data.iter().map(|&byte| (byte, peer)));
        drop(state);
        self.wakeup.notify_all();
    }

    /// Make the next receive call fail with an I/O error.
    pub fn fail_on_next_receive(&self) {
        self.state.lock().unwrap().fail_next = true;
        self.wakeup.notify_all();
    }

    pub fn sent_frames(&self) -> Vec<(Vec<u8>, PeerAddress)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    pub fn resync_count(&self) -> usize {
        self.state.lock().unwrap().resyncs
    }
}

impl NetworkInterface for ScriptedInterface {
    fn send(&self, data: &[u8], peer: PeerAddress) -> Result<(), NetworkError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((data.to_vec(), peer));
        Ok(())
    }

    fn receive(&self, destination: &mut [u8]) -> Result<PeerAddress, NetworkError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.interrupted {
                return Err(NetworkError::Interrupt);
            }
            if state.fail_next {
                state.fail_next = false;
                return Err(io::Error::other("scripted receive failure").into());
            }
            if state.queue.len() >= destination.len() {
                break;
            }
            state = self.wakeup.wait(state).unwrap();
        }
        let mut peer = PeerAddress::BROADCAST;
        for slot in destination.iter_mut() {
            let (byte, byte_peer) = state.queue.pop_front().unwrap();
            *slot = byte;
            peer = byte_peer;
        }
        Ok(peer)
    }

    fn close(&self) {
        self.state.lock().unwrap().interrupted = true;
        self.wakeup.notify_all();
    }

    fn mark_resync(&self) {
        self.state.lock().unwrap().resyncs += 1;
    }

    fn is_connection_oriented(&self) -> bool {
        true
    }
}
