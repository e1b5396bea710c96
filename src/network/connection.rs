//! Per-peer connection state: callbacks, request/response expectations and
//! the send path injected by the runtime.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;

use crate::error::{ConnectionError, NetworkError, ParseError};
use crate::message::Message;
use crate::message_set::{MessageIdent, MessageSet};
use crate::types::{NodeId, PeerAddress, ANY_ID};

/// A connection is considered dead when no HEARTBEAT arrived within this
/// window; [`Connection::send`] refuses with a timeout then.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(5000);

pub type CallbackHandle = u64;

type SendFn = Box<dyn Fn(&mut Message) -> Result<usize, NetworkError> + Send + Sync>;

enum Callback {
    User(Box<dyn Fn(&Message) + Send>),
    Expect {
        sender: SyncSender<Result<Message, NetworkError>>,
        message_id: u32,
        filter: NodeId,
    },
}

struct CallbackTable {
    next_handle: CallbackHandle,
    callbacks: BTreeMap<CallbackHandle, Callback>,
    pending_error: Option<NetworkError>,
}

/// The per-peer endpoint of a [`crate::NetworkRuntime`].
///
/// Connections are created by the runtime when a first frame from a new
/// peer arrives and are handed out as `Arc<Connection>`. Inbound messages
/// are dispatched to the registered callbacks on the receive thread, under
/// the connection lock and in registration order; callbacks must be quick
/// and must not register or wait for anything on the same connection.
/// Sending from a callback is fine.
pub struct Connection {
    peer: PeerAddress,
    message_set: Arc<MessageSet>,
    heartbeat_id: Option<u32>,
    /// Milliseconds since the unix epoch of the last HEARTBEAT, 0 for none.
    last_heartbeat_ms: AtomicU64,
    send_fn: OnceLock<SendFn>,
    table: Arc<Mutex<CallbackTable>>,
}

impl Connection {
    pub(crate) fn new(message_set: Arc<MessageSet>, peer: PeerAddress) -> Self {
        let heartbeat_id = message_set.id_for("HEARTBEAT").ok();
        Self {
            peer,
            message_set,
            heartbeat_id,
            last_heartbeat_ms: AtomicU64::new(0),
            send_fn: OnceLock::new(),
            table: Arc::new(Mutex::new(CallbackTable {
                next_handle: 0,
                callbacks: BTreeMap::new(),
                pending_error: None,
            })),
        }
    }

    pub(crate) fn set_send_fn(&self, send_fn: SendFn) {
        let _ = self.send_fn.set(send_fn);
    }

    /// The remote peer this connection talks to.
    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    /// Whether a HEARTBEAT arrived within [`CONNECTION_TIMEOUT`].
    pub fn is_alive(&self) -> bool {
        let last = self.last_heartbeat_ms.load(Ordering::Relaxed);
        last != 0 && now_millis().saturating_sub(last) < CONNECTION_TIMEOUT.as_millis() as u64
    }

    /// Deliver an inbound message. Called on the receive thread.
    pub(crate) fn on_inbound(&self, message: &Message) {
        // not our peer, not our business
        if message.source_peer() != self.peer {
            debug!(
                "connection {} ignoring message from {}",
                self.peer,
                message.source_peer()
            );
            return;
        }

        if Some(message.id()) == self.heartbeat_id {
            self.last_heartbeat_ms.store(now_millis(), Ordering::Relaxed);
        }

        let mut table = self.table.lock().unwrap();
        let mut fired = Vec::new();
        for (&handle, callback) in table.callbacks.iter() {
            match callback {
                Callback::User(callback) => callback(message),
                Callback::Expect {
                    sender,
                    message_id,
                    filter,
                } => {
                    if *message_id == message.id() && filter.matches(&message.header().source()) {
                        let _ = sender.try_send(Ok(message.clone()));
                        fired.push(handle);
                    }
                }
            }
        }
        // expectations are one-shot; detach every one that fired
        for handle in fired {
            table.callbacks.remove(&handle);
        }
    }

    /// Record a fatal receive-path error. Wakes every waiting expectation
    /// and fails all future waits.
    pub(crate) fn on_inbound_error(&self, error: NetworkError) {
        let mut table = self.table.lock().unwrap();
        table.pending_error = Some(error.clone());
        table.callbacks.retain(|_, callback| match callback {
            Callback::Expect { sender, .. } => {
                let _ = sender.try_send(Err(error.clone()));
                false
            }
            Callback::User(_) => true,
        });
    }

    /// Register a callback invoked for every inbound message of this peer.
    pub fn add_message_callback(
        &self,
        callback: impl Fn(&Message) + Send + 'static,
    ) -> CallbackHandle {
        let mut table = self.table.lock().unwrap();
        let handle = table.next_handle;
        table.next_handle += 1;
        table.callbacks.insert(handle, Callback::User(Box::new(callback)));
        handle
    }

    pub fn remove_message_callback(&self, handle: CallbackHandle) {
        self.table.lock().unwrap().callbacks.remove(&handle);
    }

    /// Finalize and send a message to this peer, provided the connection is
    /// still alive per the HEARTBEAT window.
    ///
    /// Fails with [`ConnectionError::Timeout`] when no HEARTBEAT was seen
    /// within [`CONNECTION_TIMEOUT`]. Schemas without a HEARTBEAT message
    /// have no liveness signal at all; sending is then unconditional.
    pub fn send(&self, message: &mut Message) -> Result<usize, ConnectionError> {
        if self.heartbeat_id.is_some() && !self.is_alive() {
            return Err(ConnectionError::Timeout);
        }
        self.force_send(message)
    }

    /// Finalize and send without the liveness check.
    pub fn force_send(&self, message: &mut Message) -> Result<usize, ConnectionError> {
        let send_fn = self.send_fn.get().ok_or(NetworkError::Closed)?;
        Ok(send_fn(message)?)
    }

    /// Install a one-shot subscription for the next message matching `message`,
    /// from any source.
    ///
    /// The subscription detaches as soon as it fires, and unregisters on
    /// drop if it never does.
    pub fn expect<'a>(
        &self,
        message: impl Into<MessageIdent<'a>>,
    ) -> Result<Expectation, ParseError> {
        self.expect_from(message, ANY_ID, ANY_ID)
    }

    /// Like [`Connection::expect`], additionally filtering on the sender
    /// system and component id; [`ANY_ID`] matches everything.
    pub fn expect_from<'a>(
        &self,
        message: impl Into<MessageIdent<'a>>,
        source_id: i32,
        component_id: i32,
    ) -> Result<Expectation, ParseError> {
        let message_id = match message.into() {
            MessageIdent::Id(id) => id,
            MessageIdent::Name(name) => self.message_set.id_for(name)?,
        };
        let (sender, receiver) = sync_channel(1);

        let mut table = self.table.lock().unwrap();
        if let Some(error) = &table.pending_error {
            // the receive path is already dead; fail the wait immediately
            let _ = sender.try_send(Err(error.clone()));
        }
        let handle = table.next_handle;
        table.next_handle += 1;
        table.callbacks.insert(
            handle,
            Callback::Expect {
                sender,
                message_id,
                filter: NodeId::new(source_id, component_id),
            },
        );

        Ok(Expectation {
            handle,
            receiver,
            table: Arc::downgrade(&self.table),
        })
    }

    /// Wait for an expectation to fire. `None` waits forever.
    pub fn receive(
        &self,
        expectation: Expectation,
        timeout: Option<Duration>,
    ) -> Result<Message, ConnectionError> {
        let result = match timeout {
            Some(timeout) => expectation
                .receiver
                .recv_timeout(timeout)
                .map_err(|_| ConnectionError::Timeout)?,
            None => expectation
                .receiver
                .recv()
                .map_err(|_| ConnectionError::Network(NetworkError::Closed))?,
        };
        result.map_err(ConnectionError::Network)
        // the expectation drops here and unregisters its callback
    }

    /// Convenience composition of [`Connection::expect_from`] and
    /// [`Connection::receive`].
    pub fn wait_for<'a>(
        &self,
        message: impl Into<MessageIdent<'a>>,
        source_id: i32,
        component_id: i32,
        timeout: Option<Duration>,
    ) -> Result<Message, ConnectionError> {
        let expectation = self.expect_from(message, source_id, component_id)?;
        self.receive(expectation, timeout)
    }

    /// Number of currently registered callbacks, including pending
    /// expectations. Mostly useful for diagnostics.
    pub fn callback_count(&self) -> usize {
        self.table.lock().unwrap().callbacks.len()
    }
}

/// A one-shot subscription created by [`Connection::expect`].
///
/// Holds the receiving end of the future and the callback handle; dropping
/// it unregisters the callback so an expectation that is never received
/// does not leak.
pub struct Expectation {
    handle: CallbackHandle,
    receiver: Receiver<Result<Message, NetworkError>>,
    table: Weak<Mutex<CallbackTable>>,
}

impl Drop for Expectation {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().unwrap().callbacks.remove(&self.handle);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
