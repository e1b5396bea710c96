//! The background receive loop and the per-peer connection registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info};

use crate::error::{ConnectionError, NetworkError};
use crate::message::Message;
use crate::message_set::MessageSet;
use crate::network::connection::Connection;
use crate::network::stream::StreamParser;
use crate::network::NetworkInterface;
use crate::types::{NodeId, PeerAddress};
use crate::MavlinkVersion;

type OnConnectionFn = Box<dyn Fn(&Arc<Connection>) + Send>;

struct RuntimeCore {
    interface: Arc<dyn NetworkInterface>,
    message_set: Arc<MessageSet>,
    own_id: NodeId,
    should_terminate: AtomicBool,
    connections: Mutex<HashMap<PeerAddress, Arc<Connection>>>,
    on_connection: Mutex<Option<OnConnectionFn>>,
    first_connection: Mutex<Option<SyncSender<Arc<Connection>>>>,
    /// Outgoing frame sequence counter. The lock doubles as the send
    /// serialization point, so transports see one send at a time and every
    /// frame leaves with a monotone, wrapping sequence byte.
    send_state: Mutex<u8>,
}

impl RuntimeCore {
    fn send_message(&self, message: &mut Message, peer: PeerAddress) -> Result<usize, NetworkError> {
        let mut sequence = self.send_state.lock().unwrap();
        let wire_length = message.finalize(*sequence, self.own_id, MavlinkVersion::V2);
        *sequence = sequence.wrapping_add(1);
        self.interface.send(message.data(), peer)?;
        Ok(wire_length)
    }

    fn dispatch(self: &Arc<Self>, message: Message) {
        let peer = message.source_peer();
        let mut connections = self.connections.lock().unwrap();
        match connections.get(&peer) {
            Some(connection) => connection.on_inbound(&message),
            None => {
                let connection = self.add_connection(peer);
                connections.insert(peer, Arc::clone(&connection));
                if let Some(on_connection) = self.on_connection.lock().unwrap().as_ref() {
                    on_connection(&connection);
                }
                // the establishing frame is delivered as well, so a first
                // HEARTBEAT immediately arms the liveness window; only then
                // is an await_connection() caller woken
                connection.on_inbound(&message);
                if let Some(notifier) = self.first_connection.lock().unwrap().take() {
                    let _ = notifier.try_send(connection);
                }
            }
        }
    }

    fn add_connection(self: &Arc<Self>, peer: PeerAddress) -> Arc<Connection> {
        info!("new connection from {peer}");
        let connection = Arc::new(Connection::new(Arc::clone(&self.message_set), peer));
        let core: Weak<Self> = Arc::downgrade(self);
        connection.set_send_fn(Box::new(move |message| {
            let Some(core) = core.upgrade() else {
                return Err(NetworkError::Closed);
            };
            core.send_message(message, peer)
        }));
        connection
    }

    fn terminate(&self, error: Option<NetworkError>) {
        self.should_terminate.store(true, Ordering::Relaxed);
        // wake an await_connection() caller that will never be served
        self.first_connection.lock().unwrap().take();
        if let Some(error) = error {
            for connection in self.connections.lock().unwrap().values() {
                connection.on_inbound_error(error.clone());
            }
        }
    }

    fn receive_loop(self: Arc<Self>) {
        let parser = StreamParser::new(Arc::clone(&self.message_set), Arc::clone(&self.interface));
        while !self.should_terminate.load(Ordering::Relaxed) {
            match parser.next_message() {
                Ok(message) => self.dispatch(message),
                Err(NetworkError::Interrupt) => self.terminate(None),
                Err(err) => {
                    error!("receive loop terminating: {err}");
                    self.terminate(Some(err));
                }
            }
        }
    }
}

/// Owns the background receive thread of one transport and demultiplexes
/// inbound traffic into per-peer [`Connection`]s.
///
/// A connection is created lazily for every peer a valid frame arrives
/// from; [`NetworkRuntime::on_connection`] and
/// [`NetworkRuntime::await_connection`] observe new peers. Dropping the
/// runtime closes the transport and joins the receive thread.
pub struct NetworkRuntime {
    core: Arc<RuntimeCore>,
    receive_thread: Option<JoinHandle<()>>,
}

impl NetworkRuntime {
    /// Start a runtime for `interface`, sending with `own_id` as the
    /// default sender identity.
    pub fn new(
        own_id: NodeId,
        message_set: Arc<MessageSet>,
        interface: Arc<dyn NetworkInterface>,
    ) -> Self {
        let core = Arc::new(RuntimeCore {
            interface,
            message_set,
            own_id,
            should_terminate: AtomicBool::new(false),
            connections: Mutex::new(HashMap::new()),
            on_connection: Mutex::new(None),
            first_connection: Mutex::new(None),
            send_state: Mutex::new(0),
        });
        let receive_core = Arc::clone(&core);
        let receive_thread = std::thread::spawn(move || receive_core.receive_loop());
        Self {
            core,
            receive_thread: Some(receive_thread),
        }
    }

    /// Register a callback invoked once for every newly observed peer, on
    /// the receive thread. Register it before the peer shows up.
    pub fn on_connection(&self, callback: impl Fn(&Arc<Connection>) + Send + 'static) {
        *self.core.on_connection.lock().unwrap() = Some(Box::new(callback));
    }

    /// The first connection, existing or forthcoming. `None` waits
    /// forever.
    pub fn await_connection(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Arc<Connection>, ConnectionError> {
        let receiver = {
            let connections = self.core.connections.lock().unwrap();
            if let Some(connection) = connections.values().next() {
                return Ok(Arc::clone(connection));
            }
            let (sender, receiver) = sync_channel(1);
            *self.core.first_connection.lock().unwrap() = Some(sender);
            receiver
        };
        match timeout {
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|e| match e {
                std::sync::mpsc::RecvTimeoutError::Timeout => ConnectionError::Timeout,
                std::sync::mpsc::RecvTimeoutError::Disconnected => {
                    ConnectionError::Network(NetworkError::Closed)
                }
            }),
            None => receiver
                .recv()
                .map_err(|_| ConnectionError::Network(NetworkError::Closed)),
        }
    }

    /// The connection for `peer`, if one was established.
    pub fn connection(&self, peer: PeerAddress) -> Option<Arc<Connection>> {
        self.core.connections.lock().unwrap().get(&peer).cloned()
    }

    /// All currently established connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.core
            .connections
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect()
    }

    /// Stop the receive loop: close the transport, then join the thread.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.core.should_terminate.store(true, Ordering::Relaxed);
        self.core.interface.close();
        self.core.first_connection.lock().unwrap().take();
        if let Some(handle) = self.receive_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NetworkRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
