//! UDP MAVLink transports.
//!
//! UDP hands over whole datagrams while the stream parser asks for exact
//! byte counts, so both endpoints keep the current datagram in a buffer
//! and serve reads out of it. A resync discards the rest of the datagram,
//! since a lost frame boundary within a datagram is not recoverable.

use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::NetworkError;
use crate::network::NetworkInterface;
use crate::transport::{get_socket_addr, peer_from_socket_addr, socket_addr_from_peer};
use crate::types::PeerAddress;

const MTU_SIZE: usize = 1500;

/// Poll interval for noticing a local close while blocked in a receive.
const RECEIVE_POLL: Duration = Duration::from_millis(100);

struct DatagramBuffer {
    data: [u8; MTU_SIZE],
    len: usize,
    pos: usize,
    peer: PeerAddress,
}

impl DatagramBuffer {
    fn new() -> Self {
        Self {
            data: [0u8; MTU_SIZE],
            len: 0,
            pos: 0,
            peer: PeerAddress::BROADCAST,
        }
    }

    fn is_drained(&self) -> bool {
        self.pos == self.len
    }

    fn drain_into(&mut self, destination: &mut [u8], filled: usize) -> usize {
        let available = (self.len - self.pos).min(destination.len() - filled);
        destination[filled..filled + available]
            .copy_from_slice(&self.data[self.pos..self.pos + available]);
        self.pos += available;
        available
    }
}

/// A passive UDP endpoint receiving datagrams from arbitrary remotes.
pub struct UdpServer {
    socket: UdpSocket,
    buffer: Mutex<DatagramBuffer>,
    closed: AtomicBool,
}

impl UdpServer {
    pub fn bind<T: ToSocketAddrs>(address: T) -> io::Result<Self> {
        let socket = UdpSocket::bind(get_socket_addr(&address)?)?;
        socket.set_read_timeout(Some(RECEIVE_POLL))?;
        Ok(Self {
            socket,
            buffer: Mutex::new(DatagramBuffer::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

impl NetworkInterface for UdpServer {
    fn send(&self, data: &[u8], peer: PeerAddress) -> Result<(), NetworkError> {
        if peer.is_broadcast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "broadcast send on a connection-less transport",
            )
            .into());
        }
        self.socket.send_to(data, socket_addr_from_peer(peer)?)?;
        Ok(())
    }

    fn receive(&self, destination: &mut [u8]) -> Result<PeerAddress, NetworkError> {
        let mut buffer = self.buffer.lock().unwrap();
        let mut filled = 0;
        while filled < destination.len() {
            if buffer.is_drained() {
                loop {
                    if self.closed.load(Ordering::Relaxed) {
                        return Err(NetworkError::Interrupt);
                    }
                    match self.socket.recv_from(&mut buffer.data) {
                        Ok((len, remote)) => {
                            buffer.len = len;
                            buffer.pos = 0;
                            buffer.peer = peer_from_socket_addr(remote);
                            break;
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                            ) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            filled += buffer.drain_into(destination, filled);
        }
        Ok(buffer.peer)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn mark_resync(&self) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.pos = buffer.len;
    }

    fn is_connection_oriented(&self) -> bool {
        false
    }
}

/// A UDP endpoint talking to one fixed remote.
pub struct UdpClient {
    socket: UdpSocket,
    peer: PeerAddress,
    buffer: Mutex<DatagramBuffer>,
    closed: AtomicBool,
}

impl UdpClient {
    pub fn connect<T: ToSocketAddrs>(address: T) -> io::Result<Self> {
        let remote = get_socket_addr(&address)?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(remote)?;
        socket.set_read_timeout(Some(RECEIVE_POLL))?;
        Ok(Self {
            socket,
            peer: peer_from_socket_addr(remote),
            buffer: Mutex::new(DatagramBuffer::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

impl NetworkInterface for UdpClient {
    fn send(&self, data: &[u8], peer: PeerAddress) -> Result<(), NetworkError> {
        if peer.is_broadcast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "broadcast send on a connection-less transport",
            )
            .into());
        }
        self.socket.send(data)?;
        Ok(())
    }

    fn receive(&self, destination: &mut [u8]) -> Result<PeerAddress, NetworkError> {
        let mut buffer = self.buffer.lock().unwrap();
        let mut filled = 0;
        while filled < destination.len() {
            if buffer.is_drained() {
                loop {
                    if self.closed.load(Ordering::Relaxed) {
                        return Err(NetworkError::Interrupt);
                    }
                    match self.socket.recv(&mut buffer.data) {
                        Ok(len) => {
                            buffer.len = len;
                            buffer.pos = 0;
                            buffer.peer = self.peer;
                            break;
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                            ) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            filled += buffer.drain_into(destination, filled);
        }
        Ok(buffer.peer)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn mark_resync(&self) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.pos = buffer.len;
    }

    fn is_connection_oriented(&self) -> bool {
        false
    }
}
