//! TCP MAVLink transports.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::warn;

use crate::error::NetworkError;
use crate::network::NetworkInterface;
use crate::transport::{get_socket_addr, peer_from_socket_addr};
use crate::types::PeerAddress;

/// A connecting TCP endpoint.
pub struct TcpClient {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    control: TcpStream,
    peer: PeerAddress,
    closed: AtomicBool,
}

impl TcpClient {
    pub fn connect<T: ToSocketAddrs>(address: T) -> io::Result<Self> {
        let addr = get_socket_addr(&address)?;
        let socket = TcpStream::connect(addr)?;
        Ok(Self {
            reader: Mutex::new(socket.try_clone()?),
            writer: Mutex::new(socket.try_clone()?),
            control: socket,
            peer: peer_from_socket_addr(addr),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }
}

impl NetworkInterface for TcpClient {
    fn send(&self, data: &[u8], _peer: PeerAddress) -> Result<(), NetworkError> {
        // a TCP stream has exactly one remote; broadcast degenerates to it
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(data)?;
        Ok(())
    }

    fn receive(&self, destination: &mut [u8]) -> Result<PeerAddress, NetworkError> {
        let mut reader = self.reader.lock().unwrap();
        receive_exact(&mut reader, destination, &self.closed)?;
        Ok(self.peer)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            let _ = self.control.shutdown(Shutdown::Both);
        }
    }

    fn is_connection_oriented(&self) -> bool {
        true
    }
}

/// An accepting TCP endpoint.
///
/// Serves a single remote: construction blocks until one client connects.
pub struct TcpServer {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    control: TcpStream,
    peer: PeerAddress,
    closed: AtomicBool,
}

impl TcpServer {
    /// Bind `address` and block until a client connects.
    pub fn accept<T: ToSocketAddrs>(address: T) -> io::Result<Self> {
        let listener = TcpListener::bind(get_socket_addr(&address)?)?;
        let (socket, remote) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(e) => warn!("accept failed: {e}"),
            }
        };
        Ok(Self {
            reader: Mutex::new(socket.try_clone()?),
            writer: Mutex::new(socket.try_clone()?),
            control: socket,
            peer: peer_from_socket_addr(remote),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }
}

impl NetworkInterface for TcpServer {
    fn send(&self, data: &[u8], _peer: PeerAddress) -> Result<(), NetworkError> {
        // single accepted client; addressed and broadcast sends both go there
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(data)?;
        Ok(())
    }

    fn receive(&self, destination: &mut [u8]) -> Result<PeerAddress, NetworkError> {
        let mut reader = self.reader.lock().unwrap();
        receive_exact(&mut reader, destination, &self.closed)?;
        Ok(self.peer)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            let _ = self.control.shutdown(Shutdown::Both);
        }
    }

    fn is_connection_oriented(&self) -> bool {
        true
    }
}

fn receive_exact(
    stream: &mut TcpStream,
    destination: &mut [u8],
    closed: &AtomicBool,
) -> Result<(), NetworkError> {
    match stream.read_exact(destination) {
        Ok(()) => Ok(()),
        Err(_) if closed.load(Ordering::Relaxed) => Err(NetworkError::Interrupt),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(NetworkError::Closed),
        Err(e) => Err(e.into()),
    }
}
