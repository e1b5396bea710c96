//! Concrete [`crate::NetworkInterface`] implementations over the standard
//! library socket types.

#[cfg(feature = "tcp")]
pub mod tcp;
#[cfg(feature = "tcp")]
pub use self::tcp::{TcpClient, TcpServer};

#[cfg(feature = "udp")]
pub mod udp;
#[cfg(feature = "udp")]
pub use self::udp::{UdpClient, UdpServer};

#[cfg(any(feature = "tcp", feature = "udp"))]
use std::io;
#[cfg(any(feature = "tcp", feature = "udp"))]
use std::net::{SocketAddr, SocketAddrV4};

#[cfg(any(feature = "tcp", feature = "udp"))]
use crate::types::PeerAddress;

/// Returns the first socket address `address` resolves to.
#[cfg(any(feature = "tcp", feature = "udp"))]
pub(crate) fn get_socket_addr<T: std::net::ToSocketAddrs>(
    address: &T,
) -> Result<SocketAddr, io::Error> {
    address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::other("Host address lookup failed"))
}

/// IPv4 addresses map with the first octet in the low byte so the textual
/// rendering of [`PeerAddress`] reads naturally; IPv6 peers are only told
/// apart by their port.
#[cfg(any(feature = "tcp", feature = "udp"))]
pub(crate) fn peer_from_socket_addr(address: SocketAddr) -> PeerAddress {
    match address {
        SocketAddr::V4(v4) => {
            PeerAddress::new(u32::from_le_bytes(v4.ip().octets()), v4.port())
        }
        SocketAddr::V6(v6) => PeerAddress::new(0, v6.port()),
    }
}

#[cfg(any(feature = "tcp", feature = "udp"))]
pub(crate) fn socket_addr_from_peer(peer: PeerAddress) -> Result<SocketAddr, io::Error> {
    if peer.is_serial {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "serial peer has no socket address",
        ));
    }
    Ok(SocketAddr::V4(SocketAddrV4::new(
        peer.address.to_le_bytes().into(),
        peer.port,
    )))
}
