#![cfg(feature = "udp")]

mod test_shared;

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use dynamav::transport::{UdpClient, UdpServer};
use dynamav::{NetworkRuntime, NodeId, PeerAddress};

/// A runtime behind a [`UdpServer`] answers the datagram source.
#[test]
fn server_runtime_replies_over_udp() {
    const ADDRESS: &str = "127.0.0.1:15611";

    let interface = UdpServer::bind(ADDRESS).expect("bind");
    let runtime = NetworkRuntime::new(
        NodeId::new(253, 1),
        test_shared::heartbeat_set(),
        Arc::new(interface),
    );

    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    raw.send_to(test_shared::HEARTBEAT_FRAME_SYS253, ADDRESS)
        .unwrap();

    let connection = runtime
        .await_connection(Some(Duration::from_secs(10)))
        .expect("datagram heartbeat");
    // the connection is keyed on the raw socket's ephemeral port
    let raw_port = raw.local_addr().unwrap().port();
    assert_eq!(connection.peer().port, raw_port);

    let mut reply = test_shared::make_heartbeat(&test_shared::heartbeat_set());
    connection.send(&mut reply).expect("reply");

    let mut buf = [0u8; 64];
    let (received, from) = raw.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..received], test_shared::HEARTBEAT_FRAME_SYS253);
    assert_eq!(from.port(), 15611);
}

/// A runtime behind a [`UdpClient`] talks to a fixed remote.
#[test]
fn client_runtime_replies_over_udp() {
    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let raw_address = raw.local_addr().unwrap();

    let interface = UdpClient::connect(raw_address).expect("connect");
    let client_address = interface.local_addr().expect("local address");
    let runtime = NetworkRuntime::new(
        NodeId::new(253, 1),
        test_shared::heartbeat_set(),
        Arc::new(interface),
    );

    raw.send_to(test_shared::HEARTBEAT_FRAME_SYS253, client_address)
        .unwrap();
    let connection = runtime
        .await_connection(Some(Duration::from_secs(10)))
        .expect("remote heartbeat");

    let mut reply = test_shared::make_heartbeat(&test_shared::heartbeat_set());
    connection.send(&mut reply).expect("reply");

    let mut buf = [0u8; 64];
    let (received, _) = raw.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..received], test_shared::HEARTBEAT_FRAME_SYS253);
}

/// Broadcast addressing is an error on a connection-less transport.
#[test]
fn broadcast_send_fails_on_udp() {
    use dynamav::NetworkInterface;

    let interface = UdpServer::bind("127.0.0.1:15612").expect("bind");
    assert!(!interface.is_connection_oriented());
    assert!(interface
        .send(test_shared::HEARTBEAT_FRAME_SYS253, PeerAddress::BROADCAST)
        .is_err());
}
