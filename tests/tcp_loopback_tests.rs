#![cfg(feature = "tcp")]

mod test_shared;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use dynamav::transport::{TcpClient, TcpServer};
use dynamav::{NetworkRuntime, NodeId};

/// A runtime behind a [`TcpServer`] answers a raw socket client.
#[test]
fn server_runtime_replies_over_tcp() {
    const ADDRESS: &str = "127.0.0.1:15601";

    let server = std::thread::spawn(move || {
        let interface = TcpServer::accept(ADDRESS).expect("bind and accept");
        let runtime = NetworkRuntime::new(
            NodeId::new(253, 1),
            test_shared::heartbeat_set(),
            Arc::new(interface),
        );
        let connection = runtime
            .await_connection(Some(Duration::from_secs(10)))
            .expect("client heartbeat");
        let mut reply = test_shared::make_heartbeat(&test_shared::heartbeat_set());
        connection.send(&mut reply).expect("reply");
        // hold the runtime until the reply is on the wire
        std::thread::sleep(Duration::from_millis(200));
    });

    let mut socket = connect_with_retry(ADDRESS);
    socket
        .write_all(test_shared::HEARTBEAT_FRAME_SYS253)
        .unwrap();

    let mut reply = [0u8; 21];
    socket.read_exact(&mut reply).unwrap();
    assert_eq!(reply, test_shared::HEARTBEAT_FRAME_SYS253);

    server.join().unwrap();
}

/// A runtime behind a [`TcpClient`] talks to a raw socket server.
#[test]
fn client_runtime_replies_over_tcp() {
    const ADDRESS: &str = "127.0.0.1:15602";

    let listener = TcpListener::bind(ADDRESS).unwrap();
    let raw_server = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        socket
            .write_all(test_shared::HEARTBEAT_FRAME_SYS253)
            .unwrap();
        let mut reply = [0u8; 21];
        socket.read_exact(&mut reply).unwrap();
        reply
    });

    let interface = TcpClient::connect(ADDRESS).expect("connect");
    let runtime = NetworkRuntime::new(
        NodeId::new(253, 1),
        test_shared::heartbeat_set(),
        Arc::new(interface),
    );
    let connection = runtime
        .await_connection(Some(Duration::from_secs(10)))
        .expect("server heartbeat");
    let mut reply = test_shared::make_heartbeat(&test_shared::heartbeat_set());
    connection.send(&mut reply).expect("reply");

    let echoed = raw_server.join().unwrap();
    assert_eq!(echoed, test_shared::HEARTBEAT_FRAME_SYS253);
}

fn connect_with_retry(address: &str) -> TcpStream {
    for _ in 0..100 {
        if let Ok(socket) = TcpStream::connect(address) {
            return socket;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server at {address} never came up");
}
