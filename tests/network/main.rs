use libpubsub::network::error::Error;
use libpubsub::network::*;


use mock::{MockClock, MockTransport};

#[test]
fn test_connect_and_close() {
    let mut transport = MockTransport::new();
    assert!(!transport.is_connected());

    transport
        .connect_address(core::net::Ipv4Addr::new(10, 0, 0, 1), 1883)
        .unwrap();
    assert!(transport.is_connected());

    transport.close().unwrap();
    assert!(!transport.is_connected());

    // The same transport can be opened again.
    transport.connect_host("broker.local", 1883).unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.connects, 2);
}

#[test]
fn test_read_write() {
    let mut transport = MockTransport::new();
    transport.connect_host("broker.local", 1883).unwrap();

    let write_data = [1, 2, 3, 4];
    assert_eq!(transport.write(&write_data), Ok(4));
    assert_eq!(transport.written(), &write_data);

    transport.feed(&[5, 6, 7, 8]);
    assert_eq!(transport.available(), Ok(4));
    assert_eq!(transport.peek(), Ok(Some(5)));

    let mut read_buf = [0; 3];
    assert_eq!(transport.read(&mut read_buf), Ok(3));
    assert_eq!(read_buf, [5, 6, 7]);
    assert_eq!(transport.read_byte(), Ok(Some(8)));
    assert_eq!(transport.read_byte(), Ok(None));
}

#[test]
fn test_op_on_closed_connection() {
    let mut transport = MockTransport::new();

    let mut buf = [0; 4];
    assert_eq!(transport.read(&mut buf), Err(Error::ConnectionClosed));
    assert_eq!(transport.write(&[1, 2]), Err(Error::ConnectionClosed));
    assert_eq!(transport.flush(), Err(Error::ConnectionClosed));
    assert_eq!(transport.available(), Ok(0));
}

#[test]
fn test_refused_connection() {
    let mut transport = MockTransport::new();
    transport.accept_connections = false;
    assert_eq!(
        transport.connect_host("broker.local", 1883),
        Err(Error::ConnectFailed)
    );
    assert!(!transport.is_connected());
}

#[test]
fn test_mock_clock_is_shared() {
    use libpubsub::time::Clock;

    let clock = MockClock::new();
    let handle = clock.clone();
    handle.set(1_000);
    assert_eq!(clock.now_ms(), 1_000);

    handle.auto_advance(10);
    assert_eq!(clock.now_ms(), 1_000);
    assert_eq!(clock.now_ms(), 1_010);
    assert_eq!(handle.get(), 1_020);
}
