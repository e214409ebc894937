use std::cell::RefCell;
use std::rc::Rc;

use core::net::Ipv4Addr;
use libpubsub::network::application::mqtt::{
    Callback, Client, Config, Options, ProtocolVersion, QoS, Server, State, Will,
};
use libpubsub::network::error::Error;

use crate::mock::{MockClock, MockTransport};

const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

/// Collects every message handed to the callback.
#[derive(Debug, Clone, Default)]
struct Inbox(Rc<RefCell<Vec<(String, Vec<u8>)>>>);

impl Inbox {
    fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.0.borrow().clone()
    }
}

impl Callback for Inbox {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self.0.borrow_mut().push((topic.to_string(), payload.to_vec()));
    }
}

type TestClient<const N: usize = 128> = Client<MockTransport, MockClock, Inbox, N>;

fn config() -> Config {
    Config {
        protocol: ProtocolVersion::V3_1_1,
        ..Config::default()
    }
}

fn new_client<const N: usize>() -> (TestClient<N>, MockClock, Inbox) {
    let clock = MockClock::new();
    let inbox = Inbox::default();
    let server = Server::address(Ipv4Addr::new(192, 168, 1, 10), 1883);
    let client = Client::new(MockTransport::new(), clock.clone(), server, inbox.clone())
        .with_config(config());
    (client, clock, inbox)
}

/// A session that has completed the handshake, with the write log cleared.
fn connected_client<const N: usize>() -> (TestClient<N>, MockClock, Inbox) {
    let (mut client, clock, inbox) = new_client::<N>();
    client.transport_mut().feed(&CONNACK_ACCEPTED);
    client.connect(&Options::new("c1")).unwrap();
    client.transport_mut().take_written();
    (client, clock, inbox)
}

#[test]
fn test_connect_sends_exact_packet() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.transport_mut().feed(&CONNACK_ACCEPTED);

    assert_eq!(client.connect(&Options::new("c1")), Ok(()));
    assert_eq!(client.state(), State::Connected);
    assert!(client.is_connected());
    assert_eq!(
        client.transport().last_address,
        Some((Ipv4Addr::new(192, 168, 1, 10), 1883))
    );
    assert_eq!(
        client.transport_mut().take_written(),
        [
            0x10, 14, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 15, 0x00, 0x02, b'c',
            b'1'
        ]
    );
}

#[test]
fn test_connect_mqtt_3_1() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.set_config(Config {
        protocol: ProtocolVersion::V3_1,
        ..config()
    });
    client.transport_mut().feed(&CONNACK_ACCEPTED);

    client.connect(&Options::new("c1")).unwrap();
    assert_eq!(
        client.transport_mut().take_written(),
        [
            0x10, 16, 0x00, 0x06, b'M', b'Q', b'I', b's', b'd', b'p', 0x03, 0x02, 0x00, 15, 0x00,
            0x02, b'c', b'1'
        ]
    );
}

#[test]
fn test_connect_with_will_and_credentials() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.transport_mut().feed(&CONNACK_ACCEPTED);

    let options = Options::new("c")
        .with_credentials("u", Some("p"))
        .with_will(Will {
            topic: "w",
            message: b"bye",
            qos: QoS::AtLeastOnce,
            retain: true,
        });
    client.connect(&options).unwrap();

    assert_eq!(
        client.transport_mut().take_written(),
        [
            0x10, 27, // fixed header
            0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, // protocol
            0xEE, // clean session, will qos 1 retained, username, password
            0x00, 15, // keepalive
            0x00, 0x01, b'c', // client id
            0x00, 0x01, b'w', // will topic
            0x00, 0x03, b'b', b'y', b'e', // will message
            0x00, 0x01, b'u', // username
            0x00, 0x01, b'p', // password
        ]
    );
}

#[test]
fn test_password_without_username_is_not_sent() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.transport_mut().feed(&CONNACK_ACCEPTED);

    let options = Options {
        password: Some("secret"),
        clean_session: false,
        ..Options::new("c1")
    };
    client.connect(&options).unwrap();

    let written = client.transport_mut().take_written();
    assert_eq!(written[9], 0x00);
    assert_eq!(written.len(), 16);
}

#[test]
fn test_connect_by_hostname() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.set_server_host("broker.local", 8883).unwrap();
    client.transport_mut().feed(&CONNACK_ACCEPTED);

    client.connect(&Options::new("c1")).unwrap();
    assert_eq!(
        client.transport().last_host.as_deref(),
        Some("broker.local")
    );
    assert_eq!(client.server().port, 8883);
}

#[test]
fn test_invalid_server_host() {
    assert_eq!(Server::host("", 1883), Err(Error::InvalidAddress));
    let long = "h".repeat(129);
    assert_eq!(Server::host(&long, 1883), Err(Error::InvalidAddress));
    assert!(Server::host(&long[..128], 1883).is_ok());
}

#[test]
fn test_connect_when_already_connected_is_a_no_op() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    assert_eq!(client.connect(&Options::new("c1")), Ok(()));
    assert!(client.transport().written().is_empty());
    assert_eq!(client.transport().connects, 1);
}

#[test]
fn test_connack_return_codes() {
    let cases = [
        (1, State::BadProtocol),
        (2, State::BadClientId),
        (3, State::Unavailable),
        (4, State::BadCredentials),
        (5, State::Unauthorized),
        (9, State::Refused(9)),
    ];

    for (code, state) in cases {
        let (mut client, _clock, _inbox) = new_client::<128>();
        client.transport_mut().feed(&[0x20, 0x02, 0x00, code]);

        assert_eq!(
            client.connect(&Options::new("c1")),
            Err(Error::ConnectionRefused)
        );
        assert_eq!(client.state(), state);
        assert_eq!(client.state().code(), i16::from(code));
        assert!(!client.is_connected());
        assert!(!client.transport().is_open());
    }
}

#[test]
fn test_connect_transport_failure() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.transport_mut().accept_connections = false;

    assert_eq!(
        client.connect(&Options::new("c1")),
        Err(Error::ConnectFailed)
    );
    assert_eq!(client.state(), State::ConnectFailed);
    assert_eq!(client.state().code(), -2);
    assert!(client.transport().written().is_empty());
}

#[test]
fn test_connect_timeout() {
    let (mut client, clock, _inbox) = new_client::<128>();
    clock.auto_advance(100);

    assert_eq!(client.connect(&Options::new("c1")), Err(Error::Timeout));
    assert_eq!(client.state(), State::ConnectionTimeout);
    assert_eq!(client.state().code(), -4);
    assert!(!client.transport().is_open());
    assert!(clock.get() >= 15_000);
}

#[test]
fn test_connect_rejects_unexpected_answer() {
    let (mut client, _clock, _inbox) = new_client::<128>();
    client.transport_mut().feed(&[0xD0, 0x00]);

    assert_eq!(
        client.connect(&Options::new("c1")),
        Err(Error::ProtocolError)
    );
    assert_eq!(client.state(), State::ConnectFailed);
    assert!(!client.transport().is_open());
}

#[test]
fn test_connect_too_large_for_buffer() {
    let (mut client, _clock, _inbox) = new_client::<16>();

    assert_eq!(
        client.connect(&Options::new("a-very-long-client-identifier")),
        Err(Error::BufferOverflow)
    );
    assert_eq!(client.state(), State::Disconnected);
    assert_eq!(client.transport().connects, 0);
}

#[test]
fn test_operations_require_connection() {
    let (mut client, _clock, _inbox) = new_client::<128>();

    assert_eq!(client.publish("t", b"hi", false), Err(Error::NotOpen));
    assert_eq!(
        client.subscribe("t", QoS::AtMostOnce),
        Err(Error::NotOpen)
    );
    assert_eq!(client.unsubscribe("t"), Err(Error::NotOpen));
    assert_eq!(client.poll(), Err(Error::NotOpen));
    assert!(!client.is_connected());
    assert_eq!(client.state(), State::Disconnected);
    assert!(client.transport().written().is_empty());
}

#[test]
fn test_publish_bytes() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    client.publish("t", b"hi", false).unwrap();
    assert_eq!(
        client.transport_mut().take_written(),
        [0x30, 0x05, 0x00, 0x01, b't', b'h', b'i']
    );

    client.publish("t", b"", true).unwrap();
    assert_eq!(
        client.transport_mut().take_written(),
        [0x31, 0x03, 0x00, 0x01, b't']
    );
}

#[test]
fn test_publish_capacity() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    let payload = [0x55; 121];
    assert_eq!(
        client.publish("t", &payload, false),
        Err(Error::BufferOverflow)
    );
    assert!(client.transport().written().is_empty());

    // 5 + 2 + 1 + 120 fills the buffer exactly.
    client.publish("t", &payload[..120], false).unwrap();
    let written = client.transport_mut().take_written();
    assert_eq!(written.len(), 2 + 3 + 120);
    assert_eq!(&written[..5], &[0x30, 123, 0x00, 0x01, b't']);
}

#[test]
fn test_publish_two_byte_remaining_length() {
    let (mut client, _clock, _inbox) = connected_client::<256>();

    let payload = [0xAB; 200];
    client.publish("t", &payload, false).unwrap();
    let written = client.transport_mut().take_written();
    assert_eq!(&written[..5], &[0x30, 0xCB, 0x01, 0x00, 0x01]);
    assert_eq!(written.len(), 3 + 203);
}

#[test]
fn test_publish_in_chunks() {
    let (mut client, _clock, _inbox) = connected_client::<128>();
    client.set_config(Config {
        max_transfer_size: Some(4),
        ..config()
    });

    client.publish("t", b"hi", false).unwrap();
    assert_eq!(client.transport().write_calls.as_slice(), &[4, 3]);
    assert_eq!(
        client.transport().written(),
        &[0x30, 0x05, 0x00, 0x01, b't', b'h', b'i']
    );
}

#[test]
fn test_short_write_fails() {
    let (mut client, _clock, _inbox) = connected_client::<128>();
    client.transport_mut().write_limit = Some(2);

    assert_eq!(client.publish("t", b"hi", false), Err(Error::WriteError));
}

#[test]
fn test_subscribe_and_unsubscribe_bytes() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    assert_eq!(client.subscribe("s", QoS::AtLeastOnce), Ok(1));
    assert_eq!(
        client.transport_mut().take_written(),
        [0x82, 0x06, 0x00, 0x01, 0x00, 0x01, b's', 0x01]
    );

    assert_eq!(client.unsubscribe("s"), Ok(2));
    assert_eq!(
        client.transport_mut().take_written(),
        [0xA2, 0x05, 0x00, 0x02, 0x00, 0x01, b's']
    );

    assert_eq!(client.subscribe("s", QoS::AtMostOnce), Ok(3));
    assert_eq!(client.transport_mut().take_written()[7], 0x00);
}

#[test]
fn test_subscribe_rejects_qos2() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    assert_eq!(
        client.subscribe("s", QoS::ExactlyOnce),
        Err(Error::InvalidQoS)
    );
    assert!(client.transport().written().is_empty());
    // No id was consumed.
    assert_eq!(client.subscribe("s", QoS::AtMostOnce), Ok(1));
}

#[test]
fn test_subscribe_capacity() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    let topic = "x".repeat(119);
    assert_eq!(
        client.subscribe(&topic, QoS::AtMostOnce),
        Err(Error::BufferOverflow)
    );
    assert_eq!(client.unsubscribe(&"x".repeat(120)), Err(Error::BufferOverflow));
    assert!(client.transport().written().is_empty());

    assert_eq!(client.subscribe(&topic[..118], QoS::AtMostOnce), Ok(1));
    assert_eq!(client.transport_mut().take_written().len(), 2 + 123);
}

#[test]
fn test_message_ids_wrap_and_skip_zero() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    let mut last = 0;
    for expected in 1..=u16::MAX {
        last = client.subscribe("s", QoS::AtMostOnce).unwrap();
        assert_eq!(last, expected);
    }
    assert_eq!(last, u16::MAX);
    assert_eq!(client.unsubscribe("s"), Ok(1));
}

#[test]
fn test_message_ids_restart_after_reconnect() {
    let (mut client, _clock, _inbox) = connected_client::<128>();
    assert_eq!(client.subscribe("s", QoS::AtMostOnce), Ok(1));
    assert_eq!(client.subscribe("s", QoS::AtMostOnce), Ok(2));

    client.disconnect().unwrap();
    client.transport_mut().feed(&CONNACK_ACCEPTED);
    client.connect(&Options::new("c1")).unwrap();
    assert_eq!(client.subscribe("s", QoS::AtMostOnce), Ok(1));
}

#[test]
fn test_poll_dispatches_qos0_publish() {
    let (mut client, _clock, inbox) = connected_client::<128>();
    client
        .transport_mut()
        .feed(&[0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'x', b'y']);

    assert_eq!(client.poll(), Ok(()));
    assert_eq!(
        inbox.messages(),
        vec![("a/b".to_string(), b"xy".to_vec())]
    );
    assert!(client.transport().written().is_empty());
}

#[test]
fn test_poll_acknowledges_qos1_publish() {
    let (mut client, _clock, inbox) = connected_client::<128>();
    client.transport_mut().feed(&[
        0x32, 0x09, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x07, b'x', b'y',
    ]);

    assert_eq!(client.poll(), Ok(()));
    assert_eq!(
        inbox.messages(),
        vec![("a/b".to_string(), b"xy".to_vec())]
    );
    assert_eq!(client.transport_mut().take_written(), [0x40, 0x02, 0x00, 0x07]);
}

#[test]
fn test_poll_delivers_qos2_without_ack() {
    let (mut client, _clock, inbox) = connected_client::<128>();
    client
        .transport_mut()
        .feed(&[0x34, 0x06, 0x00, 0x01, b'q', 0x00, 0x09, b'z']);

    assert_eq!(client.poll(), Ok(()));
    assert_eq!(inbox.messages(), vec![("q".to_string(), b"z".to_vec())]);
    assert!(client.transport().written().is_empty());
}

#[test]
fn test_poll_handles_one_packet_per_call() {
    let (mut client, _clock, inbox) = connected_client::<128>();
    client.transport_mut().feed(&[0x30, 0x04, 0x00, 0x01, b'a', b'1']);
    client.transport_mut().feed(&[0x30, 0x04, 0x00, 0x01, b'b', b'2']);

    client.poll().unwrap();
    assert_eq!(inbox.messages().len(), 1);
    client.poll().unwrap();
    assert_eq!(
        inbox.messages(),
        vec![
            ("a".to_string(), b"1".to_vec()),
            ("b".to_string(), b"2".to_vec())
        ]
    );
    assert_eq!(client.transport().pending(), 0);
}

#[test]
fn test_poll_drops_oversized_packet_and_stays_aligned() {
    let (mut client, _clock, inbox) = connected_client::<32>();

    let mut oversized = vec![0x30, 43, 0x00, 0x01, b'a'];
    oversized.extend_from_slice(&[0x11; 40]);
    client.transport_mut().feed(&oversized);
    client.transport_mut().feed(&[0x30, 0x04, 0x00, 0x01, b'b', b'2']);

    assert_eq!(client.poll(), Ok(()));
    assert!(inbox.messages().is_empty());
    assert_eq!(client.state(), State::Connected);

    assert_eq!(client.poll(), Ok(()));
    assert_eq!(inbox.messages(), vec![("b".to_string(), b"2".to_vec())]);
}

#[test]
fn test_poll_survives_truncated_packet() {
    let (mut client, clock, inbox) = connected_client::<128>();
    client.transport_mut().feed(&[0x30, 0x05, 0x00, 0x01]);
    clock.auto_advance(100);

    assert_eq!(client.poll(), Ok(()));
    assert!(inbox.messages().is_empty());
    assert_eq!(client.state(), State::Connected);
}

#[test]
fn test_poll_answers_pingreq() {
    let (mut client, _clock, _inbox) = connected_client::<128>();
    client.transport_mut().feed(&[0xC0, 0x00]);

    client.poll().unwrap();
    assert_eq!(client.transport_mut().take_written(), [0xD0, 0x00]);
}

#[test]
fn test_poll_ignores_acknowledgments() {
    let (mut client, _clock, inbox) = connected_client::<128>();
    client
        .transport_mut()
        .feed(&[0x90, 0x03, 0x00, 0x01, 0x00, 0xB0, 0x02, 0x00, 0x02]);

    client.poll().unwrap();
    client.poll().unwrap();
    assert!(inbox.messages().is_empty());
    assert!(client.transport().written().is_empty());
    assert_eq!(client.transport().pending(), 0);
}

#[test]
fn test_keepalive_sends_pingreq() {
    let (mut client, clock, _inbox) = connected_client::<128>();

    clock.set(15_000);
    client.poll().unwrap();
    assert!(client.transport().written().is_empty());

    clock.set(15_001);
    client.poll().unwrap();
    assert_eq!(client.transport_mut().take_written(), [0xC0, 0x00]);

    // Answered: the next interval pings again instead of timing out.
    client.transport_mut().feed(&[0xD0, 0x00]);
    client.poll().unwrap();
    clock.set(30_003);
    client.poll().unwrap();
    assert_eq!(client.transport_mut().take_written(), [0xC0, 0x00]);
    assert_eq!(client.state(), State::Connected);
}

#[test]
fn test_keepalive_timeout() {
    let (mut client, clock, _inbox) = connected_client::<128>();

    clock.set(15_001);
    client.poll().unwrap();
    assert_eq!(client.transport_mut().take_written(), [0xC0, 0x00]);

    clock.set(30_002);
    assert_eq!(client.poll(), Err(Error::Timeout));
    assert_eq!(client.state(), State::ConnectionTimeout);
    assert!(!client.transport().is_open());
    assert!(!client.is_connected());
    assert_eq!(client.poll(), Err(Error::NotOpen));
}

#[test]
fn test_keepalive_survives_clock_wrap() {
    let clock = MockClock::new();
    clock.set(u32::MAX - 5_000);
    let server = Server::address(Ipv4Addr::LOCALHOST, 1883);
    let mut client: TestClient =
        Client::new(MockTransport::new(), clock.clone(), server, Inbox::default())
            .with_config(config());
    client.transport_mut().feed(&CONNACK_ACCEPTED);
    client.connect(&Options::new("c1")).unwrap();
    client.transport_mut().take_written();

    clock.advance(10_000);
    client.poll().unwrap();
    assert!(client.transport().written().is_empty());

    clock.advance(5_001);
    client.poll().unwrap();
    assert_eq!(client.transport_mut().take_written(), [0xC0, 0x00]);
}

#[test]
fn test_keepalive_disabled() {
    let (mut client, clock, _inbox) = connected_client::<128>();
    client.set_config(Config {
        keep_alive_seconds: 0,
        ..config()
    });

    clock.set(1_000_000);
    client.poll().unwrap();
    assert!(client.transport().written().is_empty());
}

#[test]
fn test_connection_loss_is_detected() {
    let (mut client, _clock, _inbox) = connected_client::<128>();
    let closes = client.transport().closes;

    client.transport_mut().drop_connection();
    assert!(!client.is_connected());
    assert_eq!(client.state(), State::ConnectionLost);
    assert_eq!(client.state().code(), -3);
    assert_eq!(client.transport().closes, closes + 1);

    assert_eq!(client.poll(), Err(Error::NotOpen));
    assert_eq!(client.publish("t", b"hi", false), Err(Error::NotOpen));
}

#[test]
fn test_disconnect() {
    let (mut client, _clock, _inbox) = connected_client::<128>();

    assert_eq!(client.disconnect(), Ok(()));
    assert_eq!(client.transport().written(), &[0xE0, 0x00]);
    assert_eq!(client.state(), State::Disconnected);
    assert!(!client.transport().is_open());
    assert!(!client.is_connected());
}

#[test]
fn test_into_parts_returns_transport() {
    let (client, _clock, _inbox) = connected_client::<128>();
    let (transport, _clock, _callback) = client.into_parts();
    assert!(transport.is_open());
}

#[test]
fn test_closure_callback() {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let mut client: Client<_, _, _> = Client::new(
        MockTransport::new(),
        MockClock::new(),
        Server::address(Ipv4Addr::LOCALHOST, 1883),
        move |topic: &str, payload: &[u8]| {
            sink.borrow_mut().push((topic.to_string(), payload.len()));
        },
    );
    client.transport_mut().feed(&CONNACK_ACCEPTED);
    client.connect(&Options::new("c1")).unwrap();
    client
        .transport_mut()
        .feed(&[0x30, 0x06, 0x00, 0x01, b't', b'a', b'b', b'c']);

    client.poll().unwrap();
    assert_eq!(*received.borrow(), vec![("t".to_string(), 3)]);
}
