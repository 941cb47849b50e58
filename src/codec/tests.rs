use super::{Address, Frame, Message, Outcome};
use crate::utils::error::{AddressError, DecodeError};

fn bark(path: &str) -> Message {
    Message::new(Address::from_path(path), "ark3", "woof woof", "msg00000001")
}

#[test]
fn test_parse_full_address() {
    let addr = Address::parse("amqp://localhost:5674/outbox/ark3").unwrap();
    assert_eq!(addr.scheme(), Some("amqp"));
    assert_eq!(addr.host(), Some("localhost"));
    assert_eq!(addr.port(), Some(5674));
    assert_eq!(addr.path(), "outbox/ark3");
    assert_eq!(addr.to_string(), "amqp://localhost:5674/outbox/ark3");
}

#[test]
fn test_parse_nested_routing_key() {
    let addr = Address::parse("amqp://localhost:5673///localhost/inbox/ark3").unwrap();
    assert_eq!(addr.port(), Some(5673));
    assert_eq!(addr.path(), "//localhost/inbox/ark3");
}

#[test]
fn test_parse_schemeless_and_bare_forms() {
    let addr = Address::parse("//localhost/inbox/ark3").unwrap();
    assert_eq!(addr.scheme(), None);
    assert_eq!(addr.host(), Some("localhost"));
    assert_eq!(addr.port(), None);
    assert_eq!(addr.path(), "inbox/ark3");

    let bare: Address = "inbox/ark3".parse().unwrap();
    assert_eq!(bare.host(), None);
    assert_eq!(bare.path(), "inbox/ark3");
    assert_eq!(bare.to_string(), "inbox/ark3");
}

#[test]
fn test_parse_rejects_bad_input() {
    assert_eq!(Address::parse("  "), Err(AddressError::Empty));
    assert_eq!(
        Address::parse("amqp://host:port/x"),
        Err(AddressError::InvalidPort("port".to_string()))
    );
    assert!(matches!(
        Address::parse("amqp:///x"),
        Err(AddressError::MissingHost(_))
    ));
}

#[test]
fn test_socket_addr_uses_default_port() {
    let addr = Address::parse("//relay.local/inbox").unwrap();
    assert_eq!(addr.socket_addr(5672).as_deref(), Some("relay.local:5672"));
    assert_eq!(Address::from_path("inbox").socket_addr(5672), None);
}

#[test]
fn test_routes_walk_ancestors() {
    let addr = Address::from_path("inbox/ark3/x");
    assert_eq!(
        addr.routes(),
        vec!["inbox/ark3/x", "inbox/ark3/", "inbox/ark3", "inbox/", "inbox"]
    );
    assert!(addr.matches("inbox"));
    assert!(addr.matches("inbox/ark3/"));
    assert!(!addr.matches("inbox/ar"));
    assert!(!addr.matches("outbox"));
}

#[test]
fn test_routes_ignore_query_for_ancestors() {
    let addr = Address::from_path("inbox/a?since=3");
    assert_eq!(addr.routes(), vec!["inbox/a?since=3", "inbox/", "inbox"]);
}

#[test]
fn test_message_round_trip_binary_body() {
    let message = Message::new(
        Address::parse("amqp://localhost:5674/outbox/ark3").unwrap(),
        vec![0u8, 159, 146, 150],
        Vec::<u8>::new(),
        vec![0xffu8; 300],
    );
    let decoded = Message::decode(&message.encode()).unwrap();
    assert_eq!(decoded, message);
}

#[test]
fn test_message_decode_truncated() {
    let encoded = bark("inbox/a").encode();
    let err = Message::decode(&encoded[..encoded.len() - 3]).unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { .. }));
}

#[test]
fn test_message_decode_trailing_bytes() {
    let mut encoded = bark("inbox/a").encode().to_vec();
    encoded.push(0);
    assert_eq!(
        Message::decode(&encoded),
        Err(DecodeError::TrailingBytes(1))
    );
}

#[test]
fn test_message_text_is_lossy() {
    let message = Message::new(Address::from_path("a"), "x", vec![b'h', b'i', 0xff], "1");
    let text = message.text();
    assert_eq!(text.sender, "x");
    assert_eq!(text.content, "hi\u{fffd}");
    assert_eq!(text.id, "1");
}

#[test]
fn test_frame_round_trips() {
    let frames = vec![
        Frame::Attach {
            handle: 3,
            pattern: "inbox/ark3".to_string(),
        },
        Frame::Attached { handle: 3 },
        Frame::Transfer {
            delivery: u64::MAX,
            message: bark("inbox/ark3"),
        },
        Frame::Disposition {
            delivery: 42,
            outcome: Outcome::Rejected,
        },
        Frame::Detach { handle: 3 },
        Frame::Close,
    ];
    for frame in frames {
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }
}

#[test]
fn test_frame_decode_errors() {
    assert_eq!(Frame::decode(&[]), Err(DecodeError::EmptyFrame));
    assert_eq!(Frame::decode(&[0x7f]), Err(DecodeError::UnknownTag(0x7f)));

    let mut disposition = Frame::Disposition {
        delivery: 1,
        outcome: Outcome::Accepted,
    }
    .encode()
    .to_vec();
    *disposition.last_mut().unwrap() = 9;
    assert_eq!(
        Frame::decode(&disposition),
        Err(DecodeError::UnknownOutcome(9))
    );

    let attach = Frame::Attach {
        handle: 1,
        pattern: "inbox".to_string(),
    }
    .encode();
    assert!(matches!(
        Frame::decode(&attach[..6]),
        Err(DecodeError::Truncated { .. })
    ));
}

#[test]
fn test_frame_rejects_invalid_utf8_pattern() {
    let mut raw = vec![1u8, 0, 0, 0, 1, 0, 0, 0, 2];
    raw.extend_from_slice(&[0xc3, 0x28]);
    assert_eq!(Frame::decode(&raw), Err(DecodeError::InvalidUtf8));
}
