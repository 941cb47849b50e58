use super::{DeliveryState, DeliveryToken, Session, SubscriptionHandle};
use crate::codec::{Address, Message};
use crate::utils::error::{AckError, Error};

fn message(path: &str, content: &'static str) -> Message {
    Message::new(Address::from_path(path), "x", content, "1")
}

#[test]
fn test_session_new() {
    let session = Session::new();
    assert!(!session.incoming());
    assert_eq!(session.pending_count(), 0);
    assert_eq!(session.staged(), 0);
}

#[test]
fn test_subscribe_is_idempotent() {
    let mut session = Session::new();
    let first = session.subscribe("inbox/a");
    let second = session.subscribe("inbox/a");
    let other = session.subscribe("inbox/b");
    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(session.handle_for("inbox/a"), Some(first));
}

#[test]
fn test_confirm_marks_subscription() {
    let mut session = Session::new();
    let handle = session.subscribe("inbox/a");
    assert!(!session.subscription(handle).unwrap().confirmed);
    assert!(session.confirm(handle));
    assert!(session.subscription(handle).unwrap().confirmed);
    assert!(!session.confirm(SubscriptionHandle(99)));
}

#[test]
fn test_routes_to_most_specific_subscription() {
    let mut session = Session::new();
    let broad = session.subscribe("inbox");
    let narrow = session.subscribe("inbox/a");

    assert_eq!(
        session.enqueue_incoming(1, message("inbox/a", "hi")),
        Some(narrow)
    );
    assert_eq!(
        session.enqueue_incoming(2, message("inbox/b/c", "yo")),
        Some(broad)
    );
    assert_eq!(session.pending_count(), 2);
}

#[test]
fn test_unmatched_message_is_dropped() {
    let mut session = Session::new();
    session.subscribe("inbox/a");
    assert_eq!(session.enqueue_incoming(1, message("outbox/a", "hi")), None);
    assert!(!session.incoming());
}

#[test]
fn test_fifo_per_subscription() {
    let mut session = Session::new();
    session.subscribe("inbox/a");
    session.enqueue_incoming(1, message("inbox/a", "m1"));
    session.enqueue_incoming(2, message("inbox/a", "m2"));

    assert_eq!(session.get().unwrap().message.content().as_ref(), b"m1");
    assert_eq!(session.get().unwrap().message.content().as_ref(), b"m2");
    assert!(matches!(session.get(), Err(Error::Empty)));
}

#[test]
fn test_get_merges_subscriptions_by_arrival() {
    let mut session = Session::new();
    let a = session.subscribe("inbox/a");
    let b = session.subscribe("inbox/b");
    session.enqueue_incoming(1, message("inbox/b", "first"));
    session.enqueue_incoming(2, message("inbox/a", "second"));
    session.enqueue_incoming(3, message("inbox/b", "third"));

    let order: Vec<_> = (0..3).map(|_| session.get().unwrap().subscription).collect();
    assert_eq!(order, vec![b, a, b]);
}

#[test]
fn test_accept_once() {
    let mut session = Session::new();
    session.subscribe("inbox/a");
    session.enqueue_incoming(17, message("inbox/a", "hi"));

    let delivery = session.get().unwrap();
    assert_eq!(
        session.delivery_state(delivery.token),
        Some(DeliveryState::Pending)
    );
    assert_eq!(session.accept(delivery.token), Ok(17));
    assert_eq!(
        session.delivery_state(delivery.token),
        Some(DeliveryState::Accepted)
    );
    assert_eq!(
        session.accept(delivery.token),
        Err(AckError::AlreadySettled(delivery.token))
    );
}

#[test]
fn test_accept_unknown_token() {
    let mut session = Session::new();
    let token = DeliveryToken(5);
    assert_eq!(session.accept(token), Err(AckError::Unknown(token)));
    assert_eq!(session.delivery_state(token), None);
}

#[test]
fn test_release_marks_unacked_redelivered() {
    let mut session = Session::new();
    session.subscribe("inbox/a");
    session.enqueue_incoming(1, message("inbox/a", "got"));
    session.enqueue_incoming(2, message("inbox/a", "queued"));
    let delivery = session.get().unwrap();

    assert_eq!(session.release(), 1);
    assert!(!session.incoming());
    assert_eq!(session.unacked_count(), 0);
    assert_eq!(
        session.delivery_state(delivery.token),
        Some(DeliveryState::Redelivered)
    );
    assert_eq!(
        session.accept(delivery.token),
        Err(AckError::Redelivered(delivery.token))
    );
}

#[test]
fn test_unsubscribe_returns_queued_ids() {
    let mut session = Session::new();
    let handle = session.subscribe("inbox/a");
    session.enqueue_incoming(8, message("inbox/a", "one"));
    session.enqueue_incoming(9, message("inbox/a", "two"));

    assert_eq!(session.unsubscribe(handle), Some(vec![8, 9]));
    assert_eq!(session.handle_for("inbox/a"), None);
    assert_eq!(session.unsubscribe(handle), None);
    assert_eq!(session.enqueue_incoming(10, message("inbox/a", "late")), None);
}

#[test]
fn test_stage_and_drain_outgoing() {
    let mut session = Session::new();
    session.stage(message("outbox/a", "one"));
    session.stage(message("outbox/a", "two"));
    assert_eq!(session.staged(), 2);

    let drained = session.drain_outgoing();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].content().as_ref(), b"one");
    assert_eq!(session.staged(), 0);
}
