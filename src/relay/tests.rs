use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::engine::{Relay, RetryReport};
use super::server;
use crate::client::Messenger;
use crate::codec::{Address, Frame, Message, Outcome};
use crate::config::{RelaySettings, Settings};
use crate::persistence::History;
use crate::transport::NetConnector;
use crate::transport::memory::MemoryConnector;

fn settings(ack_timeout_ms: u64, max_retries: u8) -> RelaySettings {
    RelaySettings {
        ack_timeout_ms,
        max_retries,
        ..Settings::default().relay
    }
}

fn bark(path: &str, content: &str) -> Message {
    Message::new(Address::from_path(path), "rex", content.to_string(), "msg1")
}

fn join(relay: &mut Relay, id: &str) -> UnboundedReceiver<Frame> {
    let (tx, rx) = mpsc::unbounded_channel();
    relay.register_client(id.to_string(), tx);
    rx
}

fn attach(relay: &mut Relay, rx: &mut UnboundedReceiver<Frame>, id: &str, pattern: &str) {
    relay.attach(&id.to_string(), 0, pattern.to_string());
    assert_eq!(rx.try_recv().unwrap(), Frame::Attached { handle: 0 });
}

fn transfer(rx: &mut UnboundedReceiver<Frame>) -> (u64, Message) {
    match rx.try_recv() {
        Ok(Frame::Transfer { delivery, message }) => (delivery, message),
        other => panic!("expected a transfer, got {other:?}"),
    }
}

#[test]
fn test_publish_routes_to_matching_subscribers() {
    let mut relay = Relay::new(&settings(5000, 5), None);
    let mut parent = join(&mut relay, "parent");
    let mut exact = join(&mut relay, "exact");
    let mut other = join(&mut relay, "other");
    attach(&mut relay, &mut parent, "parent", "outbox");
    attach(&mut relay, &mut exact, "exact", "outbox/ark3");
    attach(&mut relay, &mut other, "other", "inbox");

    assert_eq!(relay.publish(bark("outbox/ark3", "woof")), 2);

    let (first, message) = transfer(&mut parent);
    assert_eq!(message.text().content, "woof");
    let (second, _) = transfer(&mut exact);
    assert_ne!(first, second);
    assert!(other.try_recv().is_err());
    assert_eq!(relay.pending_count(), 2);
}

#[test]
fn test_detach_stops_routing() {
    let mut relay = Relay::new(&settings(5000, 5), None);
    let mut rx = join(&mut relay, "a");
    attach(&mut relay, &mut rx, "a", "outbox");
    relay.detach(&"a".to_string(), 0);
    assert_eq!(relay.publish(bark("outbox/ark3", "woof")), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_settle_only_by_recipient() {
    let mut relay = Relay::new(&settings(5000, 5), None);
    let mut rx = join(&mut relay, "a");
    let _other = join(&mut relay, "b");
    attach(&mut relay, &mut rx, "a", "outbox");
    relay.publish(bark("outbox/ark3", "woof"));
    let (delivery, _) = transfer(&mut rx);

    relay.settle(&"b".to_string(), delivery, Outcome::Accepted);
    assert!(relay.pending(delivery).is_some());
    relay.settle(&"a".to_string(), delivery + 100, Outcome::Accepted);
    assert_eq!(relay.pending_count(), 1);

    relay.settle(&"a".to_string(), delivery, Outcome::Accepted);
    assert_eq!(relay.pending_count(), 0);
}

#[test]
fn test_unsettled_deliveries_are_retried_then_dropped() {
    let mut relay = Relay::new(&settings(100, 1), None);
    let mut rx = join(&mut relay, "a");
    attach(&mut relay, &mut rx, "a", "outbox");
    relay.publish(bark("outbox/ark3", "woof"));
    let (delivery, _) = transfer(&mut rx);
    let sent_at = relay.pending(delivery).unwrap().sent_at;

    assert_eq!(relay.retry_due(sent_at + 50), RetryReport::default());

    let report = relay.retry_due(sent_at + 101);
    assert_eq!(report, RetryReport { resent: 1, dropped: 0 });
    let (again, message) = transfer(&mut rx);
    assert_eq!(again, delivery);
    assert_eq!(message.text().content, "woof");
    assert_eq!(relay.pending(delivery).unwrap().retries, 1);

    let report = relay.retry_due(sent_at + 300);
    assert_eq!(report, RetryReport { resent: 0, dropped: 1 });
    assert_eq!(relay.pending_count(), 0);
}

#[test]
fn test_cleanup_abandons_pending() {
    let mut relay = Relay::new(&settings(5000, 5), None);
    let mut rx = join(&mut relay, "a");
    attach(&mut relay, &mut rx, "a", "outbox");
    relay.publish(bark("outbox/ark3", "woof"));

    relay.cleanup_client(&"a".to_string());
    relay.cleanup_client(&"a".to_string());
    assert_eq!(relay.client_count(), 0);
    assert_eq!(relay.pending_count(), 0);
}

#[test]
fn test_attach_replays_history() {
    let history = History::temporary(None, None).unwrap();
    let mut relay = Relay::new(&settings(5000, 5), Some(history));
    assert_eq!(relay.publish(bark("outbox/ark3", "earlier")), 0);

    let mut rx = join(&mut relay, "late");
    attach(&mut relay, &mut rx, "late", "outbox");
    let (delivery, message) = transfer(&mut rx);
    assert_eq!(message.text().content, "earlier");
    assert!(relay.pending(delivery).is_some());
}

async fn pump_until_pending(messenger: &mut Messenger) {
    for _ in 0..50 {
        if messenger.work(Some(Duration::from_millis(100))).await.unwrap() {
            return;
        }
    }
    panic!("no delivery arrived");
}

#[tokio::test]
async fn test_messengers_talk_through_in_process_relay() {
    let relay = Arc::new(Mutex::new(Relay::new(&settings(5000, 5), None)));
    let (connector, acceptor) = MemoryConnector::new();
    tokio::spawn(server::run_memory(acceptor, relay.clone()));

    let mut listener = Messenger::new(connector.clone());
    listener.start("amqp://relay").await.unwrap();
    listener.subscribe("//relay/outbox/ark3").await.unwrap();

    let mut barker = Messenger::new(connector);
    barker.start("amqp://relay").await.unwrap();

    // wait for the subscription to be acknowledged before publishing
    listener.work(Some(Duration::from_millis(500))).await.unwrap();

    barker
        .put(Message::new(
            Address::parse("//relay/outbox/ark3").unwrap(),
            "ark3",
            "woof woof",
            "msg0000000001",
        ))
        .unwrap();
    assert_eq!(barker.send().await.unwrap(), 1);

    pump_until_pending(&mut listener).await;
    let delivery = listener.get().unwrap();
    assert_eq!(delivery.message.text().content, "woof woof");
    listener.accept(delivery.token).await.unwrap();

    barker.stop().await.unwrap();
    listener.stop().await.unwrap();

    for _ in 0..50 {
        if super::engine::lock(&relay).client_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let relay = super::engine::lock(&relay);
    assert_eq!(relay.client_count(), 0);
    assert_eq!(relay.pending_count(), 0);
}

#[tokio::test]
async fn test_end_to_end_over_tcp() {
    let port = portpicker::pick_unused_port().expect("No free ports");
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let relay = Arc::new(Mutex::new(Relay::new(&settings(5000, 5), None)));
    tokio::spawn(server::run_tcp(listener, relay, 64 * 1024));

    let endpoint = format!("amqp://127.0.0.1:{port}");
    let mut listen = Messenger::new(NetConnector::new(64 * 1024));
    listen.start(&endpoint).await.unwrap();
    listen.subscribe("inbox/rex").await.unwrap();
    listen.work(Some(Duration::from_millis(500))).await.unwrap();

    let mut bark_client = Messenger::new(NetConnector::new(64 * 1024));
    bark_client.start(&endpoint).await.unwrap();
    bark_client.put(bark("inbox/rex", "arf")).unwrap();
    bark_client.send().await.unwrap();

    pump_until_pending(&mut listen).await;
    let delivery = listen.get().unwrap();
    assert_eq!(delivery.message.text().content, "arf");
    assert_eq!(delivery.message.text().sender, "rex");
    listen.accept(delivery.token).await.unwrap();

    bark_client.stop().await.unwrap();
    listen.stop().await.unwrap();
}

#[test]
fn test_overlapping_attach_replays_history_once() {
    let history = History::temporary(None, None).unwrap();
    let mut relay = Relay::new(&settings(5000, 5), Some(history));
    relay.publish(bark("inbox/a", "stored"));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = "c".to_string();
    relay.register_client(id.clone(), tx);

    relay.attach(&id, 0, "inbox".to_string());
    assert_eq!(rx.try_recv().unwrap(), Frame::Attached { handle: 0 });
    assert_eq!(transfer(&mut rx).1.text().content, "stored");

    relay.attach(&id, 1, "inbox/a".to_string());
    assert_eq!(rx.try_recv().unwrap(), Frame::Attached { handle: 1 });
    assert!(rx.try_recv().is_err());
    assert_eq!(relay.pending_count(), 1);

    // live traffic still reaches the client once
    assert_eq!(relay.publish(bark("inbox/a", "live")), 1);
    assert_eq!(transfer(&mut rx).1.text().content, "live");
    assert!(rx.try_recv().is_err());
}
