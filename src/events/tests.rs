use std::sync::{Arc, Mutex};

use super::{Dispatcher, Event, EventKind};
use crate::session::SubscriptionHandle;
use crate::utils::error::{DecodeError, Error};

fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    (log.clone(), log)
}

#[test]
fn test_event_kind_names() {
    assert_eq!("work".parse::<EventKind>().unwrap(), EventKind::Work);
    assert_eq!("error".parse::<EventKind>().unwrap(), EventKind::Error);
    assert_eq!(
        "subscription".parse::<EventKind>().unwrap(),
        EventKind::Subscription
    );
    assert!(matches!(
        "bogus".parse::<EventKind>(),
        Err(Error::UnknownEvent(name)) if name == "bogus"
    ));
    assert_eq!(EventKind::Subscription.to_string(), "subscription");
}

#[test]
fn test_handlers_run_in_registration_order() {
    let (log, seen) = recorder();
    let mut dispatcher = Dispatcher::new();
    for name in ["first", "second", "third"] {
        let log = log.clone();
        dispatcher.on(EventKind::Work, move |_| {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        });
    }

    dispatcher.dispatch(&Event::Work { pending: 1 });
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_only_matching_kind_is_invoked() {
    let (log, seen) = recorder();
    let mut dispatcher = Dispatcher::new();
    dispatcher.on(EventKind::Subscription, move |event| {
        if let Event::Subscription(handle) = event {
            log.lock().unwrap().push(handle.to_string());
        }
        Ok(())
    });

    dispatcher.dispatch(&Event::Work { pending: 2 });
    dispatcher.dispatch(&Event::Subscription(SubscriptionHandle(4)));
    assert_eq!(*seen.lock().unwrap(), vec!["#4"]);
}

#[test]
fn test_failing_handler_is_reported_as_error_event() {
    let (log, seen) = recorder();
    let mut dispatcher = Dispatcher::new();
    dispatcher.on(EventKind::Work, |_| Err("renderer unavailable".into()));
    let after = log.clone();
    dispatcher.on(EventKind::Work, move |_| {
        after.lock().unwrap().push("second work handler".to_string());
        Ok(())
    });
    dispatcher.on(EventKind::Error, move |event| {
        if let Event::Error(err) = event {
            log.lock().unwrap().push(err.to_string());
        }
        Ok(())
    });

    dispatcher.dispatch(&Event::Work { pending: 1 });

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], "second work handler");
    assert_eq!(
        seen[1],
        "event handler failed: work handler: renderer unavailable"
    );
}

#[test]
fn test_panicking_handler_is_caught() {
    let (log, seen) = recorder();
    let mut dispatcher = Dispatcher::new();
    dispatcher.on(EventKind::Subscription, |_| panic!("boom"));
    dispatcher.on(EventKind::Error, move |event| {
        if let Event::Error(Error::Handler(text)) = event {
            log.lock().unwrap().push(text.clone());
        }
        Ok(())
    });

    dispatcher.dispatch(&Event::Subscription(SubscriptionHandle(0)));
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["subscription handler panicked: boom"]
    );
}

#[test]
fn test_failing_error_handler_does_not_recurse() {
    let (log, seen) = recorder();
    let mut dispatcher = Dispatcher::new();
    dispatcher.on(EventKind::Error, move |_| {
        log.lock().unwrap().push("called".to_string());
        Err("still broken".into())
    });

    dispatcher.dispatch(&Event::Error(Error::Decode(DecodeError::EmptyFrame)));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_dispatch_without_handlers_is_silent() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.dispatch(&Event::Error(Error::Empty));
    dispatcher.dispatch(&Event::Work { pending: 0 });
    assert_eq!(dispatcher.handler_count(EventKind::Error), 0);
}
