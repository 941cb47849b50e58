//! Named lifecycle events and the handlers registered for them.
//!
//! Handlers run synchronously, in registration order, on the task that drives
//! the messenger. They must not block. A handler that returns an error or
//! panics is reported through the `error` event; a failing `error` handler is
//! only logged. With no `error` handler registered, failures are dropped after
//! a debug log line.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;

use tracing::{debug, warn};

use crate::session::SubscriptionHandle;
use crate::utils::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Deliveries are waiting to be drained with `get`.
    Work,
    /// A recoverable failure happened.
    Error,
    /// The broker acknowledged a subscription.
    Subscription,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Work => "work",
            EventKind::Error => "error",
            EventKind::Subscription => "subscription",
        })
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "work" => Ok(EventKind::Work),
            "error" => Ok(EventKind::Error),
            "subscription" => Ok(EventKind::Subscription),
            other => Err(Error::UnknownEvent(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum Event {
    Work { pending: usize },
    Error(Error),
    Subscription(SubscriptionHandle),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Work { .. } => EventKind::Work,
            Event::Error(_) => EventKind::Error,
            Event::Subscription(_) => EventKind::Subscription,
        }
    }
}

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Box<dyn FnMut(&Event) -> HandlerResult + Send>;

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn dispatch(&mut self, event: &Event) {
        let kind = event.kind();
        for failure in self.invoke(kind, event) {
            if kind == EventKind::Error {
                warn!("error handler failed: {failure}");
                continue;
            }
            let report = Event::Error(Error::Handler(failure));
            for nested in self.invoke(EventKind::Error, &report) {
                warn!("error handler failed: {nested}");
            }
        }
    }

    fn invoke(&mut self, kind: EventKind, event: &Event) -> Vec<String> {
        let Some(handlers) = self.handlers.get_mut(&kind).filter(|h| !h.is_empty()) else {
            if let Event::Error(err) = event {
                debug!("no error handler registered, dropping: {err}");
            }
            return Vec::new();
        };

        let mut failures = Vec::new();
        for handler in handlers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failures.push(format!("{kind} handler: {err}")),
                Err(panic) => {
                    failures.push(format!("{kind} handler panicked: {}", panic_text(&*panic)))
                }
            }
        }
        failures
    }
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("work", &self.handler_count(EventKind::Work))
            .field("error", &self.handler_count(EventKind::Error))
            .field("subscription", &self.handler_count(EventKind::Subscription))
            .finish()
    }
}
