//! The messenger: a caller-owned client for one broker connection.
//!
//! Lifecycle is `Created → Connecting → Active → Stopping → Stopped`.
//! Sending and receiving need `Active`. Everything runs on the caller's task:
//! [`Messenger::work`] is one turn of the event loop, reading whatever frames
//! are available, updating the session and firing events. Every failure found
//! by the loop goes through the `error` event. Per-message problems
//! (undecodable frames, unexpected frames, handler failures) leave the
//! messenger running; losing the broker stops it and `work` returns an error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::{Address, Frame, Message, Outcome};
use crate::config::ClientSettings;
use crate::events::{Dispatcher, Event, EventKind, HandlerResult};
use crate::session::{Delivery, DeliveryState, DeliveryToken, Session, SubscriptionHandle};
use crate::transport::{Connector, NetConnector, TransportPtr, not_connected};
use crate::utils::error::{AckError, Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const BROKER: &str = "broker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Created,
    Connecting,
    Active,
    Stopping,
    Stopped,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClientState::Created => "created",
            ClientState::Connecting => "connecting",
            ClientState::Active => "active",
            ClientState::Stopping => "stopping",
            ClientState::Stopped => "stopped",
        })
    }
}

pub struct Messenger {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    send_timeout: Duration,
    state: ClientState,
    endpoint: Option<Address>,
    transport: Option<TransportPtr>,
    session: Session,
    dispatcher: Dispatcher,
    next_delivery: u64,
}

impl Messenger {
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
            connect_timeout: DEFAULT_TIMEOUT,
            send_timeout: DEFAULT_TIMEOUT,
            state: ClientState::Created,
            endpoint: None,
            transport: None,
            session: Session::new(),
            dispatcher: Dispatcher::new(),
            next_delivery: 0,
        }
    }

    /// A network messenger configured from the `client` settings section.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(NetConnector::new(settings.max_frame_bytes)).with_timeouts(
            Duration::from_millis(settings.connect_timeout_ms),
            Duration::from_millis(settings.send_timeout_ms),
        )
    }

    pub fn with_timeouts(mut self, connect: Duration, send: Duration) -> Self {
        self.connect_timeout = connect;
        self.send_timeout = send;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ClientState::Stopped
    }

    pub fn endpoint(&self) -> Option<&Address> {
        self.endpoint.as_ref()
    }

    /// Register an event handler.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        self.dispatcher.on(kind, handler);
    }

    /// Register an event handler by event name (`work`, `error`, `subscription`).
    pub fn on_named<F>(&mut self, name: &str, handler: F) -> Result<()>
    where
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        let kind = name.parse::<EventKind>()?;
        self.dispatcher.on(kind, handler);
        Ok(())
    }

    /// Connect to `endpoint`. There is no internal retry: on failure the
    /// messenger is back in `Created` and the caller decides what to do.
    pub async fn start(&mut self, endpoint: &str) -> Result<()> {
        if self.state != ClientState::Created {
            return Err(Error::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        let endpoint = Address::parse(endpoint)?;

        self.state = ClientState::Connecting;
        let connected = match timeout(self.connect_timeout, self.connector.connect(&endpoint)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };

        match connected {
            Ok(transport) => {
                info!("connected to {endpoint} via {}", transport.peer());
                self.transport = Some(transport);
                self.endpoint = Some(endpoint);
                self.state = ClientState::Active;
                Ok(())
            }
            Err(e) => {
                self.state = ClientState::Created;
                Err(e)
            }
        }
    }

    /// Subscribe to the routing path of `address`. Subscribing to the same
    /// path twice returns the existing handle. Deliveries start flowing once
    /// the broker acknowledges, which fires the `subscription` event.
    pub async fn subscribe(&mut self, address: &str) -> Result<SubscriptionHandle> {
        self.ensure_active("subscribe")?;
        let pattern = Address::parse(address)?.path().to_string();
        if let Some(handle) = self.session.handle_for(&pattern) {
            return Ok(handle);
        }

        let handle = self.session.subscribe(&pattern);
        self.write(Frame::Attach {
            handle: handle.0,
            pattern,
        })
        .await?;
        Ok(handle)
    }

    /// Drop a subscription. Messages still queued on it are rejected back to
    /// the broker.
    pub async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()> {
        self.ensure_active("unsubscribe")?;
        let Some(queued) = self.session.unsubscribe(handle) else {
            return Ok(());
        };
        self.write(Frame::Detach { handle: handle.0 }).await?;
        for delivery in queued {
            self.write(Frame::Disposition {
                delivery,
                outcome: Outcome::Rejected,
            })
            .await?;
        }
        Ok(())
    }

    /// Stage a message for the next [`send`](Self::send). Never blocks.
    pub fn put(&mut self, message: Message) -> Result<()> {
        if matches!(self.state, ClientState::Stopping | ClientState::Stopped) {
            return Err(Error::InvalidState {
                operation: "put",
                state: self.state,
            });
        }
        self.session.stage(message);
        Ok(())
    }

    /// Write every staged message. Returns how many were sent.
    pub async fn send(&mut self) -> Result<usize> {
        if self.state != ClientState::Active {
            return Err(not_connected(BROKER));
        }
        let staged = self.session.drain_outgoing();
        let count = staged.len();
        for (sent, message) in staged.into_iter().enumerate() {
            let delivery = self.next_delivery;
            self.next_delivery += 1;
            if let Err(e) = self.write(Frame::Transfer { delivery, message }).await {
                warn!("dropping {} unsent messages: {e}", count - sent);
                return Err(e);
            }
        }
        Ok(count)
    }

    /// Messages put but not yet sent.
    pub fn staged(&self) -> usize {
        self.session.staged()
    }

    /// Whether `get` would return a delivery right now.
    pub fn incoming(&self) -> bool {
        self.session.incoming()
    }

    pub fn pending(&self) -> usize {
        self.session.pending_count()
    }

    /// The oldest delivery across all subscriptions.
    pub fn get(&mut self) -> Result<Delivery> {
        self.ensure_active("get")?;
        self.session.get()
    }

    /// Acknowledge a delivery to the broker. A delivery released by a lost
    /// connection reports `AckError::Redelivered` even once stopped.
    pub async fn accept(&mut self, token: DeliveryToken) -> Result<()> {
        if self.session.delivery_state(token) == Some(DeliveryState::Redelivered) {
            return Err(AckError::Redelivered(token).into());
        }
        self.ensure_active("accept")?;
        let delivery = self.session.accept(token)?;
        self.write(Frame::Disposition {
            delivery,
            outcome: Outcome::Accepted,
        })
        .await
    }

    pub fn delivery_state(&self, token: DeliveryToken) -> Option<DeliveryState> {
        self.session.delivery_state(token)
    }

    /// One turn of the event loop.
    ///
    /// Waits up to `wait` (forever with `None`) for a frame, then processes it
    /// and everything else already available without waiting again. Fires
    /// `work` if deliveries are pending afterwards and returns the same.
    pub async fn work(&mut self, wait: Option<Duration>) -> Result<bool> {
        self.ensure_active("work")?;

        let first = {
            let transport = self.transport_mut()?;
            match wait {
                Some(limit) => timeout(limit, transport.recv()).await.ok(),
                None => Some(transport.recv().await),
            }
        };

        if let Some(received) = first {
            self.handle_received(received).await?;
            while self.state == ClientState::Active {
                let ready = self.transport_mut()?.recv().now_or_never();
                match ready {
                    Some(received) => self.handle_received(received).await?,
                    None => break,
                }
            }
        }

        let pending = self.session.pending_count();
        if pending > 0 {
            self.dispatcher.dispatch(&Event::Work { pending });
        }
        Ok(pending > 0)
    }

    /// Shut down. Staged messages get one best-effort flush and are dropped
    /// with a warning if that fails; unaccepted deliveries are left to the
    /// broker's redelivery. Calling `stop` again does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            ClientState::Stopped => return Ok(()),
            ClientState::Created | ClientState::Connecting => {
                self.state = ClientState::Stopped;
                return Ok(());
            }
            ClientState::Active | ClientState::Stopping => {}
        }

        self.state = ClientState::Stopping;

        let staged = self.session.drain_outgoing();
        let total = staged.len();
        for (sent, message) in staged.into_iter().enumerate() {
            let delivery = self.next_delivery;
            self.next_delivery += 1;
            if let Err(e) = self.write(Frame::Transfer { delivery, message }).await {
                warn!("dropping {} unsent messages on stop: {e}", total - sent);
                break;
            }
        }
        if self.transport.is_some() {
            if let Err(e) = self.write(Frame::Close).await {
                debug!("close frame not delivered: {e}");
            }
        }

        self.release().await;
        info!("messenger stopped");
        Ok(())
    }

    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if self.state != ClientState::Active {
            return Err(Error::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut TransportPtr> {
        self.transport.as_mut().ok_or_else(|| not_connected(BROKER))
    }

    async fn write(&mut self, frame: Frame) -> Result<()> {
        let name = frame.name();
        let limit = self.send_timeout;
        let transport = self.transport_mut()?;
        let result = match timeout(limit, transport.send(frame.encode())).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };
        if let Err(e) = result {
            warn!("failed to write {name} frame: {e}");
            self.release().await;
            return Err(e);
        }
        Ok(())
    }

    async fn handle_received(&mut self, received: Result<Option<Bytes>>) -> Result<()> {
        match received {
            Ok(Some(bytes)) => self.process(&bytes).await,
            Ok(None) => Err(self
                .connection_lost(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "broker closed the connection",
                )))
                .await),
            Err(e) => Err(self.connection_lost(e).await),
        }
    }

    /// Stop after losing the broker in the event loop. The cause goes to the
    /// `error` event; the returned error tells the caller the loop is over.
    async fn connection_lost(&mut self, cause: Error) -> Error {
        warn!("lost connection to broker: {cause}");
        self.release().await;
        self.dispatcher.dispatch(&Event::Error(cause));
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "messenger stopped after losing the broker",
        ))
    }

    async fn process(&mut self, bytes: &[u8]) -> Result<()> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                self.dispatcher.dispatch(&Event::Error(Error::Decode(e)));
                return Ok(());
            }
        };

        match frame {
            Frame::Attached { handle } => {
                let handle = SubscriptionHandle(handle);
                if self.session.confirm(handle) {
                    debug!("subscription {handle} acknowledged");
                    self.dispatcher.dispatch(&Event::Subscription(handle));
                } else {
                    debug!("ignoring acknowledgement for unknown subscription {handle}");
                }
                Ok(())
            }
            Frame::Transfer { delivery, message } => {
                if self.session.enqueue_incoming(delivery, message).is_none() {
                    let rejected = Frame::Disposition {
                        delivery,
                        outcome: Outcome::Rejected,
                    };
                    if let Err(e) = self.write(rejected).await {
                        return Err(self.connection_lost(e).await);
                    }
                }
                Ok(())
            }
            Frame::Close => Err(self
                .connection_lost(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "broker ended the session",
                )))
                .await),
            other @ (Frame::Attach { .. } | Frame::Detach { .. } | Frame::Disposition { .. }) => {
                self.dispatcher
                    .dispatch(&Event::Error(Error::UnexpectedFrame(other.name())));
                Ok(())
            }
        }
    }

    /// Release the transport and session state. Runs its effects once.
    async fn release(&mut self) {
        let released = self.session.release();
        if released > 0 {
            info!("{released} unaccepted deliveries left for redelivery");
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("closing transport failed: {e}");
            }
        }
        self.state = ClientState::Stopped;
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .field("session", &self.session)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
