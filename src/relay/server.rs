//! Connection handling for the relay.
//!
//! Every accepted connection becomes a [`Transport`] served by its own task:
//! inbound frames are applied to the shared [`Relay`], and frames the relay
//! queued for this client are written out. The client is cleaned up exactly
//! once, when that task ends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};

use crate::codec::Frame;
use crate::config::Settings;
use crate::persistence::History;
use crate::relay::engine::{ClientId, Relay, lock};
use crate::transport::memory::MemoryAcceptor;
use crate::transport::tcp::TcpTransport;
use crate::transport::websocket::WsTransport;
use crate::transport::{Transport, TransportPtr};
use crate::utils::error::Result;

const RETRY_PERIOD: Duration = Duration::from_millis(1000);

/// Serve one client until it closes the session or the connection drops.
pub async fn serve_connection(mut transport: TransportPtr, relay: Arc<Mutex<Relay>>) {
    let client_id: ClientId = format!("client-{}", uuid::Uuid::new_v4());
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    lock(&relay).register_client(client_id.clone(), tx);
    info!("{client_id} connected from {}", transport.peer());

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(frame) = outbound else { break };
                if let Err(e) = transport.send(frame.encode()).await {
                    warn!("failed to send {} frame to {client_id}: {e}", frame.name());
                    break;
                }
            }
            inbound = transport.recv() => match inbound {
                Ok(Some(bytes)) => match Frame::decode(&bytes) {
                    Ok(frame) => {
                        if !apply(&relay, &client_id, frame) {
                            break;
                        }
                    }
                    Err(e) => warn!("invalid frame from {client_id}: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("connection to {client_id} failed: {e}");
                    break;
                }
            }
        }
    }

    info!("{client_id} disconnected");
    lock(&relay).cleanup_client(&client_id);
    if let Err(e) = transport.close().await {
        debug!("closing {client_id} failed: {e}");
    }
}

/// Apply one inbound frame. False once the client ended the session.
fn apply(relay: &Mutex<Relay>, client_id: &ClientId, frame: Frame) -> bool {
    let mut relay = lock(relay);
    match frame {
        Frame::Attach { handle, pattern } => relay.attach(client_id, handle, pattern),
        Frame::Detach { handle } => relay.detach(client_id, handle),
        Frame::Transfer { message, .. } => {
            let recipients = relay.publish(message);
            debug!("{client_id} published to {recipients} subscribers");
        }
        Frame::Disposition { delivery, outcome } => relay.settle(client_id, delivery, outcome),
        Frame::Close => return false,
        Frame::Attached { .. } => warn!("ignoring attached frame from {client_id}"),
    }
    true
}

/// Accept length-prefixed TCP connections forever.
pub async fn run_tcp(
    listener: TcpListener,
    relay: Arc<Mutex<Relay>>,
    max_frame_bytes: usize,
) -> Result<()> {
    info!("relay listening on tcp://{}", listener.local_addr()?);
    loop {
        let (stream, _) = listener.accept().await?;
        let transport = TcpTransport::from_stream(stream, max_frame_bytes);
        tokio::spawn(serve_connection(Box::new(transport), relay.clone()));
    }
}

/// Accept WebSocket connections forever.
pub async fn run_websocket(listener: TcpListener, relay: Arc<Mutex<Relay>>) -> Result<()> {
    info!("relay listening on ws://{}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        let relay = relay.clone();
        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => {
                    let transport = WsTransport::new(ws, peer.to_string());
                    serve_connection(Box::new(transport), relay).await;
                }
                Err(e) => warn!("WebSocket handshake with {peer} failed: {e}"),
            }
        });
    }
}

/// Serve in-process connections until every connector is gone.
pub async fn run_memory(mut acceptor: MemoryAcceptor, relay: Arc<Mutex<Relay>>) {
    while let Some(transport) = acceptor.recv().await {
        tokio::spawn(serve_connection(Box::new(transport), relay.clone()));
    }
}

/// Open the history, start the retry loop and serve on the configured port.
pub async fn start(settings: &Settings, websocket: bool) -> Result<()> {
    let relay_settings = &settings.relay;
    let history = History::open(
        &relay_settings.history_path,
        Some(relay_settings.history_ttl_secs),
        Some(relay_settings.history_max_per_address),
    )?;
    let relay = Arc::new(Mutex::new(Relay::new(relay_settings, Some(history))));
    tokio::spawn(Relay::start_retry_loop(relay.clone(), RETRY_PERIOD));

    let listener =
        TcpListener::bind((relay_settings.host.as_str(), relay_settings.port)).await?;
    if websocket {
        run_websocket(listener, relay).await
    } else {
        run_tcp(listener, relay, settings.client.max_frame_bytes).await
    }
}
