//! Frames over WebSocket: one binary message per frame.
//!
//! This is how a browser client would reach the broker. Text messages are not
//! part of the protocol and are skipped; ping/pong is answered by tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use tungstenite::Error as WsError;
use tungstenite::protocol::Message as WsMessage;

use crate::transport::{Transport, not_connected};
use crate::utils::error::{Error, Result};

pub struct WsTransport<S> {
    ws: WebSocketStream<S>,
    closed: bool,
    peer: String,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already handshaken stream.
    pub fn new(ws: WebSocketStream<S>, peer: impl Into<String>) -> Self {
        Self {
            ws,
            closed: false,
            peer: peer.into(),
        }
    }
}

/// Open a client WebSocket to `url` (`ws://host:port/path`).
pub async fn connect(url: &str) -> Result<WsTransport<MaybeTlsStream<TcpStream>>> {
    let (ws, _response) = connect_async(url).await.map_err(ws_error)?;
    Ok(WsTransport::new(ws, url))
}

fn ws_error(err: WsError) -> Error {
    match err {
        WsError::Io(io) => Error::Io(io),
        other => Error::Io(std::io::Error::other(other)),
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        if self.closed {
            return Err(not_connected(&self.peer));
        }
        self.ws
            .send(WsMessage::binary(frame))
            .await
            .map_err(ws_error)
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.closed {
            return Err(not_connected(&self.peer));
        }
        loop {
            match self.ws.next().await {
                None => return Ok(None),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(ws_error(e)),
                Some(Ok(WsMessage::Binary(data))) => return Ok(Some(data)),
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                Some(Ok(WsMessage::Text(text))) => {
                    warn!("ignoring text message from {}: {}", self.peer, text.as_str());
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("closing websocket to {}", self.peer);
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => {
                debug!("websocket close to {} failed: {e}", self.peer);
                Ok(())
            }
        }
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
