//! The `transport` module moves whole frames between a messenger and a broker.
//!
//! A [`Transport`] is one connection. It knows nothing about frame contents:
//! `send` writes one encoded frame, `recv` yields the next one. Three
//! implementations exist:
//!
//! - [`tcp::TcpTransport`]: `u32` big-endian length prefix on a TCP stream
//!   (`amqp://` and `tcp://` endpoints)
//! - [`websocket::WsTransport`]: one binary WebSocket message per frame
//!   (`ws://` endpoints)
//! - [`memory::MemoryTransport`]: an in-process channel pair, used by tests
//!   and to run a relay inside the same process
//!
//! A [`Connector`] turns an endpoint address into a connected transport.

pub mod memory;
pub mod tcp;
pub mod websocket;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::Address;
use crate::utils::error::{Error, Result};

/// Port used when an endpoint does not name one.
pub const DEFAULT_PORT: u16 = 5672;

/// One broker connection carrying whole frames.
#[async_trait]
pub trait Transport: Send {
    /// Write one frame.
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Wait for the next frame. `Ok(None)` means the peer closed the
    /// connection in an orderly way.
    ///
    /// Must be cancellation safe: dropping the future loses no data.
    async fn recv(&mut self) -> Result<Option<Bytes>>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Human readable peer description for logs.
    fn peer(&self) -> &str;
}

pub type TransportPtr = Box<dyn Transport>;

/// Opens transports to endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint`, failing with [`Error::Connect`].
    async fn connect(&self, endpoint: &Address) -> Result<TransportPtr>;
}

/// Connector for real network endpoints, choosing the transport by scheme.
#[derive(Debug, Clone)]
pub struct NetConnector {
    max_frame_bytes: usize,
}

impl NetConnector {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

#[async_trait]
impl Connector for NetConnector {
    async fn connect(&self, endpoint: &Address) -> Result<TransportPtr> {
        let refused = |reason: String| Error::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let target = endpoint
            .socket_addr(DEFAULT_PORT)
            .ok_or_else(|| refused("address has no host".to_string()))?;

        match endpoint.scheme().unwrap_or("amqp") {
            "amqp" | "tcp" => {
                let transport = tcp::TcpTransport::connect(&target, self.max_frame_bytes)
                    .await
                    .map_err(|e| refused(e.to_string()))?;
                Ok(Box::new(transport))
            }
            "ws" => {
                let url = format!("ws://{target}/{}", endpoint.path());
                let transport = websocket::connect(&url)
                    .await
                    .map_err(|e| refused(e.to_string()))?;
                Ok(Box::new(transport))
            }
            other => Err(refused(format!("unsupported scheme '{other}'"))),
        }
    }
}

pub(crate) fn not_connected(peer: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        format!("transport to {peer} is closed"),
    ))
}
