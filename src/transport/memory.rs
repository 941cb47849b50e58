//! In-process transport.
//!
//! A [`MemoryTransport`] is one end of a pair of unbounded channels. The
//! [`MemoryConnector`] creates a fresh pair per `connect` and hands the far
//! end to whoever holds the matching [`MemoryAcceptor`] (a test, or a relay
//! running in the same process). Dropping the acceptor makes every later
//! connect fail as if the endpoint were unreachable.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::codec::Address;
use crate::transport::{Connector, Transport, TransportPtr, not_connected};
use crate::utils::error::{Error, Result};

pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    peer: String,
}

impl MemoryTransport {
    /// Two connected ends.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport {
                tx: Some(a_tx),
                rx: b_rx,
                peer: "memory:server".to_string(),
            },
            MemoryTransport {
                tx: Some(b_tx),
                rx: a_rx,
                peer: "memory:client".to_string(),
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(not_connected(&self.peer));
        };
        tx.send(frame).map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("{} hung up", self.peer),
            ))
        })
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.tx.is_none() {
            return Err(not_connected(&self.peer));
        }
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        if self.tx.take().is_some() {
            self.rx.close();
        }
        Ok(())
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

/// Receives the server ends of connections made through a [`MemoryConnector`].
pub type MemoryAcceptor = mpsc::UnboundedReceiver<MemoryTransport>;

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemoryTransport>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryAcceptor) {
        let (incoming, acceptor) = mpsc::unbounded_channel();
        (Self { incoming }, acceptor)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Address) -> Result<TransportPtr> {
        let (client, server) = MemoryTransport::pair();
        self.incoming.send(server).map_err(|_| Error::Connect {
            endpoint: endpoint.to_string(),
            reason: "connection refused".to_string(),
        })?;
        Ok(Box::new(client))
    }
}
