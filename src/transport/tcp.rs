//! Length-prefixed frames over TCP.
//!
//! Each frame is a `u32` big-endian payload length followed by the payload.
//! Incoming bytes accumulate in a buffer and frames are cut from it, so a
//! `recv` cancelled mid-read keeps whatever was already read.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::transport::{Transport, not_connected};
use crate::utils::error::{Error, Result};

const HEADER_LEN: usize = 4;
/// The length prefix cannot describe anything larger.
const MAX_FRAME_BYTES: usize = u32::MAX as usize;

pub struct TcpTransport {
    stream: Option<TcpStream>,
    read_buf: BytesMut,
    max_frame_bytes: usize,
    peer: String,
}

impl TcpTransport {
    pub async fn connect(addr: &str, max_frame_bytes: usize) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, max_frame_bytes))
    }

    pub fn from_stream(stream: TcpStream, max_frame_bytes: usize) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let _ = stream.set_nodelay(true);
        Self {
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(8 * 1024),
            max_frame_bytes: max_frame_bytes.min(MAX_FRAME_BYTES),
            peer,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn oversized(&self, len: usize) -> Error {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "frame of {len} bytes exceeds limit of {} bytes",
                self.max_frame_bytes
            ),
        ))
    }

    /// Cut one complete frame off the read buffer, if there is one.
    fn next_buffered(&mut self) -> Result<Option<Bytes>> {
        if self.read_buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;
        if len > self.max_frame_bytes {
            return Err(self.oversized(len));
        }
        if self.read_buf.len() < HEADER_LEN + len {
            self.read_buf.reserve(HEADER_LEN + len - self.read_buf.len());
            return Ok(None);
        }
        self.read_buf.advance(HEADER_LEN);
        Ok(Some(self.read_buf.split_to(len).freeze()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        if frame.len() > self.max_frame_bytes {
            return Err(self.oversized(frame.len()));
        }
        let len = u32::try_from(frame.len()).map_err(|_| self.oversized(frame.len()))?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(not_connected(&self.peer));
        };

        let mut out = BytesMut::with_capacity(HEADER_LEN + frame.len());
        out.put_u32(len);
        out.put_slice(&frame);
        stream.write_all(&out).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.next_buffered()? {
                return Ok(Some(frame));
            }
            let Some(stream) = self.stream.as_mut() else {
                return Err(not_connected(&self.peer));
            };
            if stream.read_buf(&mut self.read_buf).await? == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed in the middle of a frame",
                )));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("closing tcp transport to {}", self.peer);
            if let Err(e) = stream.shutdown().await {
                debug!("shutdown of {} failed: {e}", self.peer);
            }
        }
        Ok(())
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
