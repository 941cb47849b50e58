//! The chat message carried by transfers.
//!
//! A `Message` is an immutable value: a destination [`Address`] plus an ordered
//! body of three opaque byte strings `(sender, content, id)`. Bodies are binary
//! safe; [`Message::text`] offers a lossy UTF-8 view for display.
//!
//! Wire layout:
//! - address: flags `u8` (bit 0 scheme, bit 1 host, bit 2 port), then the
//!   present parts in order (scheme and host as strings, port as `u16`), then
//!   the path string
//! - sender, content, id: each `u32` length + bytes

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::codec::address::Address;
use crate::codec::wire::{Reader, put_bytes, put_str};
use crate::utils::error::DecodeError;

const HAS_SCHEME: u8 = 0b001;
const HAS_HOST: u8 = 0b010;
const HAS_PORT: u8 = 0b100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    address: Address,
    sender: Bytes,
    content: Bytes,
    id: Bytes,
}

/// Body fields decoded as text, replacing invalid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextBody {
    pub sender: String,
    pub content: String,
    pub id: String,
}

impl Message {
    pub fn new(
        address: Address,
        sender: impl Into<Bytes>,
        content: impl Into<Bytes>,
        id: impl Into<Bytes>,
    ) -> Self {
        Self {
            address,
            sender: sender.into(),
            content: content.into(),
            id: id.into(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn sender(&self) -> &Bytes {
        &self.sender
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn id(&self) -> &Bytes {
        &self.id
    }

    pub fn text(&self) -> TextBody {
        TextBody {
            sender: String::from_utf8_lossy(&self.sender).into_owned(),
            content: String::from_utf8_lossy(&self.content).into_owned(),
            id: String::from_utf8_lossy(&self.id).into_owned(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(buf);
        let message = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        let address = &self.address;
        let mut flags = 0u8;
        if address.scheme().is_some() {
            flags |= HAS_SCHEME;
        }
        if address.host().is_some() {
            flags |= HAS_HOST;
        }
        if address.port().is_some() {
            flags |= HAS_PORT;
        }
        buf.put_u8(flags);
        if let Some(scheme) = address.scheme() {
            put_str(buf, scheme);
        }
        if let Some(host) = address.host() {
            put_str(buf, host);
        }
        if let Some(port) = address.port() {
            buf.put_u16(port);
        }
        put_str(buf, address.path());

        put_bytes(buf, &self.sender);
        put_bytes(buf, &self.content);
        put_bytes(buf, &self.id);
    }

    pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let flags = reader.u8()?;
        let scheme = if flags & HAS_SCHEME != 0 {
            Some(reader.string()?)
        } else {
            None
        };
        let host = if flags & HAS_HOST != 0 {
            Some(reader.string()?)
        } else {
            None
        };
        let port = if flags & HAS_PORT != 0 {
            Some(reader.u16()?)
        } else {
            None
        };
        let path = reader.string()?;

        Ok(Self {
            address: Address::from_parts(scheme, host, port, path),
            sender: reader.bytes()?,
            content: reader.bytes()?,
            id: reader.bytes()?,
        })
    }

    fn encoded_len(&self) -> usize {
        let address = &self.address;
        1 + address.scheme().map_or(0, |s| 4 + s.len())
            + address.host().map_or(0, |h| 4 + h.len())
            + address.port().map_or(0, |_| 2)
            + 4
            + address.path().len()
            + 12
            + self.sender.len()
            + self.content.len()
            + self.id.len()
    }
}
