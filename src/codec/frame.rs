//! Protocol frames exchanged between a messenger and a broker.
//!
//! Each frame is one tag byte followed by its fields. Transports carry
//! frames whole; framing on a byte stream is the transport's job.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::message::Message;
use crate::codec::wire::{Reader, put_str};
use crate::utils::error::DecodeError;

const TAG_ATTACH: u8 = 1;
const TAG_ATTACHED: u8 = 2;
const TAG_TRANSFER: u8 = 3;
const TAG_DISPOSITION: u8 = 4;
const TAG_DETACH: u8 = 5;
const TAG_CLOSE: u8 = 6;

/// Settlement reported by a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    /// The receiver had no subscription for the message; do not redeliver.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Open a subscription link on `pattern`.
    Attach { handle: u32, pattern: String },
    /// Broker acknowledgement of an `Attach`.
    Attached { handle: u32 },
    /// A message. `delivery` is chosen by the sending side.
    Transfer { delivery: u64, message: Message },
    /// Settle a delivery previously received.
    Disposition { delivery: u64, outcome: Outcome },
    Detach { handle: u32 },
    Close,
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Attach { .. } => "attach",
            Frame::Attached { .. } => "attached",
            Frame::Transfer { .. } => "transfer",
            Frame::Disposition { .. } => "disposition",
            Frame::Detach { .. } => "detach",
            Frame::Close => "close",
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Frame::Attach { handle, pattern } => {
                buf.put_u8(TAG_ATTACH);
                buf.put_u32(*handle);
                put_str(&mut buf, pattern);
            }
            Frame::Attached { handle } => {
                buf.put_u8(TAG_ATTACHED);
                buf.put_u32(*handle);
            }
            Frame::Transfer { delivery, message } => {
                buf.put_u8(TAG_TRANSFER);
                buf.put_u64(*delivery);
                message.encode_into(&mut buf);
            }
            Frame::Disposition { delivery, outcome } => {
                buf.put_u8(TAG_DISPOSITION);
                buf.put_u64(*delivery);
                buf.put_u8(match outcome {
                    Outcome::Accepted => 0,
                    Outcome::Rejected => 1,
                });
            }
            Frame::Detach { handle } => {
                buf.put_u8(TAG_DETACH);
                buf.put_u32(*handle);
            }
            Frame::Close => buf.put_u8(TAG_CLOSE),
        }
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::EmptyFrame);
        }
        let mut reader = Reader::new(buf);
        let frame = match reader.u8()? {
            TAG_ATTACH => Frame::Attach {
                handle: reader.u32()?,
                pattern: reader.string()?,
            },
            TAG_ATTACHED => Frame::Attached {
                handle: reader.u32()?,
            },
            TAG_TRANSFER => Frame::Transfer {
                delivery: reader.u64()?,
                message: Message::read(&mut reader)?,
            },
            TAG_DISPOSITION => Frame::Disposition {
                delivery: reader.u64()?,
                outcome: match reader.u8()? {
                    0 => Outcome::Accepted,
                    1 => Outcome::Rejected,
                    other => return Err(DecodeError::UnknownOutcome(other)),
                },
            },
            TAG_DETACH => Frame::Detach {
                handle: reader.u32()?,
            },
            TAG_CLOSE => Frame::Close,
            other => return Err(DecodeError::UnknownTag(other)),
        };
        reader.finish()?;
        Ok(frame)
    }
}
