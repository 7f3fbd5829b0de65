//! Fixed layout binary protocol, version 2.
//!
//! Every record is a little endian, fixed size struct. The request type word of a
//! [`Request`] carries the protocol version in its upper 16 bits and the
//! [`RequestKind`] in the lower 16 bits.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::error::{Error, Result};

pub mod codec;
pub mod messages;

pub use messages::{Request, Response, ThresholdChangeRequest, ThresholdChangeResponse};

pub const PROTOCOL_VERSION: u16 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestKind {
    DeviceCheck = 1,
    ChangeThreshold = 2,
    RestoreAppThresholds = 3,
    GetThreshold = 4,
}

impl RequestKind {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::DeviceCheck),
            2 => Some(Self::ChangeThreshold),
            3 => Some(Self::RestoreAppThresholds),
            4 => Some(Self::GetThreshold),
            _ => None,
        }
    }

    /// Reader requests may run alongside each other, writers run alone.
    pub fn is_writer(&self) -> bool {
        matches!(self, RequestKind::ChangeThreshold)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ResponseStatus {
    Ok = 0,
    BadRequest = 1,
    BadDevice = 2,
    RestoreFail = 3,
    RestoreInvalidApp = 4,
    RestoreInvalidDevice = 5,
}

impl ResponseStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::BadRequest),
            2 => Some(Self::BadDevice),
            3 => Some(Self::RestoreFail),
            4 => Some(Self::RestoreInvalidApp),
            5 => Some(Self::RestoreInvalidDevice),
            _ => None,
        }
    }
}

pub trait WireMessage: Sized {
    const SIZE: usize;

    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// Reads exactly one record. A peer closing before the first byte yields
/// `ConnectionClosed`, closing mid record yields `MalformedMessage`.
pub async fn read_message<M, S>(stream: &mut S) -> Result<M>
where
    M: WireMessage,
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; M::SIZE];
    let mut filled = 0;

    while filled < M::SIZE {
        let read = stream.read(&mut buf[filled..]).await?;

        if read == 0 {
            if filled == 0 {
                return Err(Error::ConnectionClosed);
            }
            return Err(Error::MalformedMessage(format!(
                "connection closed after {} of {} bytes",
                filled,
                M::SIZE
            )));
        }

        filled += read;
    }

    M::decode(&buf)
}

pub async fn write_message<M, S>(stream: &mut S, message: &M) -> Result<()>
where
    M: WireMessage,
    S: AsyncWrite + Unpin,
{
    let bytes = message.encode()?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}
