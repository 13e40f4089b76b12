//! Transport layer: one outbound request socket, one inbound reply socket.
//!
//! Both sides speak the same carrier discipline: a connected byte stream
//! (`tcp://` or `ipc://`) delivering one message per receive via a 4-byte
//! length prefix. The prefix belongs to the carrier, not the protocol — the
//! 8-byte envelope of [`crate::protocol`] has no length field of its own.

use crate::error::{Result, SdkError};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

pub mod reply;
pub mod request;

pub use reply::ReplyServer;
pub use request::RequestTransport;

/// Hard cap on a single carried message
pub(crate) const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A parsed transport address.
///
/// Addresses follow the conventional scalable-messaging URL grammar.
/// `inproc://` is recognized but rejected: this SDK has no in-process
/// broker to resolve such names against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp(String),
    /// `ipc://path` (a Unix domain socket path)
    Ipc(PathBuf),
}

impl Endpoint {
    pub fn parse(address: &str) -> Result<Self> {
        if let Some(rest) = address.strip_prefix("tcp://") {
            if rest.is_empty() {
                return Err(SdkError::InvalidArgument(format!(
                    "tcp address {address:?} has no host:port"
                )));
            }
            return Ok(Endpoint::Tcp(rest.to_string()));
        }
        if let Some(rest) = address.strip_prefix("ipc://") {
            if rest.is_empty() {
                return Err(SdkError::InvalidArgument(format!(
                    "ipc address {address:?} has no path"
                )));
            }
            return Ok(Endpoint::Ipc(PathBuf::from(rest)));
        }
        if address.starts_with("inproc://") {
            return Err(SdkError::InvalidArgument(
                "inproc:// endpoints are not supported".to_string(),
            ));
        }
        Err(SdkError::InvalidArgument(format!(
            "unrecognized transport address {address:?} (expected tcp:// or ipc://)"
        )))
    }
}

/// A connected carrier stream of either flavor
pub(crate) enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    pub(crate) async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(stream) => write_frame(stream, frame).await,
            Stream::Unix(stream) => write_frame(stream, frame).await,
        }
    }

    pub(crate) async fn read_frame(&mut self) -> Result<Vec<u8>> {
        match self {
            Stream::Tcp(stream) => read_frame(stream).await,
            Stream::Unix(stream) => read_frame(stream).await,
        }
    }
}

/// Write one length-prefixed message to the stream
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> std::io::Result<()> {
    let len = frame.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Read one length-prefixed message from the stream
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(SdkError::Malformed(format!(
            "message of {len} bytes exceeds the {MAX_FRAME_SIZE}-byte cap"
        )));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(frame)
}
