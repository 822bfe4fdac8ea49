//! Error types for the wire protocol and the transports

use crate::transport::ConnectionId;
use std::io;
use thiserror::Error;

/// A message that could not be decoded.
///
/// Receivers drop the offending message and keep reading; one bad message
/// never ends a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message truncated")]
    Truncated,

    #[error("unknown message type tag {0}")]
    UnknownTag(u32),

    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for DecodeError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                DecodeError::Truncated
            }
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(pub String);

/// Failures of the packet transport.
///
/// `Bind` and `Connect` are fatal at startup. Everything else concerns a
/// single send or datagram and is reported without retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("not connected yet")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("bad frame: {0}")]
    Frame(String),
}
