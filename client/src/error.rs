//! Error types of the session client

use shared::{DecodeError, EncodeError, PeerId, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A message referenced a peer this client has not seen join. Expected
    /// now and then, since positions can overtake or outlive a `Join`.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("not joined to a session yet")]
    NotJoined,

    #[error("server sent unexpected {0}")]
    Unexpected(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server address {0:?}")]
    InvalidServerAddr(String),

    #[error("failed to resolve {addr:?}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },
}
