//! # Session Server Library
//!
//! Authoritative side of a small multiplayer session. The server assigns
//! every connecting client a peer id and a color slot, keeps the roster of
//! joined players and relays chat, positions and presence between them. It
//! runs no simulation: positions are forwarded as received.
//!
//! ## Module Organization
//!
//! ### Registry (`registry`)
//! Owns player membership: identity assignment, color slot reservation,
//! the join handshake with its roster exchange, and removal on disconnect.
//!
//! ### Relay (`relay`)
//! The per-tick pump over a [`shared::transport::ServerTransport`]: accepts
//! connections, decodes and dispatches their messages, fans out broadcasts
//! and turns disconnects into `PlayerLeave` messages. A malformed message is
//! dropped without touching the connection, and one failed send never stops
//! the others.
//!
//! ### Network (`network`)
//! Tokio runtime binding a UDP socket and driving the relay at the
//! configured tick rate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default())?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod network;
pub mod outbox;
pub mod registry;
pub mod relay;

pub use config::ServerConfig;
pub use network::Server;
pub use relay::{Relay, RelayError};
