//! # Session Client Library
//!
//! Client side of a small multiplayer session. A client connects to the
//! relay server, receives its identity, joins under a display name and from
//! then on publishes its own position at a fixed rate. Remote players arrive
//! as sparse, possibly lost position samples; the client turns them into
//! smooth motion by interpolating each peer from where it is drawn towards
//! its newest sample.
//!
//! ## Module Organization
//!
//! ### Session (`session`)
//! The per-tick pump. Dispatches inbound messages into the peer store,
//! sends `Join`, positions and pings, and queues [`session::SessionEvent`]s
//! for the presentation layer.
//!
//! ### Peers (`peers`) and Interpolation (`interpolation`)
//! The local mirror of remote players and the motion record each of them
//! carries. A position for a peer that never joined is ignored.
//!
//! ### Latency (`latency`)
//! One-way latency estimated as half the round trip of a client ping.
//!
//! ### Timer (`timer`), Chat (`chat`), Config (`config`)
//! Drift-free interval timers, the bounded chat log and startup settings.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::session::SessionClient;
//! use shared::transport::UdpClientTransport;
//! use std::time::Instant;
//!
//! let config = ClientConfig::default();
//! let transport =
//!     UdpClientTransport::connect(config.server_addr, config.transport.clone(), Instant::now())?;
//! let mut session = SessionClient::new(transport, &config);
//!
//! loop {
//!     session.tick(Instant::now());
//!     for event in session.drain_events() {
//!         println!("{:?}", event);
//!     }
//!     for peer in session.peers().iter() {
//!         // draw peer.position
//!     }
//!     # break;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod latency;
pub mod peers;
pub mod session;
pub mod timer;

pub use config::ClientConfig;
pub use error::{ConfigError, SessionError};
pub use session::{SessionClient, SessionEvent, SessionStatus};
