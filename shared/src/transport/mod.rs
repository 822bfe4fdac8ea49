//! Packet transport seam between the session logic and the network
//!
//! The server relay and the session client never touch sockets directly.
//! They drive a transport once per tick: [`ServerTransport::pump`] or
//! [`ClientTransport::pump`] moves datagrams in and out, after which queued
//! [`TransportEvent`]s are popped and outgoing payloads are handed over with
//! [`ServerTransport::send`].
//!
//! Two implementations exist:
//! - [`udp`], a non-blocking UDP socket with a small reliable sub-channel
//! - [`local`], an in-memory network for deterministic tests

use crate::error::TransportError;
use rand::Rng;
use std::fmt;
use std::time::{Duration, Instant};

pub mod link;
pub mod local;
pub mod udp;

pub use local::{LocalClientTransport, LocalNetwork, LocalServerTransport};
pub use udp::{UdpClientTransport, UdpServerTransport};

/// Opaque handle of one client connection on the server.
///
/// Handles are never reused by a transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Delivery guarantee requested for a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Fire and forget. May be lost, duplicated or reordered.
    Unreliable,
    /// Delivered exactly once and in order relative to other reliable
    /// payloads on the same connection, as long as the connection lives.
    Reliable,
}

/// Something that happened on a connection since the last pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect,
    Data(Vec<u8>),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Server side of a transport.
pub trait ServerTransport {
    /// Moves datagrams between the network and the internal queues and
    /// expires silent connections.
    fn pump(&mut self, now: Instant) -> Result<(), TransportError>;

    /// Pops the next connection that has not been handed out yet.
    fn accept(&mut self) -> Option<ConnectionId>;

    /// True until the connection's `Disconnect` event has been popped.
    fn is_alive(&self, conn: ConnectionId) -> bool;

    fn pop_event(&mut self, conn: ConnectionId) -> Option<TransportEvent>;

    fn send(
        &mut self,
        conn: ConnectionId,
        delivery: Delivery,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Closes a connection, telling the remote end when possible.
    fn disconnect(&mut self, conn: ConnectionId);
}

/// Client side of a transport, owning exactly one connection.
pub trait ClientTransport {
    fn pump(&mut self, now: Instant) -> Result<(), TransportError>;

    fn state(&self) -> ConnectionState;

    fn pop_event(&mut self) -> Option<TransportEvent>;

    fn send(&mut self, delivery: Delivery, payload: &[u8]) -> Result<(), TransportError>;

    fn disconnect(&mut self);
}

/// Timing knobs of the UDP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Silence after which a connection is considered dead.
    pub connection_timeout: Duration,
    /// Idle time after which an empty keepalive frame is sent.
    pub keepalive_interval: Duration,
    /// How long an unacknowledged reliable frame waits before resending.
    pub resend_interval: Duration,
    /// How often a connect request is repeated while connecting.
    pub connect_retry_interval: Duration,
    /// How long the client keeps trying to connect.
    pub connect_timeout: Duration,
    pub loss: LossSimulation,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(1),
            resend_interval: Duration::from_millis(200),
            connect_retry_interval: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
            loss: LossSimulation::default(),
        }
    }
}

/// Artificial packet loss applied to outgoing datagrams.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossSimulation {
    /// Probability in `[0, 1]` that an outgoing datagram is dropped.
    pub drop_rate: f32,
}

impl LossSimulation {
    pub fn new(drop_rate: f32) -> Self {
        Self {
            drop_rate: drop_rate.clamp(0.0, 1.0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.drop_rate > 0.0
    }

    pub fn should_drop(&self) -> bool {
        self.is_enabled() && rand::thread_rng().gen::<f32>() < self.drop_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_simulation_bounds() {
        let never = LossSimulation::new(0.0);
        let always = LossSimulation::new(4.0);

        assert!(!never.is_enabled());
        assert_eq!(always.drop_rate, 1.0);
        for _ in 0..100 {
            assert!(!never.should_drop());
            assert!(always.should_drop());
        }
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(12).to_string(), "conn-12");
    }
}
