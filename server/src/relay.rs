//! Per-tick event pump of the server
//!
//! [`Relay::tick`] runs the whole server side of the session once:
//! 1. pump the transport
//! 2. drop connections the transport no longer knows
//! 3. accept new connections and send each its assigned identity
//! 4. drain and dispatch inbound messages of every live connection
//! 5. turn disconnects into registry removals and `PlayerLeave` broadcasts
//!
//! Nothing here blocks. All outgoing messages go through the [`Outbox`] and
//! are flushed at the end of the tick, each send independent of the others.

use crate::config::ServerConfig;
use crate::outbox::Outbox;
use crate::registry::SessionRegistry;
use log::{debug, info, warn};
use shared::transport::{ConnectionId, ServerTransport, TransportEvent};
use shared::{DecodeError, Message, PeerId, TransportError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often relay statistics are written to the debug log.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Why one inbound message was dropped. Never fatal to the connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0} sent {1} before joining")]
    NotJoined(ConnectionId, &'static str),

    #[error("{0} sent unexpected {1}")]
    Unexpected(ConnectionId, &'static str),

    #[error("{0} sent Join without a pending identity")]
    Join(ConnectionId),
}

/// Counters since the relay started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub messages_in: u64,
    pub messages_out: u64,
    pub dropped_in: u64,
    pub failed_sends: u64,
}

pub struct Relay<T: ServerTransport> {
    transport: T,
    registry: SessionRegistry,
    connections: Vec<ConnectionId>,
    outbox: Outbox,
    stats: RelayStats,
    last_stats_log: Option<Instant>,
}

impl<T: ServerTransport> Relay<T> {
    pub fn new(transport: T, config: &ServerConfig) -> Self {
        Self {
            transport,
            registry: SessionRegistry::new(config.palette_size),
            connections: Vec::new(),
            outbox: Outbox::new(),
            stats: RelayStats::default(),
            last_stats_log: None,
        }
    }

    pub fn tick(&mut self, now: Instant) -> Result<(), TransportError> {
        self.transport.pump(now)?;

        self.compact_connections();
        self.accept_connections();
        // accepts are flushed first so AssignId precedes anything else
        self.flush();

        let connections = self.connections.clone();
        for conn in connections {
            self.drain_connection(conn);
        }
        self.flush();

        self.log_stats(now);
        Ok(())
    }

    fn compact_connections(&mut self) {
        let mut index = 0;
        while index < self.connections.len() {
            let conn = self.connections[index];
            if self.transport.is_alive(conn) {
                index += 1;
            } else {
                self.connections.swap_remove(index);
                self.handle_disconnect(conn);
            }
        }
    }

    fn accept_connections(&mut self) {
        while let Some(conn) = self.transport.accept() {
            let identity = self.registry.assign_identity(conn);
            info!(
                "Accepted {} as {} with {}",
                conn, identity.peer_id, identity.color_slot
            );
            self.connections.push(conn);
            self.outbox.send(
                conn,
                Message::AssignId {
                    peer_id: identity.peer_id,
                    color_slot: identity.color_slot,
                },
            );
        }
    }

    fn drain_connection(&mut self, conn: ConnectionId) {
        while let Some(event) = self.transport.pop_event(conn) {
            match event {
                TransportEvent::Connect => debug!("{} connected", conn),
                TransportEvent::Data(bytes) => {
                    self.stats.messages_in += 1;
                    if let Err(e) = self.handle_data(conn, &bytes) {
                        self.stats.dropped_in += 1;
                        warn!("Dropping message from {}: {}", conn, e);
                    }
                }
                TransportEvent::Disconnect => {
                    self.connections.retain(|c| *c != conn);
                    self.handle_disconnect(conn);
                    return;
                }
            }
        }
    }

    /// Dispatches one inbound message by its type.
    pub fn handle_data(&mut self, conn: ConnectionId, bytes: &[u8]) -> Result<(), RelayError> {
        let message = Message::decode(bytes)?;

        match message {
            Message::Join {
                peer_id,
                name,
                color_slot,
            } => {
                self.registry
                    .complete_join(&mut self.outbox, conn, peer_id, name, color_slot)
                    .ok_or(RelayError::Join(conn))?;
            }
            Message::Position { .. } => {
                if self.registry.peer_of(conn).is_none() {
                    return Err(RelayError::NotJoined(conn, message.name()));
                }
                self.registry
                    .broadcast(&mut self.outbox, &message, Some(conn));
            }
            Message::Chat { text, .. } => {
                let sender = self
                    .registry
                    .peer_of(conn)
                    .ok_or(RelayError::NotJoined(conn, "Chat"))?;
                debug!("Chat from {}: {}", sender, text);
                self.registry.broadcast(
                    &mut self.outbox,
                    &Message::Chat { sender, text },
                    Some(conn),
                );
            }
            Message::Ping => self.outbox.send(conn, Message::Ping),
            Message::None => {}
            Message::AssignId { .. } | Message::PlayerLeave { .. } => {
                return Err(RelayError::Unexpected(conn, message.name()));
            }
        }

        Ok(())
    }

    fn handle_disconnect(&mut self, conn: ConnectionId) {
        match self.registry.remove(conn) {
            Some(peer_id) => {
                self.registry.broadcast(
                    &mut self.outbox,
                    &Message::PlayerLeave { peer_id },
                    None,
                );
            }
            None => debug!("{} closed without joining", conn),
        }
    }

    /// Sends a chat line from the server operator to every joined player.
    pub fn announce(&mut self, text: &str) {
        let message = Message::chat(PeerId::SERVER, text);
        info!(
            "Announcing to {} players: {}",
            self.registry.len(),
            text
        );
        self.registry.broadcast(&mut self.outbox, &message, None);
        self.flush();
    }

    fn flush(&mut self) {
        for envelope in self.outbox.take() {
            let bytes = match envelope.message.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("{}", e);
                    self.stats.failed_sends += 1;
                    continue;
                }
            };

            match self
                .transport
                .send(envelope.to, envelope.message.delivery(), &bytes)
            {
                Ok(()) => self.stats.messages_out += 1,
                Err(e) => {
                    self.stats.failed_sends += 1;
                    debug!(
                        "Failed to send {} to {}: {}",
                        envelope.message.name(),
                        envelope.to,
                        e
                    );
                }
            }
        }
    }

    fn log_stats(&mut self, now: Instant) {
        let due = self
            .last_stats_log
            .map_or(true, |at| now.saturating_duration_since(at) >= STATS_INTERVAL);
        if !due {
            return;
        }
        self.last_stats_log = Some(now);

        if !self.connections.is_empty() {
            debug!(
                "{} connections, {} joined, {} in, {} out, {} dropped, {} failed sends",
                self.connections.len(),
                self.registry.len(),
                self.stats.messages_in,
                self.stats.messages_out,
                self.stats.dropped_in,
                self.stats.failed_sends
            );
        }
    }

    /// Closes every connection and forgets all players.
    pub fn shutdown(&mut self) {
        info!("Closing {} connections", self.connections.len());
        for conn in self.connections.drain(..) {
            self.transport.disconnect(conn);
        }
        self.registry.clear();
        self.outbox.take();
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::transport::{
        ClientTransport, Delivery, LocalClientTransport, LocalNetwork, LocalServerTransport,
    };
    use shared::{ColorSlot, Position};

    struct Harness {
        network: LocalNetwork,
        relay: Relay<LocalServerTransport>,
    }

    impl Harness {
        fn new(palette_size: u32) -> Self {
            let network = LocalNetwork::new();
            let config = ServerConfig {
                palette_size,
                ..ServerConfig::default()
            };
            let relay = Relay::new(network.server(), &config);
            Self { network, relay }
        }

        fn tick(&mut self) {
            self.relay.tick(Instant::now()).unwrap();
        }

        /// Connects a raw client and returns it with its assigned identity.
        fn connect(&mut self) -> (LocalClientTransport, PeerId, ColorSlot) {
            let mut client = self.network.connect();
            self.tick();
            let assigned = received(&mut client)
                .into_iter()
                .find_map(|message| match message {
                    Message::AssignId {
                        peer_id,
                        color_slot,
                    } => Some((peer_id, color_slot)),
                    _ => None,
                })
                .unwrap();
            (client, assigned.0, assigned.1)
        }

        fn join(&mut self, name: &str) -> (LocalClientTransport, PeerId, ColorSlot) {
            let (mut client, peer_id, color_slot) = self.connect();
            send(&mut client, &Message::join(peer_id, name, color_slot));
            self.tick();
            (client, peer_id, color_slot)
        }
    }

    fn send(client: &mut LocalClientTransport, message: &Message) {
        client
            .send(message.delivery(), &message.encode().unwrap())
            .unwrap();
    }

    fn received(client: &mut LocalClientTransport) -> Vec<Message> {
        std::iter::from_fn(|| client.pop_event())
            .filter_map(|event| match event {
                TransportEvent::Data(bytes) => Some(Message::decode(&bytes).unwrap()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_accept_sends_assign_id() {
        let mut harness = Harness::new(8);
        let (_client, peer_id, color_slot) = harness.connect();

        assert_eq!(peer_id, PeerId(1));
        assert_eq!(color_slot, ColorSlot(0));
        assert_eq!(harness.relay.connections().len(), 1);
        assert!(harness.relay.registry().is_empty());
    }

    #[test]
    fn test_join_roster_and_announcement() {
        let mut harness = Harness::new(8);
        let (mut first, first_id, _) = harness.join("first");
        assert!(received(&mut first).is_empty());

        let (mut second, second_id, _) = harness.join("second");

        let to_first = received(&mut first);
        assert_eq!(
            to_first,
            vec![Message::join(second_id, "second", ColorSlot(1))]
        );

        let to_second = received(&mut second);
        assert_eq!(
            to_second,
            vec![Message::join(first_id, "first", ColorSlot(0))]
        );
    }

    #[test]
    fn test_position_relayed_verbatim_to_others() {
        let mut harness = Harness::new(8);
        let (mut a, a_id, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut a);
        received(&mut b);

        let update = Message::Position {
            peer_id: a_id,
            position: Position::new(1.0, 2.0, 3.0),
        };
        send(&mut a, &update);
        harness.tick();

        assert_eq!(received(&mut b), vec![update]);
        assert!(received(&mut a).is_empty());
    }

    #[test]
    fn test_chat_sender_is_stamped_by_server() {
        let mut harness = Harness::new(8);
        let (mut a, a_id, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut a);
        received(&mut b);

        send(&mut a, &Message::chat(PeerId(77), "hello"));
        harness.tick();

        assert_eq!(received(&mut b), vec![Message::chat(a_id, "hello")]);
        assert!(received(&mut a).is_empty());
    }

    #[test]
    fn test_ping_echoed_to_sender_only() {
        let mut harness = Harness::new(8);
        let (mut a, _, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut a);
        received(&mut b);

        send(&mut a, &Message::Ping);
        harness.tick();

        assert_eq!(received(&mut a), vec![Message::Ping]);
        assert!(received(&mut b).is_empty());
    }

    #[test]
    fn test_messages_before_join_are_dropped() {
        let mut harness = Harness::new(8);
        let (mut joined, _, _) = harness.join("joined");
        let (mut pending, pending_id, _) = harness.connect();
        received(&mut joined);

        send(
            &mut pending,
            &Message::Position {
                peer_id: pending_id,
                position: Position::ORIGIN,
            },
        );
        send(&mut pending, &Message::chat(pending_id, "sneaky"));
        harness.tick();

        assert!(received(&mut joined).is_empty());
        assert_eq!(harness.relay.stats().dropped_in, 2);
    }

    #[test]
    fn test_malformed_message_keeps_connection() {
        let mut harness = Harness::new(8);
        let (mut a, a_id, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut b);

        a.send(Delivery::Unreliable, &[1, 2]).unwrap();
        a.send(Delivery::Unreliable, &[200, 0, 0, 0]).unwrap();
        send(&mut a, &Message::chat(a_id, "still here"));
        harness.tick();

        assert_eq!(received(&mut b), vec![Message::chat(a_id, "still here")]);
        assert_eq!(harness.relay.registry().len(), 2);
    }

    #[test]
    fn test_disconnect_broadcasts_leave() {
        let mut harness = Harness::new(8);
        let (mut a, a_id, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut b);

        a.disconnect();
        harness.tick();

        assert_eq!(received(&mut b), vec![Message::PlayerLeave { peer_id: a_id }]);
        assert_eq!(harness.relay.registry().len(), 1);
        assert_eq!(harness.relay.connections().len(), 1);
    }

    #[test]
    fn test_pending_disconnect_is_silent() {
        let mut harness = Harness::new(8);
        let (mut joined, _, _) = harness.join("joined");
        let (mut pending, _, _) = harness.connect();
        received(&mut joined);

        pending.disconnect();
        harness.tick();

        assert!(received(&mut joined).is_empty());
        assert!(harness.relay.registry().pending_identity(pending.connection_id()).is_none());
    }

    #[test]
    fn test_severed_connection_is_compacted() {
        let mut harness = Harness::new(8);
        let (a, a_id, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut b);

        harness.network.sever(a.connection_id());
        harness.tick();

        assert_eq!(received(&mut b), vec![Message::PlayerLeave { peer_id: a_id }]);
        assert_eq!(harness.relay.connections(), &[b.connection_id()]);
    }

    #[test]
    fn test_palette_of_two() {
        let mut harness = Harness::new(2);
        let (_a, _, slot_a) = harness.join("a");
        let (_b, _, slot_b) = harness.join("b");
        let (_c, _, slot_c) = harness.join("c");

        assert_eq!(slot_a, ColorSlot(0));
        assert_eq!(slot_b, ColorSlot(1));
        assert_eq!(slot_c, ColorSlot(0));
    }

    #[test]
    fn test_announce_reaches_everyone() {
        let mut harness = Harness::new(8);
        let (mut a, _, _) = harness.join("a");
        let (mut b, _, _) = harness.join("b");
        received(&mut a);
        received(&mut b);

        harness.relay.announce("server restarting");

        let expected = vec![Message::chat(PeerId::SERVER, "server restarting")];
        assert_eq!(received(&mut a), expected);
        assert_eq!(received(&mut b), expected);
    }

    #[test]
    fn test_unexpected_message_kinds() {
        let mut harness = Harness::new(8);
        let (_a, _, _) = harness.join("a");
        let conn = harness.relay.connections()[0];

        let bytes = Message::PlayerLeave { peer_id: PeerId(1) }.encode().unwrap();
        assert!(matches!(
            harness.relay.handle_data(conn, &bytes),
            Err(RelayError::Unexpected(_, "PlayerLeave"))
        ));
    }

    #[test]
    fn test_shutdown_disconnects_clients() {
        let mut harness = Harness::new(8);
        let (a, _, _) = harness.join("a");

        harness.relay.shutdown();

        assert_eq!(a.state(), shared::transport::ConnectionState::Disconnected);
        assert!(harness.relay.connections().is_empty());
        assert!(harness.relay.registry().is_empty());
    }
}
