//! Authoritative membership of the session
//!
//! A connection goes through two stages here:
//! - **pending**: [`SessionRegistry::assign_identity`] gave it a [`PeerId`]
//!   and reserved a [`ColorSlot`], but the client has not sent `Join` yet
//! - **joined**: [`SessionRegistry::complete_join`] turned the identity into
//!   a [`PlayerRecord`] and told everybody about it
//!
//! Both stages hold their color slot until [`SessionRegistry::remove`].

use crate::outbox::Outbox;
use log::{debug, info, warn};
use shared::transport::ConnectionId;
use shared::{ColorSlot, Message, Name, PeerId};
use std::collections::HashMap;

/// Identity handed to a connection before it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub peer_id: PeerId,
    pub color_slot: ColorSlot,
}

/// A connection that completed `Join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub peer_id: PeerId,
    pub connection: ConnectionId,
    pub name: Name,
    pub color_slot: ColorSlot,
}

impl PlayerRecord {
    /// The `Join` message announcing this player.
    pub fn join_message(&self) -> Message {
        Message::Join {
            peer_id: self.peer_id,
            name: self.name.clone(),
            color_slot: self.color_slot,
        }
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    next_peer_id: u32,
    palette_size: u32,
    pending: HashMap<ConnectionId, Identity>,
    /// Joined players in join order.
    players: Vec<PlayerRecord>,
}

impl SessionRegistry {
    pub fn new(palette_size: u32) -> Self {
        Self {
            next_peer_id: 1,
            palette_size,
            pending: HashMap::new(),
            players: Vec::new(),
        }
    }

    /// Gives `connection` the next peer id and the lowest free color slot.
    ///
    /// Peer ids are never reused. When every slot is taken the connection
    /// gets slot 0, shared with whoever already holds it.
    pub fn assign_identity(&mut self, connection: ConnectionId) -> Identity {
        if let Some(existing) = self.pending.get(&connection) {
            return *existing;
        }
        if let Some(player) = self.player_by_connection(connection) {
            return Identity {
                peer_id: player.peer_id,
                color_slot: player.color_slot,
            };
        }

        let peer_id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        let color_slot = self.lowest_free_slot().unwrap_or_else(|| {
            warn!(
                "All {} color slots taken, {} shares slot 0",
                self.palette_size, peer_id
            );
            ColorSlot(0)
        });

        let identity = Identity {
            peer_id,
            color_slot,
        };
        self.pending.insert(connection, identity);
        debug!("{} assigned {} with {}", connection, peer_id, color_slot);
        identity
    }

    fn lowest_free_slot(&self) -> Option<ColorSlot> {
        let held: Vec<u32> = self
            .pending
            .values()
            .map(|identity| identity.color_slot.0)
            .chain(self.players.iter().map(|player| player.color_slot.0))
            .collect();

        (0..self.palette_size)
            .find(|slot| !held.contains(slot))
            .map(ColorSlot)
    }

    /// Turns the pending identity of `connection` into a player record.
    ///
    /// The new player is announced to every other joined connection first,
    /// then the new connection receives the full roster, itself excluded.
    /// The id and slot the client claims are ignored in favour of the
    /// assigned ones. Returns `None` if the connection has no pending
    /// identity.
    pub fn complete_join(
        &mut self,
        outbox: &mut Outbox,
        connection: ConnectionId,
        claimed_peer_id: PeerId,
        name: Name,
        claimed_slot: ColorSlot,
    ) -> Option<PlayerRecord> {
        let identity = self.pending.remove(&connection)?;
        if claimed_peer_id != identity.peer_id || claimed_slot != identity.color_slot {
            warn!(
                "{} claimed {} with {}, keeping assigned {} with {}",
                connection, claimed_peer_id, claimed_slot, identity.peer_id, identity.color_slot
            );
        }

        let record = PlayerRecord {
            peer_id: identity.peer_id,
            connection,
            name,
            color_slot: identity.color_slot,
        };

        self.broadcast(outbox, &record.join_message(), Some(connection));
        for existing in &self.players {
            outbox.send(connection, existing.join_message());
        }

        info!(
            "{} joined as \"{}\" with {} ({} players)",
            record.peer_id,
            record.name,
            record.color_slot,
            self.players.len() + 1
        );
        self.players.push(record.clone());
        Some(record)
    }

    /// Forgets `connection` and frees its color slot.
    ///
    /// Returns the peer id only if the connection had joined, since nobody
    /// else ever heard of a pending one.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<PeerId> {
        if let Some(identity) = self.pending.remove(&connection) {
            debug!("{} left before joining", identity.peer_id);
            return None;
        }

        let index = self
            .players
            .iter()
            .position(|player| player.connection == connection)?;
        let record = self.players.remove(index);
        info!(
            "{} (\"{}\") left ({} players)",
            record.peer_id,
            record.name,
            self.players.len()
        );
        Some(record.peer_id)
    }

    /// Queues `message` for every joined connection except `excluding`.
    pub fn broadcast(&self, outbox: &mut Outbox, message: &Message, excluding: Option<ConnectionId>) {
        let recipients = self
            .players
            .iter()
            .map(|player| player.connection)
            .filter(|conn| Some(*conn) != excluding);
        outbox.send_all(recipients, message);
    }

    pub fn peer_of(&self, connection: ConnectionId) -> Option<PeerId> {
        self.player_by_connection(connection)
            .map(|player| player.peer_id)
    }

    pub fn player_by_connection(&self, connection: ConnectionId) -> Option<&PlayerRecord> {
        self.players
            .iter()
            .find(|player| player.connection == connection)
    }

    pub fn pending_identity(&self, connection: ConnectionId) -> Option<Identity> {
        self.pending.get(&connection).copied()
    }

    /// Joined players in join order.
    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(
        registry: &mut SessionRegistry,
        outbox: &mut Outbox,
        conn: ConnectionId,
        name: &str,
    ) -> PlayerRecord {
        let identity = registry.assign_identity(conn);
        registry
            .complete_join(outbox, conn, identity.peer_id, Name::new(name), identity.color_slot)
            .unwrap()
    }

    #[test]
    fn test_peer_ids_increase_and_are_not_reused() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();

        let a = join(&mut registry, &mut outbox, ConnectionId(1), "a");
        let b = join(&mut registry, &mut outbox, ConnectionId(2), "b");
        assert_eq!(a.peer_id, PeerId(1));
        assert_eq!(b.peer_id, PeerId(2));

        registry.remove(ConnectionId(1));
        let c = registry.assign_identity(ConnectionId(3));
        assert_eq!(c.peer_id, PeerId(3));
    }

    #[test]
    fn test_assign_identity_is_stable_per_connection() {
        let mut registry = SessionRegistry::new(8);
        let first = registry.assign_identity(ConnectionId(1));
        let again = registry.assign_identity(ConnectionId(1));
        assert_eq!(first, again);
        assert_eq!(registry.assign_identity(ConnectionId(2)).peer_id, PeerId(2));
    }

    #[test]
    fn test_pending_identity_holds_its_slot() {
        let mut registry = SessionRegistry::new(8);
        let first = registry.assign_identity(ConnectionId(1));
        let second = registry.assign_identity(ConnectionId(2));

        assert_eq!(first.color_slot, ColorSlot(0));
        assert_eq!(second.color_slot, ColorSlot(1));
    }

    #[test]
    fn test_released_slot_is_reused_immediately() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();

        join(&mut registry, &mut outbox, ConnectionId(1), "a");
        join(&mut registry, &mut outbox, ConnectionId(2), "b");
        join(&mut registry, &mut outbox, ConnectionId(3), "c");

        assert_eq!(registry.remove(ConnectionId(2)), Some(PeerId(2)));
        let next = registry.assign_identity(ConnectionId(4));
        assert_eq!(next.color_slot, ColorSlot(1));
    }

    #[test]
    fn test_palette_exhaustion_falls_back_to_slot_zero() {
        let mut registry = SessionRegistry::new(2);
        let mut outbox = Outbox::new();

        let a = join(&mut registry, &mut outbox, ConnectionId(1), "a");
        let b = join(&mut registry, &mut outbox, ConnectionId(2), "b");
        let c = join(&mut registry, &mut outbox, ConnectionId(3), "c");

        assert_eq!(a.color_slot, ColorSlot(0));
        assert_eq!(b.color_slot, ColorSlot(1));
        // no free slot left, c is indistinguishable from a
        assert_eq!(c.color_slot, ColorSlot(0));
    }

    #[test]
    fn test_join_broadcast_comes_before_roster() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();

        let a = join(&mut registry, &mut outbox, ConnectionId(1), "a");
        let b = join(&mut registry, &mut outbox, ConnectionId(2), "b");
        outbox.take();

        let c = join(&mut registry, &mut outbox, ConnectionId(3), "c");
        let sent = outbox.take();

        let expected = vec![
            (ConnectionId(1), c.join_message()),
            (ConnectionId(2), c.join_message()),
            (ConnectionId(3), a.join_message()),
            (ConnectionId(3), b.join_message()),
        ];
        let actual: Vec<_> = sent.into_iter().map(|e| (e.to, e.message)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_first_player_gets_empty_roster() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();

        join(&mut registry, &mut outbox, ConnectionId(1), "solo");
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_join_uses_assigned_identity() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();
        let identity = registry.assign_identity(ConnectionId(1));

        let record = registry
            .complete_join(
                &mut outbox,
                ConnectionId(1),
                PeerId(99),
                Name::new("liar"),
                ColorSlot(5),
            )
            .unwrap();

        assert_eq!(record.peer_id, identity.peer_id);
        assert_eq!(record.color_slot, identity.color_slot);
    }

    #[test]
    fn test_join_without_pending_identity_is_refused() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();

        let never_assigned = registry.complete_join(
            &mut outbox,
            ConnectionId(1),
            PeerId(1),
            Name::new("x"),
            ColorSlot(0),
        );
        assert!(never_assigned.is_none());

        join(&mut registry, &mut outbox, ConnectionId(2), "twice");
        let second = registry.complete_join(
            &mut outbox,
            ConnectionId(2),
            PeerId(1),
            Name::new("twice"),
            ColorSlot(0),
        );
        assert!(second.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_pending_and_unknown() {
        let mut registry = SessionRegistry::new(8);
        registry.assign_identity(ConnectionId(1));

        assert_eq!(registry.remove(ConnectionId(1)), None);
        assert_eq!(registry.remove(ConnectionId(42)), None);
        assert!(registry.pending_identity(ConnectionId(1)).is_none());
        // slot 0 is free again
        assert_eq!(registry.assign_identity(ConnectionId(2)).color_slot, ColorSlot(0));
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let mut registry = SessionRegistry::new(8);
        let mut outbox = Outbox::new();
        join(&mut registry, &mut outbox, ConnectionId(1), "a");
        join(&mut registry, &mut outbox, ConnectionId(2), "b");
        registry.assign_identity(ConnectionId(3));
        outbox.take();

        let chat = Message::chat(PeerId(1), "hi");
        registry.broadcast(&mut outbox, &chat, Some(ConnectionId(1)));

        let recipients: Vec<_> = outbox.iter().map(|e| e.to).collect();
        assert_eq!(recipients, vec![ConnectionId(2)]);
    }
}
