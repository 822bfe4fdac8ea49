//! Local mirror of the remote players in the session

use crate::interpolation::Interpolation;
use shared::{palette_color, ColorSlot, Name, PeerId, Position, Rgb};
use std::collections::BTreeMap;

/// What this client knows about one remote player.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub name: Name,
    pub color_slot: ColorSlot,
    /// Rendered position. `None` until the first sample arrives.
    pub position: Option<Position>,
    pub interpolation: Option<Interpolation>,
}

impl PeerSnapshot {
    pub fn new(peer_id: PeerId, name: Name, color_slot: ColorSlot) -> Self {
        Self {
            peer_id,
            name,
            color_slot,
            position: None,
            interpolation: None,
        }
    }

    pub fn color(&self) -> Rgb {
        palette_color(self.color_slot)
    }

    /// Latest sample received, as opposed to the rendered position.
    pub fn target(&self) -> Option<Position> {
        self.interpolation.map(|interpolation| interpolation.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Remote peers keyed by id. Never contains the local player.
#[derive(Debug, Default)]
pub struct PeerStore {
    peers: BTreeMap<PeerId, PeerSnapshot>,
}

impl PeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer, or refreshes name and color of a known one while
    /// keeping its motion.
    pub fn upsert(&mut self, peer_id: PeerId, name: Name, color_slot: ColorSlot) -> Upsert {
        match self.peers.get_mut(&peer_id) {
            Some(existing) => {
                existing.name = name;
                existing.color_slot = color_slot;
                Upsert::Updated
            }
            None => {
                self.peers
                    .insert(peer_id, PeerSnapshot::new(peer_id, name, color_slot));
                Upsert::Inserted
            }
        }
    }

    pub fn remove(&mut self, peer_id: PeerId) -> Option<PeerSnapshot> {
        self.peers.remove(&peer_id)
    }

    pub fn get(&self, peer_id: PeerId) -> Option<&PeerSnapshot> {
        self.peers.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: PeerId) -> Option<&mut PeerSnapshot> {
        self.peers.get_mut(&peer_id)
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.peers.contains_key(&peer_id)
    }

    pub fn display_name(&self, peer_id: PeerId) -> Option<&str> {
        self.peers.get(&peer_id).map(|peer| peer.name.as_str())
    }

    /// Peers in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerSnapshot> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerSnapshot> {
        self.peers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
