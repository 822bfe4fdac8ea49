//! Smooth motion of remote peers between sparse position samples
//!
//! Each peer carries one [`Interpolation`] in its
//! [`PeerSnapshot`](crate::peers::PeerSnapshot). A new sample restarts the
//! interpolation from wherever the peer is drawn at that moment, and the
//! [`PositionInterpolator`] advances every peer once per tick.

use crate::peers::{PeerSnapshot, PeerStore};
use shared::Position;
use std::time::{Duration, Instant};

/// Linear motion from `start` to `target` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub start: Position,
    pub target: Position,
    pub started_at: Instant,
    pub duration: Duration,
}

impl Interpolation {
    /// An interpolation that is already at `position`.
    pub fn settled(position: Position, now: Instant) -> Self {
        Self {
            start: position,
            target: position,
            started_at: now,
            duration: Duration::ZERO,
        }
    }

    /// Position at `now`, clamped to `target` once the window has passed.
    pub fn sample(&self, now: Instant) -> Position {
        if self.duration.is_zero() {
            return self.target;
        }

        let elapsed = now.saturating_duration_since(self.started_at);
        let t = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        self.start.lerp(self.target, t)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.duration
    }

    /// Heads for `target`, starting from the position at `now`.
    pub fn retarget(&mut self, target: Position, now: Instant, duration: Duration) {
        *self = Self {
            start: self.sample(now),
            target,
            started_at: now,
            duration,
        };
    }
}

#[derive(Debug, Clone)]
pub struct PositionInterpolator {
    duration: Duration,
}

impl PositionInterpolator {
    /// The window matches the sync period, so a peer reaches each sample
    /// just as the next one is due.
    pub fn new(window: Duration) -> Self {
        Self { duration: window }
    }

    /// Hands a new sample to a peer. The first sample places it directly.
    pub fn set_target(&self, peer: &mut PeerSnapshot, target: Position, now: Instant) {
        match peer.interpolation.as_mut() {
            Some(interpolation) => interpolation.retarget(target, now, self.duration),
            None => peer.interpolation = Some(Interpolation::settled(target, now)),
        }
        peer.position = peer.interpolation.map(|interpolation| interpolation.sample(now));
    }

    /// Moves every peer to its interpolated position for `now`.
    pub fn advance(&self, peers: &mut PeerStore, now: Instant) {
        for peer in peers.iter_mut() {
            if let Some(interpolation) = peer.interpolation {
                peer.position = Some(interpolation.sample(now));
            }
        }
    }
}
