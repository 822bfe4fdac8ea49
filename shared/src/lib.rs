//! Types, wire protocol and transport shared by the session server and clients.
//!
//! Nothing in this crate holds session state. It defines the vocabulary both
//! sides agree on:
//! - identifiers ([`PeerId`], [`ColorSlot`]) and the [`Position`] payload
//! - the fixed binary [`protocol`] and its codec
//! - the [`transport`] seam the server relay and the session client pump
//! - the color [`PALETTE`] that color slots index into

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod protocol;
pub mod transport;

pub use error::{DecodeError, EncodeError, TransportError};
pub use protocol::{ChatText, FixedString, Message, Name};

/// Default UDP port the server listens on.
pub const DEFAULT_PORT: u16 = 9000;
/// How often a client publishes its own position, in updates per second.
pub const DEFAULT_POSITION_SYNC_HZ: f32 = 5.0;
/// How often a client pings the server, in seconds.
pub const DEFAULT_PING_INTERVAL_SECS: f32 = 2.5;
/// Display name used when the user does not choose one.
pub const DEFAULT_PLAYER_NAME: &str = "crewmate?";

/// Server-assigned identity of a player.
///
/// Ids start at 1 and are never reused while a server process runs.
/// [`PeerId::SERVER`] (0) is reserved and marks chat lines written by the
/// server operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const SERVER: PeerId = PeerId(0);

    pub fn is_server(self) -> bool {
        self == Self::SERVER
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index into the shared color [`PALETTE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColorSlot(pub u32);

impl fmt::Display for ColorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Absolute world position of a player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation towards `target`.
    ///
    /// `t` is clamped to `[0, 1]` and every component stays between the two
    /// endpoints, so the result never overshoots `target`. `t == 1` returns
    /// `target` exactly.
    pub fn lerp(self, target: Position, t: f32) -> Position {
        let t = t.clamp(0.0, 1.0);
        if t >= 1.0 {
            return target;
        }

        Position {
            x: lerp_component(self.x, target.x, t),
            y: lerp_component(self.y, target.y, t),
            z: lerp_component(self.z, target.z, t),
        }
    }

    pub fn distance(self, other: Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

fn lerp_component(from: f32, to: f32, t: f32) -> f32 {
    // NaN bounds would make clamp panic
    if from.is_nan() || to.is_nan() {
        return to;
    }

    let value = from + (to - from) * t;
    value.clamp(from.min(to), from.max(to))
}

/// An RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

/// Colors handed out to players, indexed by [`ColorSlot`].
pub const PALETTE: [Rgb; 8] = [
    Rgb::new(0.86, 0.18, 0.18),
    Rgb::new(0.18, 0.40, 0.90),
    Rgb::new(0.16, 0.70, 0.27),
    Rgb::new(0.95, 0.85, 0.20),
    Rgb::new(0.95, 0.52, 0.12),
    Rgb::new(0.58, 0.26, 0.82),
    Rgb::new(0.20, 0.85, 0.88),
    Rgb::new(0.93, 0.36, 0.72),
];

/// Looks up the color for a slot. Out-of-range slots wrap around.
pub fn palette_color(slot: ColorSlot) -> Rgb {
    PALETTE[slot.0 as usize % PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_peer_id_server_reserved() {
        assert!(PeerId::SERVER.is_server());
        assert!(!PeerId(1).is_server());
        assert_eq!(PeerId(7).to_string(), "#7");
    }

    #[test]
    fn test_lerp_midpoint() {
        let from = Position::new(0.0, 10.0, -4.0);
        let to = Position::new(10.0, 20.0, 4.0);
        let mid = from.lerp(to, 0.5);

        assert_approx_eq!(mid.x, 5.0);
        assert_approx_eq!(mid.y, 15.0);
        assert_approx_eq!(mid.z, 0.0);
    }

    #[test]
    fn test_lerp_clamps_and_lands_exactly() {
        let from = Position::new(0.1, 0.2, 0.3);
        let to = Position::new(0.7, -0.9, 1e-7);

        assert_eq!(from.lerp(to, 1.0), to);
        assert_eq!(from.lerp(to, 3.5), to);
        assert_eq!(from.lerp(to, -1.0), from);
    }

    #[test]
    fn test_lerp_never_leaves_segment() {
        let from = Position::new(0.1, 100.0, -3.3);
        let to = Position::new(0.3, -100.0, 3.3);

        for step in 0..=100 {
            let p = from.lerp(to, step as f32 / 100.0);
            assert!(p.x >= 0.1 && p.x <= 0.3);
            assert!(p.y >= -100.0 && p.y <= 100.0);
            assert!(p.z >= -3.3 && p.z <= 3.3);
        }
    }

    #[test]
    fn test_distance() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert_approx_eq!(a.distance(b), 5.0);
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(palette_color(ColorSlot(0)), PALETTE[0]);
        assert_eq!(palette_color(ColorSlot(9)), PALETTE[1]);
    }
}
