//! Binary wire protocol spoken between the session server and its clients
//!
//! Every message is the fixed-int, little-endian bincode encoding of
//! [`Message`]: a 4-byte variant index (the type tag) followed by
//! fixed-width fields. Strings travel as [`FixedString`]s, a `u16` byte
//! length followed by exactly `N` zero-padded content bytes, so every
//! message kind has a fixed size on the wire.
//!
//! | Tag | Message       | Payload                                  |
//! |-----|---------------|------------------------------------------|
//! | 0   | `None`        | -                                        |
//! | 1   | `AssignId`    | u32 peer id, u32 color slot              |
//! | 2   | `Chat`        | u32 sender, string64 text                |
//! | 3   | `Join`        | u32 peer id, string32 name, u32 slot     |
//! | 4   | `Position`    | u32 peer id, f32 x, f32 y, f32 z         |
//! | 5   | `PlayerLeave` | u32 peer id                              |
//! | 6   | `Ping`        | -                                        |

use crate::error::{DecodeError, EncodeError};
use crate::transport::Delivery;
use crate::{ColorSlot, PeerId, Position};
use bincode::Options;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::{self, SerializeTuple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Upper bound on an encoded message. The largest real message is 74 bytes.
pub const MAX_MESSAGE_SIZE: u64 = 256;
/// Byte capacity of a display name.
pub const NAME_CAPACITY: usize = 32;
/// Byte capacity of a chat line.
pub const TEXT_CAPACITY: usize = 64;

const TAG_SIZE: usize = 4;

pub type Name = FixedString<NAME_CAPACITY>;
pub type ChatText = FixedString<TEXT_CAPACITY>;

/// A UTF-8 string holding at most `N` bytes.
///
/// Constructing one from a longer string truncates it at the last character
/// boundary that fits. This is the only lossy step in the codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FixedString<const N: usize> {
    value: String,
}

impl<const N: usize> FixedString<N> {
    pub fn new(value: &str) -> Self {
        Self {
            value: truncate_to_boundary(value, N).to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

fn truncate_to_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }

    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

impl<const N: usize> From<&str> for FixedString<N> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<String> for FixedString<N> {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl<const N: usize> fmt::Display for FixedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<const N: usize> Serialize for FixedString<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = self.value.as_bytes();
        let len = u16::try_from(bytes.len()).map_err(ser::Error::custom)?;

        let mut tuple = serializer.serialize_tuple(N + 1)?;
        tuple.serialize_element(&len)?;
        for index in 0..N {
            tuple.serialize_element(&bytes.get(index).copied().unwrap_or(0))?;
        }
        tuple.end()
    }
}

struct FixedStringVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for FixedStringVisitor<N> {
    type Value = FixedString<N>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a length-prefixed string of at most {N} bytes")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let len: u16 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let len = usize::from(len);
        if len > N {
            return Err(de::Error::custom(format!(
                "string length {len} exceeds capacity {N}"
            )));
        }

        let mut bytes = Vec::with_capacity(len);
        for index in 0..N {
            let byte: u8 = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(index + 1, &self))?;
            if index < len {
                bytes.push(byte);
            } else if byte != 0 {
                return Err(de::Error::custom("non-zero padding after string"));
            }
        }

        let value = String::from_utf8(bytes).map_err(de::Error::custom)?;
        Ok(FixedString { value })
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedString<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(N + 1, FixedStringVisitor::<N>)
    }
}

/// A message exchanged between server and clients.
///
/// Variant order is the wire type tag; never reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Empty keepalive.
    None,
    /// Server to client: the identity and color reserved for this connection.
    AssignId {
        peer_id: PeerId,
        color_slot: ColorSlot,
    },
    /// Chat line. Clients may put anything in `sender`; the server replaces
    /// it with the registered id of the sending connection before relaying.
    Chat { sender: PeerId, text: ChatText },
    /// Client to server when joining, server to clients to announce a member.
    Join {
        peer_id: PeerId,
        name: Name,
        color_slot: ColorSlot,
    },
    /// Absolute position of a player, relayed verbatim.
    Position { peer_id: PeerId, position: Position },
    /// A member left the session.
    PlayerLeave { peer_id: PeerId },
    /// Client-initiated round-trip probe, echoed unchanged by the server.
    Ping,
}

impl Message {
    /// Highest type tag in use.
    pub const MAX_TAG: u32 = 6;

    pub fn chat(sender: PeerId, text: &str) -> Self {
        Message::Chat {
            sender,
            text: ChatText::new(text),
        }
    }

    pub fn join(peer_id: PeerId, name: &str, color_slot: ColorSlot) -> Self {
        Message::Join {
            peer_id,
            name: Name::new(name),
            color_slot,
        }
    }

    /// The 4-byte type tag this message is written with.
    pub fn tag(&self) -> u32 {
        match self {
            Message::None => 0,
            Message::AssignId { .. } => 1,
            Message::Chat { .. } => 2,
            Message::Join { .. } => 3,
            Message::Position { .. } => 4,
            Message::PlayerLeave { .. } => 5,
            Message::Ping => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::None => "None",
            Message::AssignId { .. } => "AssignId",
            Message::Chat { .. } => "Chat",
            Message::Join { .. } => "Join",
            Message::Position { .. } => "Position",
            Message::PlayerLeave { .. } => "PlayerLeave",
            Message::Ping => "Ping",
        }
    }

    /// Channel this kind of message is sent on.
    ///
    /// Membership changes and chat go over the reliable channel. Positions
    /// are resent at a fixed rate anyway, and a lost ping only skips one
    /// latency sample.
    pub fn delivery(&self) -> Delivery {
        match self {
            Message::AssignId { .. }
            | Message::Chat { .. }
            | Message::Join { .. }
            | Message::PlayerLeave { .. } => Delivery::Reliable,
            Message::None | Message::Position { .. } | Message::Ping => Delivery::Unreliable,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        codec()
            .serialize(self)
            .map_err(|e| EncodeError(e.to_string()))
    }

    /// Decodes exactly one message from `bytes`.
    ///
    /// Fails on short buffers, unknown tags, trailing bytes and malformed
    /// strings. Never panics.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let tag_bytes: [u8; TAG_SIZE] = bytes
            .get(..TAG_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(DecodeError::Truncated)?;
        let tag = u32::from_le_bytes(tag_bytes);
        if tag > Self::MAX_TAG {
            return Err(DecodeError::UnknownTag(tag));
        }

        Ok(codec().deserialize(bytes)?)
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_MESSAGE_SIZE)
        .reject_trailing_bytes()
}
