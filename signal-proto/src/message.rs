//! Wire format message types for the signaling protocol.
//!
//! Every frame exchanged between a client and the relay carries exactly one
//! [`Message`]. The relay reads only the routing fields (`type`, `room`,
//! `from`, `to`); session descriptions and candidates are opaque JSON values
//! that are passed through untouched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `type` tag of a [`Message`].
///
/// Tags the relay does not know are kept in [`MessageType::Other`] so that a
/// newer client never breaks decoding on an older relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Register the sending connection in a room under an identity.
    Join,
    /// Leave the room the connection is registered in.
    Leave,
    /// Client keepalive.
    Ping,
    /// Keepalive reply.
    Pong,
    /// Session description offer, routed to `to`.
    Offer,
    /// Session description answer, routed to `to`.
    Answer,
    /// Network path candidate, routed to `to`.
    Candidate,
    /// Relay-generated snapshot of a room's membership.
    RoomMembers,
    /// Any tag not listed above.
    #[serde(untagged)]
    Other(String),
}

impl MessageType {
    /// Returns the wire tag for this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::RoomMembers => "room_members",
            Self::Other(tag) => tag,
        }
    }

    /// Whether messages of this type are point-to-point forwarded to `to`.
    #[must_use]
    pub const fn is_forwarded(&self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::Candidate)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single signaling record.
///
/// `room`, `from` and `to` decode as empty strings when absent, so callers
/// check emptiness rather than presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message tag.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Room scope.
    #[serde(default)]
    pub room: String,
    /// Sender identity.
    #[serde(default)]
    pub from: String,
    /// Target identity within the room, for forwarded types.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    /// Opaque session description. An explicit `null` is kept as
    /// `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sdp: Option<Value>,
    /// Opaque network path candidate.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
    /// Room membership, only set on `room_members`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<BTreeSet<String>>,
}

/// Distinguishes a field sent as `null` from an absent one, which
/// `#[serde(default)]` leaves as `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    /// Creates a message with only the routing header set.
    #[must_use]
    pub fn new(kind: MessageType, room: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            kind,
            room: room.into(),
            from: from.into(),
            to: String::new(),
            sdp: None,
            candidate: None,
            members: None,
        }
    }

    /// A `join` request for `room` under identity `from`.
    #[must_use]
    pub fn join(room: impl Into<String>, from: impl Into<String>) -> Self {
        Self::new(MessageType::Join, room, from)
    }

    /// A `leave` request.
    #[must_use]
    pub fn leave(room: impl Into<String>, from: impl Into<String>) -> Self {
        Self::new(MessageType::Leave, room, from)
    }

    /// An `offer` carrying `sdp` to `to`.
    #[must_use]
    pub fn offer(
        room: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        sdp: Value,
    ) -> Self {
        Self {
            to: to.into(),
            sdp: Some(sdp),
            ..Self::new(MessageType::Offer, room, from)
        }
    }

    /// An `answer` carrying `sdp` to `to`.
    #[must_use]
    pub fn answer(
        room: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        sdp: Value,
    ) -> Self {
        Self {
            to: to.into(),
            sdp: Some(sdp),
            ..Self::new(MessageType::Answer, room, from)
        }
    }

    /// A `candidate` carrying a network path candidate to `to`.
    #[must_use]
    pub fn candidate(
        room: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        candidate: Value,
    ) -> Self {
        Self {
            to: to.into(),
            candidate: Some(candidate),
            ..Self::new(MessageType::Candidate, room, from)
        }
    }

    /// The relay's membership snapshot for `room`.
    #[must_use]
    pub fn room_members(room: impl Into<String>, members: BTreeSet<String>) -> Self {
        Self {
            members: Some(members),
            ..Self::new(MessageType::RoomMembers, room, String::new())
        }
    }
}
