//! Data model for rooms, rosters and messages as they appear on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

// --- Identity ---

/// Numeric message id assigned by the server.
pub type MessageId = u64;

/// Identifier of a room (a "server" in the wire vocabulary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// --- Presence ---

/// Presence status of a roster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    Offline,
}

impl PresenceStatus {
    /// Online and idle members both live in the online partition.
    pub fn is_online(self) -> bool {
        matches!(self, PresenceStatus::Online | PresenceStatus::Idle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Idle => "idle",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user as listed in a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "userid")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub status: PresenceStatus,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default, rename = "customStatus")]
    pub custom_status: Option<String>,
    #[serde(default)]
    pub bio: String,
}

impl RosterEntry {
    /// Entry for a user first seen through a presence update, before any
    /// profile data is known.
    pub fn sighted(user_id: impl Into<String>, status: PresenceStatus) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id,
            status,
            picture: None,
            custom_status: None,
            bio: String::new(),
        }
    }
}

// --- Messaging ---

/// A chat message in a room timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "ids::required")]
    pub id: MessageId,
    #[serde(rename = "displayName")]
    pub author_display_name: String,
    #[serde(default, rename = "picture")]
    pub picture_url: Option<String>,
    #[serde(rename = "serverID", alias = "server_id")]
    pub room_id: RoomId,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "messageRef", deserialize_with = "ids::optional")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub link: Option<String>,
}

// --- Rooms ---

/// Summary of a room the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSummary {
    #[serde(rename = "serverID", alias = "sid")]
    pub server_id: RoomId,
    #[serde(default, alias = "serverName", alias = "server_name")]
    pub name: String,
    #[serde(default, alias = "ownerID")]
    pub owner: String,
}

/// Room referenced by an invite code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteServer {
    pub sid: RoomId,
    #[serde(default)]
    pub server_name: String,
}

/// Ids arrive as JSON numbers in most events but as strings in reply
/// references, so both are accepted.
pub mod ids {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    use super::MessageId;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(MessageId),
        String(String),
    }

    fn parse<E: Error>(raw: NumberOrString) -> Result<MessageId, E> {
        match raw {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid message id: {s:?}"))),
        }
    }

    pub fn required<'de, D: Deserializer<'de>>(d: D) -> Result<MessageId, D::Error> {
        parse(NumberOrString::deserialize(d)?)
    }

    /// `null`, a missing field or an empty string all mean "no reference".
    pub fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<MessageId>, D::Error> {
        match Option::<NumberOrString>::deserialize(d)? {
            None => Ok(None),
            Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
            Some(raw) => parse(raw).map(Some),
        }
    }
}
