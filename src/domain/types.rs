use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

pub const TEMP_MESSAGE_ID_PREFIX: &str = "temp-";

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh client-side id for a message the server has not acknowledged yet.
    pub fn temporary() -> Self {
        Self(format!("{TEMP_MESSAGE_ID_PREFIX}{}", Uuid::now_v7()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_MESSAGE_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub deleted: bool,
    pub edited: bool,
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender_id == user
    }

    /// Soft/hard delete as seen locally: content is blanked, the row stays in place.
    pub fn mark_deleted(&mut self) {
        self.content.clear();
        self.deleted = true;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Participant {
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant: Participant,
    pub unread: u32,
}

impl Conversation {
    pub fn title(&self) -> &str {
        let name = self.participant.name.trim();
        if name.is_empty() { self.id.as_str() } else { name }
    }
}
