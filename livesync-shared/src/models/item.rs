use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Timestamp;

/// Identifier of a single collection item (a chat message).
pub type ItemId = Uuid;

/// Identifier scoping a collection to one conversation or team.
pub type PartitionKey = Uuid;

/// Role of the participant who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Mentor,
    Participant,
    Admin,
}

impl SenderRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mentor => "mentor",
            Self::Participant => "participant",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SenderRole {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "mentor" => Ok(Self::Mentor),
            "participant" => Ok(Self::Participant),
            "admin" => Ok(Self::Admin),
            _ => Err("invalid sender role"),
        }
    }
}

/// Denormalized profile fields carried alongside every message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SenderProfile {
    pub display_name: String,
    pub role: SenderRole,
}

/// Application data of a chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessagePayload {
    pub sender_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderProfile>,
    pub content: String,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub read: bool,
}

/// A single element of a synchronized collection.
///
/// Items are ordered by `(sequence_key, id)`; the `id` tie-break keeps the
/// order deterministic when two messages share a creation instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Item {
    pub id: Uuid,
    pub partition_key: Uuid,
    pub sequence_key: Timestamp,
    pub payload: MessagePayload,
}

impl Item {
    /// Composite key the collection is sorted by.
    #[must_use]
    pub const fn sort_key(&self) -> (Timestamp, ItemId) {
        (self.sequence_key, self.id)
    }

    /// Display name of the sender, falling back to the raw sender id.
    #[must_use]
    pub fn sender_label(&self) -> String {
        self.payload.sender.as_ref().map_or_else(
            || self.payload.sender_id.to_string(),
            |profile| profile.display_name.clone(),
        )
    }
}
