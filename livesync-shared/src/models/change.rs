use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::errors::MalformedEvent;
use super::item::{Item, ItemId, PartitionKey};

/// A single change published on a conversation's change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    #[serde(rename = "item.inserted")]
    Inserted { item: Item },
    #[serde(rename = "item.updated")]
    Updated { item: Item },
    #[serde(rename = "item.deleted")]
    Deleted {
        id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partition_key: Option<Uuid>,
    },
}

impl ChangeEvent {
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        match self {
            Self::Inserted { item } | Self::Updated { item } => item.id,
            Self::Deleted { id, .. } => *id,
        }
    }

    /// Partition the event targets, when the payload names one.
    #[must_use]
    pub const fn partition_key(&self) -> Option<PartitionKey> {
        match self {
            Self::Inserted { item } | Self::Updated { item } => Some(item.partition_key),
            Self::Deleted { partition_key, .. } => *partition_key,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
        }
    }

    /// Decode a wire payload, rejecting anything that cannot be applied.
    ///
    /// # Errors
    /// Returns [`MalformedEvent`] when the JSON does not decode or the event
    /// carries a nil identifier.
    pub fn parse(raw: &str) -> Result<Self, MalformedEvent> {
        let event: Self = serde_json::from_str(raw)
            .map_err(|err| MalformedEvent::new(err.to_string()).with_raw(raw))?;
        if event.item_id() == Uuid::nil() {
            return Err(MalformedEvent::new("missing id").with_raw(raw));
        }
        Ok(event)
    }
}

/// Error frame sent on the stream before the server ends it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StreamErrorEvent {
    pub code: String,
    pub message: String,
}

impl StreamErrorEvent {
    pub const LAGGED: &'static str = "lagged";

    #[must_use]
    pub fn lagged(skipped: u64) -> Self {
        Self {
            code: Self::LAGGED.to_string(),
            message: format!("subscriber fell behind by {skipped} events; reconnect and resync"),
        }
    }
}

/// Acknowledgement sent once a subscription is registered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StreamReadyEvent {
    pub conversation_id: Uuid,
}
