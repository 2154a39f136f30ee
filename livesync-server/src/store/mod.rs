//! Message persistence behind the HTTP handlers.
//!
//! Handlers talk to [`MessageStore`]; the server picks [`PgMessageStore`] when a
//! database URL is configured and [`InMemoryMessageStore`] otherwise.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use shared::models::{Item, ItemId, PartitionKey, SenderProfile};
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryMessageStore;
pub use postgres::PgMessageStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(ItemId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Message about to be written. `id` is client supplied when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: Option<Uuid>,
    pub conversation_id: PartitionKey,
    pub sender_id: Uuid,
    pub sender: Option<SenderProfile>,
    pub content: String,
}

/// Result of an insert: either a fresh row or the row already stored under the
/// same client-supplied id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(Item),
    Existing(Item),
}

impl InsertOutcome {
    #[must_use]
    pub const fn item(&self) -> &Item {
        match self {
            Self::Created(item) | Self::Existing(item) => item,
        }
    }

    #[must_use]
    pub fn into_item(self) -> Item {
        match self {
            Self::Created(item) | Self::Existing(item) => item,
        }
    }

    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Oldest-first prefix of a conversation, plus whether more rows exist.
    async fn list(&self, conversation_id: PartitionKey, limit: u32)
    -> StoreResult<(Vec<Item>, bool)>;

    async fn insert(&self, message: NewMessage) -> StoreResult<InsertOutcome>;

    async fn update_content(&self, id: ItemId, content: &str) -> StoreResult<Item>;

    async fn mark_read(&self, id: ItemId) -> StoreResult<Item>;

    /// Removes a message and returns the row as it was before deletion.
    async fn delete(&self, id: ItemId) -> StoreResult<Item>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Rejects an insert whose client-supplied id already lives in another
/// conversation.
pub(crate) fn check_same_conversation(existing: &Item, requested: PartitionKey) -> StoreResult<()> {
    if existing.partition_key == requested {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "message {} belongs to another conversation",
            existing.id
        )))
    }
}
