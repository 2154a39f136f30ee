use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{
    Item, ItemId, MessagePayload, PartitionKey, SenderProfile, SenderRole, Timestamp,
};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    InsertOutcome, MessageStore, NewMessage, StoreError, StoreResult, check_same_conversation,
};
use crate::db::bootstrap;

const COLUMNS: &str =
    "id, conversation_id, sender_id, sender_name, sender_role, content, edited, read, created_at";

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    sender_name: Option<String>,
    sender_role: Option<String>,
    content: String,
    edited: bool,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Item {
    fn from(row: MessageRow) -> Self {
        let sender = match (row.sender_name, row.sender_role.as_deref()) {
            (Some(display_name), Some(role)) => match SenderRole::try_from(role) {
                Ok(role) => Some(SenderProfile { display_name, role }),
                Err(_) => {
                    warn!(message_id = %row.id, role, "ignoring unknown sender role");
                    None
                }
            },
            _ => None,
        };

        Self {
            id: row.id,
            partition_key: row.conversation_id,
            sequence_key: Timestamp(row.created_at),
            payload: MessagePayload {
                sender_id: row.sender_id,
                sender,
                content: row.content,
                edited: row.edited,
                read: row.read,
            },
        }
    }
}

/// Postgres-backed store. `created_at` is assigned by the database.
#[derive(Debug, Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Item::from))
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(skip(self))]
    async fn list(
        &self,
        conversation_id: PartitionKey,
        limit: u32,
    ) -> StoreResult<(Vec<Item>, bool)> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_id = $1 \
             ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(conversation_id)
        .bind(i64::from(limit) + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut items: Vec<Item> = rows.into_iter().map(Item::from).collect();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let has_more = items.len() > limit;
        items.truncate(limit);
        debug!(count = items.len(), has_more, "listed messages");
        Ok((items, has_more))
    }

    #[instrument(skip(self, message), fields(conversation_id = %message.conversation_id))]
    async fn insert(&self, message: NewMessage) -> StoreResult<InsertOutcome> {
        let id = message.id.unwrap_or_else(Uuid::new_v4);
        let (sender_name, sender_role) = message.sender.map_or((None, None), |profile| {
            (Some(profile.display_name), Some(profile.role.as_str()))
        });

        let inserted = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (id, conversation_id, sender_id, sender_name, sender_role, content) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(sender_name)
        .bind(sender_role)
        .bind(&message.content)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Created(row.into()));
        }

        let existing = self.fetch_one(id).await?.ok_or(StoreError::NotFound(id))?;
        check_same_conversation(&existing, message.conversation_id)?;
        Ok(InsertOutcome::Existing(existing))
    }

    #[instrument(skip(self, content))]
    async fn update_content(&self, id: ItemId, content: &str) -> StoreResult<Item> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET content = $2, edited = TRUE WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?
        .map(Item::from)
        .ok_or(StoreError::NotFound(id))
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, id: ItemId) -> StoreResult<Item> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET read = TRUE WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Item::from)
        .ok_or(StoreError::NotFound(id))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ItemId) -> StoreResult<Item> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "DELETE FROM messages WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Item::from)
        .ok_or(StoreError::NotFound(id))
    }

    async fn ping(&self) -> StoreResult<()> {
        bootstrap::ensure_liveness(&self.pool).await?;
        Ok(())
    }
}
