use std::collections::HashMap;

use async_trait::async_trait;
use shared::models::{Item, ItemId, MessagePayload, PartitionKey, Timestamp};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    InsertOutcome, MessageStore, NewMessage, StoreError, StoreResult, check_same_conversation,
};

/// Process-local store used when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<ItemId, Item>>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: ItemId, change: F) -> StoreResult<Item>
    where
        F: FnOnce(&mut MessagePayload) + Send,
    {
        let mut messages = self.messages.write().await;
        let item = messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        change(&mut item.payload);
        Ok(item.clone())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn list(
        &self,
        conversation_id: PartitionKey,
        limit: u32,
    ) -> StoreResult<(Vec<Item>, bool)> {
        let messages = self.messages.read().await;
        let mut items: Vec<Item> = messages
            .values()
            .filter(|item| item.partition_key == conversation_id)
            .cloned()
            .collect();
        items.sort_by_key(Item::sort_key);

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let has_more = items.len() > limit;
        items.truncate(limit);
        Ok((items, has_more))
    }

    async fn insert(&self, message: NewMessage) -> StoreResult<InsertOutcome> {
        let mut messages = self.messages.write().await;
        let id = message.id.unwrap_or_else(Uuid::new_v4);

        if let Some(existing) = messages.get(&id) {
            check_same_conversation(existing, message.conversation_id)?;
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let item = Item {
            id,
            partition_key: message.conversation_id,
            sequence_key: Timestamp::now(),
            payload: MessagePayload {
                sender_id: message.sender_id,
                sender: message.sender,
                content: message.content,
                edited: false,
                read: false,
            },
        };
        messages.insert(id, item.clone());
        Ok(InsertOutcome::Created(item))
    }

    async fn update_content(&self, id: ItemId, content: &str) -> StoreResult<Item> {
        let content = content.to_owned();
        self.modify(id, move |payload| {
            payload.content = content;
            payload.edited = true;
        })
        .await
    }

    async fn mark_read(&self, id: ItemId) -> StoreResult<Item> {
        self.modify(id, |payload| payload.read = true).await
    }

    async fn delete(&self, id: ItemId) -> StoreResult<Item> {
        self.messages
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound(id))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
