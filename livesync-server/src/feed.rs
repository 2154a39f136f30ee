//! Per-conversation fan-out of committed changes to SSE subscribers.

use std::{collections::HashMap, sync::Arc};

use shared::models::{ChangeEvent, ItemId, PartitionKey};
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tracing::{debug, trace};

/// Fan-out hub keyed by conversation.
///
/// Each conversation gets its own bounded `broadcast` channel. A receiver that
/// falls more than `capacity` events behind observes `Lagged` and must resync.
///
/// Writers hold [`ChangeHub::write_lock`] for a message from the store
/// commit until its event is published, so the feed carries each message's
/// changes in commit order.
#[derive(Debug)]
pub struct ChangeHub {
    capacity: usize,
    channels: Mutex<HashMap<PartitionKey, broadcast::Sender<Arc<ChangeEvent>>>>,
    writers: Mutex<HashMap<ItemId, Arc<Mutex<()>>>>,
}

impl ChangeHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for exclusive write access to one message.
    pub async fn write_lock(&self, message_id: ItemId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut writers = self.writers.lock().await;
            writers.retain(|_, lock| Arc::strong_count(lock) > 1);
            writers.entry(message_id).or_default().clone()
        };
        trace!(%message_id, "waiting for message write lock");
        lock.lock_owned().await
    }

    pub async fn subscribe(&self, conversation_id: PartitionKey) -> FeedSubscription {
        let mut channels = self.channels.lock().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = channels
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        metrics::gauge!("livesync_feed_subscribers").increment(1.0);
        debug!(%conversation_id, "feed subscriber attached");
        FeedSubscription { receiver }
    }

    /// Delivers `event` to every live subscriber of its conversation and
    /// returns how many received it.
    pub async fn publish(&self, conversation_id: PartitionKey, event: ChangeEvent) -> usize {
        metrics::counter!("livesync_feed_events_total", "kind" => event.kind()).increment(1);

        let mut channels = self.channels.lock().await;
        let Some(sender) = channels.get(&conversation_id) else {
            trace!(%conversation_id, "no subscribers for change");
            return 0;
        };

        if let Ok(delivered) = sender.send(Arc::new(event)) {
            delivered
        } else {
            channels.remove(&conversation_id);
            0
        }
    }

    pub async fn subscriber_count(&self, conversation_id: PartitionKey) -> usize {
        self.channels
            .lock()
            .await
            .get(&conversation_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// Receiving side of one SSE connection.
#[derive(Debug)]
pub struct FeedSubscription {
    receiver: broadcast::Receiver<Arc<ChangeEvent>>,
}

impl FeedSubscription {
    /// # Errors
    /// Returns `Lagged` when events were dropped for this subscriber and
    /// `Closed` when the hub released the channel.
    pub async fn recv(&mut self) -> Result<Arc<ChangeEvent>, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        metrics::gauge!("livesync_feed_subscribers").decrement(1.0);
    }
}
