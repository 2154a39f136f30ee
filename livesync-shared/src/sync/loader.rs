use async_trait::async_trait;

use crate::models::{Item, PartitionKey, SyncError};

/// Result of one bulk load.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Ascending by `sequence_key`.
    pub items: Vec<Item>,
    /// `false` when the server cut the result at the page limit and only the
    /// oldest messages are present.
    pub complete: bool,
}

impl Snapshot {
    #[must_use]
    pub const fn complete(items: Vec<Item>) -> Self {
        Self {
            items,
            complete: true,
        }
    }

    #[must_use]
    pub const fn partial(items: Vec<Item>) -> Self {
        Self {
            items,
            complete: false,
        }
    }
}

impl From<Vec<Item>> for Snapshot {
    fn from(items: Vec<Item>) -> Self {
        Self::complete(items)
    }
}

/// Fetches the current snapshot of a partition.
///
/// Implementations return items ascending by `sequence_key` and must be safe
/// to call repeatedly. A page-limited result is marked partial and merged as
/// the currently known prefix.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BulkLoader: Send + Sync {
    async fn load(&self, partition_key: PartitionKey) -> Result<Snapshot, SyncError>;
}
