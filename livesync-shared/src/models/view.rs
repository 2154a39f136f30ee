use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::errors::SyncError;
use super::item::{Item, PartitionKey};

/// Readiness of the reconciled collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Error,
}

/// Subscription lifecycle of the active partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Idle,
    Opening,
    Live,
    Error,
}

impl LifecycleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Live => "live",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only projection handed to the rendering layer.
///
/// `generation` increases every time a different partition is activated, so
/// a consumer can tell a fresh view from an update of the one it holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSnapshot {
    pub partition_key: Option<PartitionKey>,
    pub generation: u64,
    pub state: LifecycleState,
    pub status: SyncStatus,
    pub items: Arc<[Item]>,
    /// Older messages exist on the server but were cut by the page limit.
    pub truncated: bool,
    pub error: Option<SyncError>,
}

impl CollectionSnapshot {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == SyncStatus::Ready
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_idle_and_empty() {
        let snapshot = CollectionSnapshot::default();
        assert_eq!(snapshot.state, LifecycleState::Idle);
        assert_eq!(snapshot.status, SyncStatus::Uninitialized);
        assert!(snapshot.is_empty());
        assert!(!snapshot.is_ready());
        assert!(snapshot.partition_key.is_none());
        assert!(!snapshot.truncated);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SyncStatus::Ready).unwrap(), "\"ready\"");
        assert_eq!(LifecycleState::Opening.to_string(), "opening");
    }
}
