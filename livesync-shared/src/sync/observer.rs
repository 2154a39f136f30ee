use std::fmt::Debug;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error, warn};

use crate::models::{LifecycleState, MalformedEvent, PartitionKey, SyncError};

/// Observability collaborator notified of everything the synchronizer drops,
/// retries or transitions through.
pub trait SyncObserver: Send + Sync + Debug {
    fn malformed_event(&self, partition_key: PartitionKey, event: &MalformedEvent);

    fn fetch_failed(&self, partition_key: PartitionKey, error: &SyncError);

    /// `retry_in` is `None` when no further reconnect will be attempted.
    fn channel_failed(
        &self,
        partition_key: PartitionKey,
        error: &SyncError,
        retry_in: Option<Duration>,
    );

    fn state_changed(&self, partition_key: PartitionKey, from: LifecycleState, to: LifecycleState);
}

/// Default observer: a log line and a metric for every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn malformed_event(&self, partition_key: PartitionKey, event: &MalformedEvent) {
        warn!(
            %partition_key,
            reason = %event.reason,
            raw = event.raw.as_deref().unwrap_or_default(),
            "dropping malformed change event"
        );
        counter!("livesync_sync_malformed_events_total").increment(1);
    }

    fn fetch_failed(&self, partition_key: PartitionKey, error: &SyncError) {
        warn!(%partition_key, error = %error, "initial load failed");
        counter!("livesync_sync_fetch_failures_total", "code" => error.code()).increment(1);
    }

    fn channel_failed(
        &self,
        partition_key: PartitionKey,
        error: &SyncError,
        retry_in: Option<Duration>,
    ) {
        match retry_in {
            Some(delay) => {
                warn!(
                    %partition_key,
                    error = %error,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "change feed dropped; reconnecting"
                );
                counter!("livesync_sync_reconnects_total").increment(1);
            }
            None => {
                error!(%partition_key, error = %error, "change feed failed; giving up");
                counter!("livesync_sync_channel_failures_total", "code" => error.code())
                    .increment(1);
            }
        }
    }

    fn state_changed(&self, partition_key: PartitionKey, from: LifecycleState, to: LifecycleState) {
        debug!(%partition_key, %from, %to, "subscription state changed");
    }
}
