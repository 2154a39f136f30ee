//! Fixtures shared by the synchronizer tests.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use super::observer::SyncObserver;
use crate::models::{
    Item, LifecycleState, MalformedEvent, MessagePayload, PartitionKey, SyncError, Timestamp,
};

pub fn key(n: u128) -> PartitionKey {
    Uuid::from_u128(0xAAAA_0000 + n)
}

/// Item `id` in partition `partition`, created `second` seconds into 2025.
pub fn item_in(partition: PartitionKey, id: u128, second: i64, content: &str) -> Item {
    Item {
        id: Uuid::from_u128(id),
        partition_key: partition,
        sequence_key: Timestamp(Utc.timestamp_opt(1_735_689_600 + second, 0).unwrap()),
        payload: MessagePayload {
            sender_id: Uuid::from_u128(42),
            sender: None,
            content: content.to_string(),
            edited: false,
            read: false,
        },
    }
}

pub fn ids(items: &[Item]) -> Vec<u128> {
    items.iter().map(|item| item.id.as_u128()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Malformed(String),
    Fetch(SyncError),
    Channel(SyncError, Option<Duration>),
    State(LifecycleState, LifecycleState),
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    reports: Mutex<Vec<Report>>,
}

impl RecordingObserver {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn malformed_count(&self) -> usize {
        self.reports()
            .iter()
            .filter(|report| matches!(report, Report::Malformed(_)))
            .count()
    }

    pub fn retry_delays(&self) -> Vec<Option<Duration>> {
        self.reports()
            .into_iter()
            .filter_map(|report| match report {
                Report::Channel(_, delay) => Some(delay),
                _ => None,
            })
            .collect()
    }

    fn push(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }
}

impl SyncObserver for RecordingObserver {
    fn malformed_event(&self, _partition_key: PartitionKey, event: &MalformedEvent) {
        self.push(Report::Malformed(event.reason.clone()));
    }

    fn fetch_failed(&self, _partition_key: PartitionKey, error: &SyncError) {
        self.push(Report::Fetch(error.clone()));
    }

    fn channel_failed(
        &self,
        _partition_key: PartitionKey,
        error: &SyncError,
        retry_in: Option<Duration>,
    ) {
        self.push(Report::Channel(error.clone(), retry_in));
    }

    fn state_changed(&self, _partition_key: PartitionKey, from: LifecycleState, to: LifecycleState) {
        self.push(Report::State(from, to));
    }
}
