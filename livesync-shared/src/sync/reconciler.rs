//! Merges a bulk snapshot with live change events into one ordered,
//! deduplicated collection.
//!
//! Inserts of a known id behave as updates and updates of an unknown id
//! behave as inserts, so the outcome does not depend on whether the snapshot
//! or the event arrived first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::loader::Snapshot;
use super::observer::SyncObserver;
use crate::models::{
    ChangeEvent, Item, ItemId, MalformedEvent, PartitionKey, SyncError, SyncStatus, Timestamp,
};

/// Where the current copy of an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Seed,
    Live,
    Optimistic,
}

#[derive(Debug, Clone)]
struct Entry {
    item: Item,
    origin: Origin,
}

/// Owned collection state for a single partition.
#[derive(Debug)]
pub struct Reconciler {
    partition_key: PartitionKey,
    /// Sorted by `(sequence_key, id)`.
    entries: Vec<Entry>,
    index: HashMap<ItemId, Timestamp>,
    /// Ids deleted by live events while a seed is outstanding.
    tombstones: HashSet<ItemId>,
    /// When the outstanding reload was requested.
    load_started: Option<Timestamp>,
    truncated: bool,
    status: SyncStatus,
    error: Option<SyncError>,
    observer: Arc<dyn SyncObserver>,
}

impl Reconciler {
    #[must_use]
    pub fn new(partition_key: PartitionKey, observer: Arc<dyn SyncObserver>) -> Self {
        Self {
            partition_key,
            entries: Vec::new(),
            index: HashMap::new(),
            tombstones: HashSet::new(),
            load_started: None,
            truncated: false,
            status: SyncStatus::Uninitialized,
            error: None,
            observer,
        }
    }

    #[must_use]
    pub const fn partition_key(&self) -> PartitionKey {
        self.partition_key
    }

    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        self.status
    }

    #[must_use]
    pub const fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// Whether the last snapshot stopped at the page limit.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    /// Items in display order.
    pub fn items(&self) -> impl ExactSizeIterator<Item = &Item> {
        self.entries.iter().map(|entry| &entry.item)
    }

    /// Copies the items into a shareable read-only slice.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Item]> {
        self.items().cloned().collect()
    }

    /// Merges a bulk snapshot into the collection.
    ///
    /// Rejected (returns `false`) once the view is `Ready`; call
    /// [`Reconciler::begin_resync`] first. Items also delivered live keep the
    /// copy with the greater `sequence_key`, ties keep the live copy.
    ///
    /// A complete snapshot is authoritative: seeded entries missing from it
    /// are dropped, and so are optimistic entries created before the reload
    /// was requested. A partial snapshot only covers a prefix, so seeded
    /// entries past its last item are left alone.
    pub fn seed(&mut self, snapshot: impl Into<Snapshot>) -> bool {
        if self.status == SyncStatus::Ready {
            debug!(partition_key = %self.partition_key, "ignoring seed for a ready view");
            return false;
        }

        let Snapshot { items, complete } = snapshot.into();
        let load_started = self.load_started.take();
        let mut seen = HashSet::with_capacity(items.len());
        let mut upper: Option<(Timestamp, ItemId)> = None;

        for item in items {
            if item.partition_key != self.partition_key {
                self.report_malformed(MalformedEvent::new(format!(
                    "snapshot item {} belongs to partition {}",
                    item.id, item.partition_key
                )));
                continue;
            }
            if self.tombstones.contains(&item.id) {
                trace!(id = %item.id, "skipping seeded item deleted since the load began");
                continue;
            }

            seen.insert(item.id);
            upper = upper.max(Some(item.sort_key()));

            let keep_existing = self.position(item.id).is_some_and(|pos| {
                let existing = &self.entries[pos];
                existing.origin == Origin::Live
                    && existing.item.sequence_key >= item.sequence_key
            });
            if !keep_existing {
                self.upsert(item, Origin::Seed);
            }
        }

        let stale: Vec<ItemId> = self
            .entries
            .iter()
            .filter(|entry| !seen.contains(&entry.item.id))
            .filter(|entry| match entry.origin {
                Origin::Seed => {
                    complete || upper.is_none_or(|upper| entry.item.sort_key() <= upper)
                }
                Origin::Optimistic => {
                    complete && load_started.is_some_and(|at| entry.item.sequence_key < at)
                }
                Origin::Live => false,
            })
            .map(|entry| entry.item.id)
            .collect();
        for id in stale {
            trace!(%id, "dropping entry missing from the snapshot");
            self.remove(id);
        }

        if !complete {
            debug!(partition_key = %self.partition_key, "snapshot stops at the page limit");
        }
        self.truncated = !complete;
        self.tombstones.clear();
        self.status = SyncStatus::Ready;
        self.error = None;
        true
    }

    /// Re-opens the view for a fresh seed after the feed was interrupted.
    ///
    /// Live entries are demoted to seeded ones so the next snapshot can
    /// drop anything deleted while the feed was down.
    pub fn begin_resync(&mut self) {
        for entry in &mut self.entries {
            if entry.origin == Origin::Live {
                entry.origin = Origin::Seed;
            }
        }
        self.tombstones.clear();
        self.load_started = Some(Timestamp::now());
        self.status = SyncStatus::Loading;
    }

    /// Applies one change event. Returns whether the collection changed.
    pub fn apply_event(&mut self, event: ChangeEvent) -> bool {
        if let Some(partition_key) = event.partition_key()
            && partition_key != self.partition_key
        {
            self.report_malformed(MalformedEvent::new(format!(
                "{} event for {} targets partition {partition_key}",
                event.kind(),
                event.item_id()
            )));
            return false;
        }

        match event {
            ChangeEvent::Inserted { item } | ChangeEvent::Updated { item } => {
                self.tombstones.remove(&item.id);
                self.upsert(item, Origin::Live);
                true
            }
            ChangeEvent::Deleted { id, .. } => {
                if self.status != SyncStatus::Ready {
                    self.tombstones.insert(id);
                }
                self.remove(id).is_some()
            }
        }
    }

    /// Shows a locally created item before the server confirms it.
    ///
    /// No-op when the id is already present or the item belongs elsewhere.
    pub fn insert_optimistic(&mut self, item: Item) -> bool {
        if item.partition_key != self.partition_key || self.contains(item.id) {
            return false;
        }
        self.insert_sorted(Entry {
            item,
            origin: Origin::Optimistic,
        });
        true
    }

    /// Withdraws an optimistic entry whose write was rejected.
    ///
    /// Entries already confirmed by a snapshot or the feed are kept.
    pub fn discard_optimistic(&mut self, id: ItemId) -> bool {
        let unconfirmed = self
            .position(id)
            .is_some_and(|pos| self.entries[pos].origin == Origin::Optimistic);
        if unconfirmed {
            self.remove(id);
        }
        unconfirmed
    }

    pub fn report_malformed(&self, event: MalformedEvent) {
        self.observer.malformed_event(self.partition_key, &event);
    }

    pub fn mark_loading(&mut self) {
        if self.status != SyncStatus::Ready {
            self.status = SyncStatus::Loading;
            self.error = None;
            self.load_started = Some(Timestamp::now());
        }
    }

    pub fn mark_error(&mut self, error: SyncError) {
        self.status = SyncStatus::Error;
        self.error = Some(error);
    }

    fn position(&self, id: ItemId) -> Option<usize> {
        let sequence_key = *self.index.get(&id)?;
        self.entries
            .binary_search_by(|entry| entry.item.sort_key().cmp(&(sequence_key, id)))
            .ok()
    }

    fn insert_sorted(&mut self, entry: Entry) {
        let key = entry.item.sort_key();
        let pos = self
            .entries
            .binary_search_by(|probe| probe.item.sort_key().cmp(&key))
            .unwrap_or_else(|pos| pos);
        self.index.insert(entry.item.id, entry.item.sequence_key);
        self.entries.insert(pos, entry);
    }

    fn upsert(&mut self, item: Item, origin: Origin) {
        match self.position(item.id) {
            Some(pos) if self.entries[pos].item.sequence_key == item.sequence_key => {
                self.entries[pos] = Entry { item, origin };
            }
            Some(_) => {
                self.remove(item.id);
                self.insert_sorted(Entry { item, origin });
            }
            None => self.insert_sorted(Entry { item, origin }),
        }
    }

    fn remove(&mut self, id: ItemId) -> Option<Item> {
        let pos = self.position(id)?;
        self.index.remove(&id);
        Some(self.entries.remove(pos).item)
    }
}
