//! Binds a [`Reconciler`] and a change-feed subscription to the lifecycle
//! of one active partition.
//!
//! All state lives in a single driver task. Consumers talk to it through
//! [`LiveCollection`] commands and observe it through a `watch` channel of
//! read-only [`CollectionSnapshot`]s. Loads and feed signals are tagged with
//! the generation and connection they were issued for, and anything stale is
//! discarded when it arrives.

use std::future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use super::backoff::{Backoff, SyncOptions};
use super::feed::{ChangeFeedClient, FeedDelivery, FeedSignal, SubscriptionHandle};
use super::loader::{BulkLoader, Snapshot};
use super::observer::SyncObserver;
use super::reconciler::Reconciler;
use crate::models::{
    CollectionSnapshot, Item, ItemId, LifecycleState, PartitionKey, SyncError, SyncStatus,
};

#[derive(Debug)]
enum Command {
    Activate(PartitionKey),
    Deactivate,
    RetryFetch,
    InsertOptimistic(Item),
    DiscardOptimistic(ItemId),
    Shutdown,
}

#[derive(Debug)]
enum Completion {
    Loaded {
        generation: u64,
        load: u64,
        result: Result<Snapshot, SyncError>,
    },
    Feed(FeedDelivery),
}

impl From<FeedDelivery> for Completion {
    fn from(delivery: FeedDelivery) -> Self {
        Self::Feed(delivery)
    }
}

/// Consumer handle on a synchronized collection.
///
/// Dropping the handle stops the driver and closes any open subscription.
#[derive(Debug)]
pub struct LiveCollection {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<CollectionSnapshot>,
    driver: JoinHandle<()>,
}

impl LiveCollection {
    /// Starts the driver task on the current runtime.
    pub fn spawn(
        loader: Arc<dyn BulkLoader>,
        feed: Arc<dyn ChangeFeedClient>,
        options: SyncOptions,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(CollectionSnapshot::default());

        let driver = Driver {
            loader,
            feed,
            options,
            observer,
            commands: commands_rx,
            completions_tx,
            completions: completions_rx,
            snapshots: snapshots_tx,
            generation: 0,
            connection: 0,
            load: 0,
            active: None,
        };

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// Makes `partition_key` the active partition and returns the snapshot
    /// stream. Re-subscribing to the active key is a no-op unless the view
    /// is frozen in the error state.
    pub fn subscribe(&self, partition_key: PartitionKey) -> watch::Receiver<CollectionSnapshot> {
        self.send(Command::Activate(partition_key));
        self.snapshots.clone()
    }

    /// Tears down the active partition, if any.
    pub fn unsubscribe(&self) {
        self.send(Command::Deactivate);
    }

    /// Reloads the snapshot after a failed bulk load.
    pub fn retry_fetch(&self) {
        self.send(Command::RetryFetch);
    }

    /// Renders a locally created item until the feed confirms it.
    pub fn insert_optimistic(&self, item: Item) {
        self.send(Command::InsertOptimistic(item));
    }

    /// Removes an optimistic item after the server rejected its write.
    pub fn discard_optimistic(&self, id: ItemId) {
        self.send(Command::DiscardOptimistic(id));
    }

    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<CollectionSnapshot> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn current(&self) -> CollectionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stops the driver and waits for it to release its subscription.
    pub async fn shutdown(self) {
        self.send(Command::Shutdown);
        if let Err(err) = self.driver.await {
            warn!(error = %err, "live collection driver did not stop cleanly");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("live collection driver has already stopped");
        }
    }
}

/// Aborts the load task when dropped.
#[derive(Debug)]
struct LoadTask {
    id: u64,
    handle: JoinHandle<()>,
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
struct ActiveKey {
    generation: u64,
    reconciler: Reconciler,
    state: LifecycleState,
    seed_resolved: bool,
    channel_ready: bool,
    /// First connection of this generation; a later `Ready` means the feed
    /// came back after a gap and the view must resync.
    initial_connection: u64,
    subscription: Option<SubscriptionHandle>,
    load: Option<LoadTask>,
    reconnect_at: Option<Instant>,
    backoff: Backoff,
}

impl ActiveKey {
    fn partition_key(&self) -> PartitionKey {
        self.reconciler.partition_key()
    }
}

struct Driver {
    loader: Arc<dyn BulkLoader>,
    feed: Arc<dyn ChangeFeedClient>,
    options: SyncOptions,
    observer: Arc<dyn SyncObserver>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    snapshots: watch::Sender<CollectionSnapshot>,
    generation: u64,
    connection: u64,
    load: u64,
    active: Option<ActiveKey>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let reconnect_at = self.active.as_ref().and_then(|active| active.reconnect_at);

            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                () = wait_until(reconnect_at) => self.reconnect(),
            }
        }

        self.teardown();
        debug!("live collection driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Activate(partition_key) => self.activate(partition_key),
            Command::Deactivate => {
                self.teardown();
                self.publish_idle();
            }
            Command::RetryFetch => self.retry_fetch(),
            Command::InsertOptimistic(item) => {
                let changed = self.active.as_mut().is_some_and(|active| {
                    active.state != LifecycleState::Error
                        && active.reconciler.insert_optimistic(item)
                });
                if changed {
                    self.publish();
                }
            }
            Command::DiscardOptimistic(id) => {
                let changed = self
                    .active
                    .as_mut()
                    .is_some_and(|active| active.reconciler.discard_optimistic(id));
                if changed {
                    debug!(%id, "withdrew optimistic item");
                    self.publish();
                }
            }
            Command::Shutdown => {}
        }
    }

    fn activate(&mut self, partition_key: PartitionKey) {
        if let Some(active) = &self.active
            && active.partition_key() == partition_key
            && active.state != LifecycleState::Error
        {
            trace!(%partition_key, "partition already active");
            return;
        }

        self.teardown();
        self.generation += 1;
        info!(%partition_key, generation = self.generation, "activating partition");

        self.active = Some(ActiveKey {
            generation: self.generation,
            reconciler: Reconciler::new(partition_key, self.observer.clone()),
            state: LifecycleState::Idle,
            seed_resolved: false,
            channel_ready: false,
            initial_connection: self.connection + 1,
            subscription: None,
            load: None,
            reconnect_at: None,
            backoff: Backoff::new(self.options),
        });

        self.transition(LifecycleState::Opening);
        self.start_load();
        self.open_channel();
        self.publish();
    }

    /// Closes the subscription and abandons any in-flight load.
    fn teardown(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let partition_key = active.partition_key();
        if let Some(subscription) = active.subscription.take() {
            subscription.close();
        }
        active.load = None;
        if active.state != LifecycleState::Idle {
            self.observer
                .state_changed(partition_key, active.state, LifecycleState::Idle);
        }
        debug!(%partition_key, generation = active.generation, "partition deactivated");
    }

    fn retry_fetch(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state == LifecycleState::Error {
            debug!(partition_key = %active.partition_key(), "view is frozen; resubscribe to restart");
            return;
        }
        if active.reconciler.status() == SyncStatus::Ready {
            active.reconciler.begin_resync();
        } else {
            active.reconciler.mark_loading();
        }
        self.start_load();
        self.publish();
    }

    fn start_load(&mut self) {
        self.load += 1;
        let load = self.load;
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let loader = self.loader.clone();
        let sink = self.completions_tx.clone();
        let generation = active.generation;
        let partition_key = active.partition_key();

        active.seed_resolved = false;
        active.load = Some(LoadTask {
            id: load,
            handle: tokio::spawn(async move {
                let result = loader.load(partition_key).await;
                let delivered = sink
                    .send(Completion::Loaded {
                        generation,
                        load,
                        result,
                    })
                    .is_ok();
                if !delivered {
                    trace!(%partition_key, generation, load, "driver gone before load finished");
                }
            }),
        });
    }

    fn open_channel(&mut self) {
        self.connection += 1;
        let connection = self.connection;
        let Some(active) = self.active.as_mut() else {
            return;
        };

        active.channel_ready = false;
        active.reconnect_at = None;
        active.subscription = Some(SubscriptionHandle::spawn(
            self.feed.clone(),
            active.partition_key(),
            active.generation,
            connection,
            self.completions_tx.clone(),
        ));
    }

    fn reconnect(&mut self) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.reconnect_at.is_some())
        {
            self.open_channel();
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded {
                generation,
                load,
                result,
            } => self.on_loaded(generation, load, result),
            Completion::Feed(delivery) => self.on_feed(delivery),
        }
    }

    fn on_loaded(&mut self, generation: u64, load: u64, result: Result<Snapshot, SyncError>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.generation != generation || active.load.as_ref().is_none_or(|task| task.id != load)
        {
            trace!(generation, load, "discarding stale load result");
            return;
        }

        active.load = None;
        active.seed_resolved = true;

        match result {
            Ok(snapshot) => {
                debug!(
                    partition_key = %active.partition_key(),
                    count = snapshot.items.len(),
                    complete = snapshot.complete,
                    "snapshot loaded"
                );
                active.reconciler.seed(snapshot);
            }
            Err(error) if error.is_fatal() => {
                self.fail(error);
                return;
            }
            Err(error) => {
                self.observer.fetch_failed(active.partition_key(), &error);
                active.reconciler.mark_error(error);
            }
        }

        self.maybe_live();
        self.publish();
    }

    fn on_feed(&mut self, delivery: FeedDelivery) {
        let FeedDelivery {
            generation,
            connection,
            signal,
        } = delivery;

        let Some(active) = self.active.as_mut() else {
            return;
        };
        let current = active.generation == generation
            && active
                .subscription
                .as_ref()
                .is_some_and(|subscription| subscription.connection() == connection);
        if !current {
            trace!(generation, connection, "discarding stale feed signal");
            return;
        }

        match signal {
            FeedSignal::Ready => {
                active.channel_ready = true;
                active.backoff.reset();
                if connection != active.initial_connection {
                    debug!(partition_key = %active.partition_key(), "feed restored; resyncing");
                    active.reconciler.begin_resync();
                    self.start_load();
                }
                self.maybe_live();
                self.publish();
            }
            FeedSignal::Event(event) => {
                if active.reconciler.apply_event(event) {
                    self.publish();
                }
            }
            FeedSignal::Malformed(event) => active.reconciler.report_malformed(event),
            FeedSignal::Error(error) => self.on_channel_error(error),
        }
    }

    fn on_channel_error(&mut self, error: SyncError) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.subscription = None;
        active.channel_ready = false;

        if error.is_fatal() {
            self.fail(error);
            return;
        }

        let partition_key = active.partition_key();
        let Some(delay) = active.backoff.next_delay() else {
            self.observer.channel_failed(partition_key, &error, None);
            self.fail(error);
            return;
        };

        self.observer
            .channel_failed(partition_key, &error, Some(delay));
        active.reconnect_at = Some(Instant::now() + delay);
        self.transition(LifecycleState::Opening);
        self.publish();
    }

    /// Freezes the view at its last known-good items.
    fn fail(&mut self, error: SyncError) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        warn!(partition_key = %active.partition_key(), error = %error, "live collection failed");
        if let Some(subscription) = active.subscription.take() {
            subscription.close();
        }
        active.load = None;
        active.reconnect_at = None;
        active.reconciler.mark_error(error);
        self.transition(LifecycleState::Error);
        self.publish();
    }

    fn maybe_live(&mut self) {
        let ready = self.active.as_ref().is_some_and(|active| {
            active.state == LifecycleState::Opening && active.seed_resolved && active.channel_ready
        });
        if ready {
            self.transition(LifecycleState::Live);
        }
    }

    fn transition(&mut self, to: LifecycleState) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state == to {
            return;
        }
        self.observer
            .state_changed(active.partition_key(), active.state, to);
        active.state = to;
    }

    fn publish(&self) {
        let Some(active) = &self.active else {
            return;
        };
        self.snapshots.send_replace(CollectionSnapshot {
            partition_key: Some(active.partition_key()),
            generation: active.generation,
            state: active.state,
            status: active.reconciler.status(),
            items: active.reconciler.snapshot(),
            truncated: active.reconciler.is_truncated(),
            error: active.reconciler.error().cloned(),
        });
    }

    fn publish_idle(&self) {
        self.snapshots.send_replace(CollectionSnapshot {
            generation: self.generation,
            ..CollectionSnapshot::default()
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
