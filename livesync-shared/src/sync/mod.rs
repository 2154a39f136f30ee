//! # Live collection synchronizer
//!
//! Keeps an ordered, deduplicated view of a server-held collection by
//! combining a one-shot bulk load with a continuous change feed.

pub mod backoff;
pub mod feed;
pub mod lifecycle;
pub mod loader;
pub mod observer;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::{Backoff, SyncOptions};
pub use feed::{ChangeFeedClient, FeedDelivery, FeedSignal, FeedStream, SubscriptionHandle};
pub use lifecycle::LiveCollection;
pub use loader::{BulkLoader, Snapshot};
pub use observer::{SyncObserver, TracingObserver};
pub use reconciler::Reconciler;
