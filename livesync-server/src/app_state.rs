use std::sync::Arc;

use shared::config::server::Config;

use crate::{
    feed::ChangeHub,
    store::{InMemoryMessageStore, MessageStore},
};

// Application state that will be shared across all routes
#[derive(Clone, Debug)]
pub struct AppState {
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) hub: Arc<ChangeHub>,
    pub(crate) config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, config: Arc<Config>) -> Self {
        let hub = Arc::new(ChangeHub::new(config.feed.channel_capacity));
        Self { store, hub, config }
    }

    /// State backed by a process-local store; used without a database and in tests.
    #[must_use]
    pub fn in_memory(config: Arc<Config>) -> Self {
        Self::new(Arc::new(InMemoryMessageStore::new()), config)
    }
}
