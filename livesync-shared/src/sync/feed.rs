use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::models::{ChangeEvent, ChannelError, MalformedEvent, PartitionKey, SyncError};

/// One item delivered by an open change-feed subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    /// The server acknowledged the subscription.
    Ready,
    Event(ChangeEvent),
    /// A frame arrived that could not be decoded.
    Malformed(MalformedEvent),
    /// The subscription failed; nothing follows an error.
    Error(SyncError),
}

pub type FeedStream = BoxStream<'static, FeedSignal>;

/// Opens change-feed subscriptions filtered by partition.
#[async_trait]
pub trait ChangeFeedClient: Send + Sync {
    /// Connects and returns the signal stream. Dropping the stream closes
    /// the underlying connection.
    async fn open(&self, partition_key: PartitionKey) -> Result<FeedStream, SyncError>;
}

/// A feed signal tagged with the subscription it came from.
#[derive(Debug)]
pub struct FeedDelivery {
    pub generation: u64,
    pub connection: u64,
    pub signal: FeedSignal,
}

/// Cancellable handle on a running subscription.
///
/// Closing (or dropping) the handle stops the pump before it can deliver
/// anything else.
#[derive(Debug)]
pub struct SubscriptionHandle {
    partition_key: PartitionKey,
    generation: u64,
    connection: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Spawns a pump that opens the feed and forwards every signal to `sink`.
    pub fn spawn<T>(
        client: Arc<dyn ChangeFeedClient>,
        partition_key: PartitionKey,
        generation: u64,
        connection: u64,
        sink: mpsc::UnboundedSender<T>,
    ) -> Self
    where
        T: From<FeedDelivery> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(pump(
            client,
            partition_key,
            generation,
            connection,
            token.clone(),
            sink,
        ));
        Self {
            partition_key,
            generation,
            connection,
            token,
            task,
        }
    }

    #[must_use]
    pub const fn partition_key(&self) -> PartitionKey {
        self.partition_key
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn connection(&self) -> u64 {
        self.connection
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn close(self) {
        debug!(
            partition_key = %self.partition_key,
            generation = self.generation,
            connection = self.connection,
            "closing change feed subscription"
        );
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}

async fn pump<T>(
    client: Arc<dyn ChangeFeedClient>,
    partition_key: PartitionKey,
    generation: u64,
    connection: u64,
    token: CancellationToken,
    sink: mpsc::UnboundedSender<T>,
) where
    T: From<FeedDelivery> + Send + 'static,
{
    let deliver = |signal: FeedSignal| {
        if token.is_cancelled() {
            return false;
        }
        sink.send(T::from(FeedDelivery {
            generation,
            connection,
            signal,
        }))
        .is_ok()
    };

    let opened = tokio::select! {
        biased;
        () = token.cancelled() => return,
        opened = client.open(partition_key) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(error) => {
            deliver(FeedSignal::Error(error));
            return;
        }
    };

    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => return,
            next = stream.next() => next,
        };

        let signal = next.unwrap_or(FeedSignal::Error(SyncError::Channel(ChannelError::Ended)));
        let terminal = matches!(signal, FeedSignal::Error(_));
        trace!(%partition_key, connection, terminal, "feed signal");

        if !deliver(signal) || terminal {
            return;
        }
    }
}
