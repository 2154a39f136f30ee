use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use shared::models::{PartitionKey, StreamErrorEvent, StreamReadyEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

use crate::{
    app_state::AppState,
    feed::FeedSubscription,
    http::{
        error::{ApiError, AppResult},
        problem::ProblemDetails,
    },
};

pub const READY_EVENT: &str = "ready";
pub const CHANGE_EVENT: &str = "change";
pub const ERROR_EVENT: &str = "error";
pub const PING_EVENT: &str = "ping";

fn json_event(name: &'static str, payload: &impl Serialize) -> Option<Event> {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to encode SSE payload");
            None
        }
    }
}

/// Pulls the next frame for one subscriber. A lagged subscriber gets a single
/// `error` frame and the stream ends so the client resyncs.
async fn next_frame(
    subscription: Option<FeedSubscription>,
) -> Option<(Result<Event, Infallible>, Option<FeedSubscription>)> {
    let mut subscription = subscription?;
    loop {
        match subscription.recv().await {
            Ok(change) => {
                if let Some(event) = json_event(CHANGE_EVENT, &*change) {
                    return Some((Ok(event), Some(subscription)));
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "feed subscriber lagged; closing stream");
                metrics::counter!("livesync_feed_lagged_total").increment(1);
                let event = json_event(ERROR_EVENT, &StreamErrorEvent::lagged(skipped))?;
                return Some((Ok(event), None));
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Live change feed for one conversation.
#[utoipa::path(
    get,
    path = "/api/stream/conversations/{conversation_id}",
    params(("conversation_id" = Uuid, Path, description = "Conversation to follow")),
    responses(
        (status = 200, description = "Server-sent events: ready, change, error, ping", content_type = "text/event-stream"),
        (status = 401, description = "Missing or invalid bearer token", body = ProblemDetails)
    ),
    tag = "Stream"
)]
#[instrument(skip(state))]
pub async fn stream_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<PartitionKey>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let ready = json_event(READY_EVENT, &StreamReadyEvent { conversation_id })
        .ok_or_else(|| ApiError::internal_server_error("failed to encode ready event"))?;

    let subscription = state.hub.subscribe(conversation_id).await;
    info!(%conversation_id, "change feed opened");

    let frames = stream::once(async move { Ok(ready) })
        .chain(stream::unfold(Some(subscription), next_frame));

    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.feed.heartbeat_seconds))
        .event(Event::default().event(PING_EVENT).data("{}"));

    Ok(Sse::new(frames).keep_alive(keepalive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ChangeHub;
    use shared::models::{ChangeEvent, Item, MessagePayload, Timestamp};
    use uuid::Uuid;

    fn deleted(id: u128) -> ChangeEvent {
        ChangeEvent::Deleted {
            id: Uuid::from_u128(id),
            partition_key: None,
        }
    }

    #[tokio::test]
    async fn change_frames_keep_the_subscription() {
        let hub = ChangeHub::new(4);
        let key = Uuid::from_u128(1);
        let subscription = hub.subscribe(key).await;
        hub.publish(
            key,
            ChangeEvent::Inserted {
                item: Item {
                    id: Uuid::from_u128(2),
                    partition_key: key,
                    sequence_key: Timestamp::now(),
                    payload: MessagePayload {
                        sender_id: Uuid::nil(),
                        sender: None,
                        content: "hi".into(),
                        edited: false,
                        read: false,
                    },
                },
            },
        )
        .await;

        let (frame, next) = next_frame(Some(subscription)).await.unwrap();
        assert!(frame.is_ok());
        assert!(next.is_some());
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_final_error_frame() {
        let hub = ChangeHub::new(1);
        let key = Uuid::from_u128(1);
        let subscription = hub.subscribe(key).await;
        for id in 0..3 {
            hub.publish(key, deleted(id)).await;
        }

        let (frame, next) = next_frame(Some(subscription)).await.unwrap();
        assert!(frame.is_ok());
        assert!(next.is_none(), "stream must end after a lag");
        assert!(next_frame(None).await.is_none());
    }
}
