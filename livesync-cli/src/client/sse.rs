//! Server-sent events transport for the change feed.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{StreamExt, stream, stream::BoxStream};
use reqwest::header::ACCEPT;
use shared::{
    models::{
        ChangeEvent, ChannelError, FetchError, MalformedEvent, PartitionKey, StreamErrorEvent,
        SyncError,
    },
    sync::{ChangeFeedClient, FeedSignal, FeedStream},
};
use tracing::{debug, trace};

use super::http::{ApiClient, check_status};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental decoder: feed it byte chunks as they arrive and collect the
/// frames completed so far. Lines may be split across chunks at any byte.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => trace!(field, "ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Translates a frame into a feed signal; heartbeats and unknown events yield `None`.
#[must_use]
pub fn frame_to_signal(frame: SseFrame) -> Option<FeedSignal> {
    match frame.event.as_str() {
        "ready" => Some(FeedSignal::Ready),
        "change" => Some(match ChangeEvent::parse(&frame.data) {
            Ok(event) => FeedSignal::Event(event),
            Err(malformed) => FeedSignal::Malformed(malformed),
        }),
        "error" => {
            let error = serde_json::from_str::<StreamErrorEvent>(&frame.data).map_or_else(
                |_| ChannelError::Server {
                    code: "unknown".to_string(),
                    message: frame.data.clone(),
                },
                |event| ChannelError::Server {
                    code: event.code,
                    message: event.message,
                },
            );
            Some(FeedSignal::Error(error.into()))
        }
        "ping" => {
            trace!("heartbeat");
            None
        }
        other => {
            debug!(event = other, "ignoring unknown SSE event");
            if other == "message" && !frame.data.is_empty() {
                Some(FeedSignal::Malformed(
                    MalformedEvent::new("unnamed frame").with_raw(frame.data),
                ))
            } else {
                None
            }
        }
    }
}

struct DecodeState<B, E> {
    body: BoxStream<'static, Result<B, E>>,
    decoder: SseDecoder,
    queued: VecDeque<FeedSignal>,
    finished: bool,
}

/// Turns a byte stream into feed signals, ending after the first error.
pub fn decode_stream<S, B, E>(body: S) -> impl futures::Stream<Item = FeedSignal> + Send + 'static
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        body: body.boxed(),
        decoder: SseDecoder::new(),
        queued: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(signal) = state.queued.pop_front() {
                if matches!(signal, FeedSignal::Error(_)) {
                    state.queued.clear();
                    state.finished = true;
                }
                return Some((signal, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state
                        .queued
                        .extend(frames.into_iter().filter_map(frame_to_signal));
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((
                        FeedSignal::Error(ChannelError::Interrupted(err.to_string()).into()),
                        state,
                    ));
                }
                None => return None,
            }
        }
    })
}

/// [`ChangeFeedClient`] backed by `GET /api/stream/conversations/{id}`.
#[derive(Debug, Clone)]
pub struct SseChangeFeed {
    client: ApiClient,
}

impl SseChangeFeed {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChangeFeedClient for SseChangeFeed {
    async fn open(&self, partition_key: PartitionKey) -> Result<FeedStream, SyncError> {
        let url = self
            .client
            .endpoint(&format!("stream/conversations/{partition_key}"))
            .map_err(|err| ChannelError::Connect(err.to_string()))?;

        let request = self
            .client
            .authorize(self.client.http().get(url))
            .header(ACCEPT, "text/event-stream");
        let response = request
            .send()
            .await
            .map_err(|err| ChannelError::Connect(err.to_string()))?;

        let response = check_status(response).await.map_err(|err| match err {
            SyncError::Fetch(FetchError::Status { status, message }) => {
                SyncError::from(ChannelError::Connect(format!("status {status}: {message}")))
            }
            other => other,
        })?;

        debug!(%partition_key, "change feed connected");
        Ok(decode_stream(response.bytes_stream()).boxed())
    }
}
