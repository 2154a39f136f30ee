use thiserror::Error;

/// The bulk snapshot for a partition could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("response could not be decoded: {0}")]
    Decode(String),
}

/// The change-feed subscription failed or was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("stream interrupted: {0}")]
    Interrupted(String),
    #[error("server closed the stream ({code}): {message}")]
    Server { code: String, message: String },
    #[error("stream ended")]
    Ended,
}

/// A change event that could not be applied and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed change event: {reason}")]
pub struct MalformedEvent {
    pub reason: String,
    pub raw: Option<String>,
}

impl MalformedEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raw: None,
        }
    }

    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// Every failure the synchronizer can surface to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("initial load failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("change feed failed: {0}")]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Malformed(#[from] MalformedEvent),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl SyncError {
    /// Fatal errors end the session; everything else is retried or retriable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch_error",
            Self::Channel(_) => "channel_error",
            Self::Malformed(_) => "malformed_event",
            Self::Unauthorized(_) => "unauthorized",
        }
    }
}
