//! HTTP and SSE transports for the synchronizer.

pub mod http;
pub mod sse;

pub use http::ApiClient;
pub use sse::{SseChangeFeed, SseDecoder};
