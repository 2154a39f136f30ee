//! JSON client for the message API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    models::{
        EditMessageRequest, FetchError, Item, ItemId, MessageListResponse, PartitionKey,
        SendMessageRequest, SyncError,
    },
    sync::{BulkLoader, Snapshot},
};
use tracing::{debug, instrument};
use url::Url;

/// Thin wrapper over `reqwest` that knows the API routes and the bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    token: Option<String>,
    page_size: u32,
}

impl ApiClient {
    /// # Errors
    /// Returns an error when `server` is not an absolute URL.
    pub fn new(server: &str, token: Option<String>, page_size: u32) -> anyhow::Result<Self> {
        let mut base = Url::parse(server)
            .map_err(|err| anyhow::anyhow!("invalid server URL '{server}': {err}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http: Client::new(),
            base,
            token: token.filter(|token| !token.trim().is_empty()),
            page_size,
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Resolves an API route relative to the server base.
    pub(crate) fn endpoint(&self, route: &str) -> Result<Url, FetchError> {
        self.base
            .join(&format!("api/{route}"))
            .map_err(|err| FetchError::Transport(format!("invalid endpoint {route}: {err}")))
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetches up to `limit` messages, oldest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        conversation_id: PartitionKey,
        limit: u32,
    ) -> Result<MessageListResponse, SyncError> {
        let mut url = self.endpoint(&format!("conversations/{conversation_id}/messages"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self.execute(self.http.get(url)).await?;
        decode(response).await
    }

    /// Creates a message; reusing `request.id` returns the stored row.
    pub async fn send(
        &self,
        conversation_id: PartitionKey,
        request: &SendMessageRequest,
    ) -> Result<Item, SyncError> {
        let url = self.endpoint(&format!("conversations/{conversation_id}/messages"))?;
        let response = self.execute(self.http.post(url).json(request)).await?;
        decode(response).await
    }

    pub async fn edit(&self, id: ItemId, content: &str) -> Result<Item, SyncError> {
        let url = self.endpoint(&format!("messages/{id}"))?;
        let body = EditMessageRequest {
            content: content.to_string(),
        };
        let response = self.execute(self.http.patch(url).json(&body)).await?;
        decode(response).await
    }

    pub async fn mark_read(&self, id: ItemId) -> Result<Item, SyncError> {
        let url = self.endpoint(&format!("messages/{id}/read"))?;
        let response = self.execute(self.http.post(url)).await?;
        decode(response).await
    }

    pub async fn delete(&self, id: ItemId) -> Result<(), SyncError> {
        let url = self.endpoint(&format!("messages/{id}"))?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, SyncError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        debug!(status = %response.status(), url = %response.url(), "api response");
        check_status(response).await
    }
}

/// Maps non-success responses to [`SyncError`], pulling the message out of a
/// problem-details body when there is one.
pub(crate) async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = problem_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::Unauthorized(message));
    }
    Err(FetchError::Status {
        status: status.as_u16(),
        message,
    }
    .into())
}

fn problem_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    response
        .json::<T>()
        .await
        .map_err(|err| FetchError::Decode(err.to_string()).into())
}

#[async_trait]
impl BulkLoader for ApiClient {
    async fn load(&self, partition_key: PartitionKey) -> Result<Snapshot, SyncError> {
        let page = self.list(partition_key, self.page_size).await?;
        if page.has_more {
            debug!(%partition_key, limit = self.page_size, "snapshot truncated to the page limit");
            return Ok(Snapshot::partial(page.items));
        }
        Ok(Snapshot::complete(page.items))
    }
}
