use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use shared::models::{
    ChangeEvent, EditMessageRequest, Item, ItemId, ListMessagesQuery, MessageListResponse,
    PartitionKey, SendMessageRequest,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::{
        error::{ApiError, AppResult},
        problem::ProblemDetails,
    },
    store::{InsertOutcome, NewMessage},
};

/// Upper bound on a single bulk page regardless of the requested limit.
pub const MAX_PAGE_SIZE: u32 = 1000;

const MAX_CONTENT_CHARS: usize = 10_000;

fn validate_content(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(ApiError::bad_request("message content must not be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::bad_request(format!(
            "message content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

async fn publish(state: &AppState, conversation_id: PartitionKey, event: ChangeEvent) {
    let kind = event.kind();
    let delivered = state.hub.publish(conversation_id, event).await;
    info!(%conversation_id, kind, delivered, "published change");
}

/// Oldest-first snapshot of a conversation.
#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/messages",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation to list"),
        ListMessagesQuery
    ),
    responses(
        (status = 200, description = "Messages ordered by creation time", body = MessageListResponse),
        (status = 400, description = "Invalid limit", body = ProblemDetails),
        (status = 401, description = "Missing or invalid bearer token", body = ProblemDetails)
    ),
    tag = "Messages"
)]
#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<PartitionKey>,
    Query(query): Query<ListMessagesQuery>,
) -> AppResult<Json<MessageListResponse>> {
    let limit = query.limit.unwrap_or(state.config.sync.page_size);
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be at least 1"));
    }

    let (items, has_more) = state
        .store
        .list(conversation_id, limit.min(MAX_PAGE_SIZE))
        .await?;

    Ok(Json(MessageListResponse {
        conversation_id,
        items,
        has_more,
    }))
}

/// Creates a message. Re-sending a known client id returns the stored row
/// without emitting another change.
#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/messages",
    params(("conversation_id" = Uuid, Path, description = "Conversation to post into")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message created", body = Item),
        (status = 200, description = "Message already existed", body = Item),
        (status = 400, description = "Invalid content", body = ProblemDetails),
        (status = 409, description = "Id belongs to another conversation", body = ProblemDetails)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, request), fields(sender_id = %request.sender_id))]
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<PartitionKey>,
    Json(request): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Item>)> {
    validate_content(&request.content)?;

    let id = request.id.unwrap_or_else(Uuid::new_v4);
    let _write = state.hub.write_lock(id).await;
    let outcome = state
        .store
        .insert(NewMessage {
            id: Some(id),
            conversation_id,
            sender_id: request.sender_id,
            sender: request.sender,
            content: request.content,
        })
        .await?;

    match outcome {
        InsertOutcome::Created(item) => {
            publish(
                &state,
                conversation_id,
                ChangeEvent::Inserted { item: item.clone() },
            )
            .await;
            Ok((StatusCode::CREATED, Json(item)))
        }
        InsertOutcome::Existing(item) => Ok((StatusCode::OK, Json(item))),
    }
}

#[utoipa::path(
    patch,
    path = "/api/messages/{message_id}",
    params(("message_id" = Uuid, Path, description = "Message to edit")),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "Message updated", body = Item),
        (status = 400, description = "Invalid content", body = ProblemDetails),
        (status = 404, description = "Unknown message", body = ProblemDetails)
    ),
    tag = "Messages"
)]
#[instrument(skip(state, request))]
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<ItemId>,
    Json(request): Json<EditMessageRequest>,
) -> AppResult<Json<Item>> {
    validate_content(&request.content)?;
    let _write = state.hub.write_lock(message_id).await;
    let item = state
        .store
        .update_content(message_id, &request.content)
        .await?;
    publish(
        &state,
        item.partition_key,
        ChangeEvent::Updated { item: item.clone() },
    )
    .await;
    Ok(Json(item))
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/read",
    params(("message_id" = Uuid, Path, description = "Message to mark as read")),
    responses(
        (status = 200, description = "Message marked read", body = Item),
        (status = 404, description = "Unknown message", body = ProblemDetails)
    ),
    tag = "Messages"
)]
#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<ItemId>,
) -> AppResult<Json<Item>> {
    let _write = state.hub.write_lock(message_id).await;
    let item = state.store.mark_read(message_id).await?;
    publish(
        &state,
        item.partition_key,
        ChangeEvent::Updated { item: item.clone() },
    )
    .await;
    Ok(Json(item))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}",
    params(("message_id" = Uuid, Path, description = "Message to delete")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 404, description = "Unknown message", body = ProblemDetails)
    ),
    tag = "Messages"
)]
#[instrument(skip(state))]
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<ItemId>,
) -> AppResult<StatusCode> {
    let _write = state.hub.write_lock(message_id).await;
    let item = state.store.delete(message_id).await?;
    publish(
        &state,
        item.partition_key,
        ChangeEvent::Deleted {
            id: item.id,
            partition_key: Some(item.partition_key),
        },
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}
