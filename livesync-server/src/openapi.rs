#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{
    ChangeEvent, EditMessageRequest, Item, MessageListResponse, MessagePayload,
    SendMessageRequest, SenderProfile, SenderRole, StreamErrorEvent, StreamReadyEvent, Timestamp,
};
use utoipa::OpenApi;

use crate::http::problem::ProblemDetails;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LiveSync API",
        version = "1.0.0",
        description = "Conversation snapshots, message writes, and per-conversation change feeds"
    ),
    paths(
        crate::handlers::messages::list_messages,
        crate::handlers::messages::create_message,
        crate::handlers::messages::edit_message,
        crate::handlers::messages::mark_read,
        crate::handlers::messages::delete_message,
        crate::handlers::stream::stream_conversation,
    ),
    components(
        schemas(
            Item,
            MessagePayload,
            SenderProfile,
            SenderRole,
            Timestamp,
            MessageListResponse,
            SendMessageRequest,
            EditMessageRequest,
            ChangeEvent,
            StreamReadyEvent,
            StreamErrorEvent,
            ProblemDetails,
        )
    ),
    tags(
        (name = "Messages", description = "Bulk snapshots and message writes"),
        (name = "Stream", description = "Server-sent change feeds")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/conversations/{conversation_id}/messages",
            "/api/messages/{message_id}",
            "/api/messages/{message_id}/read",
            "/api/stream/conversations/{conversation_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn document_registers_change_event_schema() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("ChangeEvent"));
        assert!(json.contains("ProblemDetails"));
    }
}
