use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::item::{Item, SenderProfile};

/// Bulk snapshot of a conversation, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageListResponse {
    pub conversation_id: Uuid,
    pub items: Vec<Item>,
    /// True when the page limit truncated the snapshot.
    #[serde(default)]
    pub has_more: bool,
}

/// Query string accepted by the list endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMessagesQuery {
    /// Maximum number of messages to return.
    pub limit: Option<u32>,
}

/// Body for creating a message.
///
/// A client-supplied `id` makes the insert idempotent and lets the client
/// render the message optimistically before the change event arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SendMessageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub sender_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderProfile>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct EditMessageRequest {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_request_omits_absent_id() {
        let request = SendMessageRequest {
            id: None,
            sender_id: Uuid::nil(),
            sender: None,
            content: "hi".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("sender").is_none());
    }

    #[test]
    fn list_response_defaults_has_more() {
        let json = r#"{"conversation_id":"00000000-0000-0000-0000-000000000001","items":[]}"#;
        let response: MessageListResponse = serde_json::from_str(json).unwrap();
        assert!(!response.has_more);
        assert!(response.items.is_empty());
    }
}
