use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::{
    app_state::AppState,
    handlers::{messages, stream},
    middleware::auth::auth_middleware,
};

/// Message and stream routes, nested under `/api` and guarded by bearer auth.
pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::list_messages).post(messages::create_message),
        )
        .route(
            "/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .route(
            "/stream/conversations/{conversation_id}",
            get(stream::stream_conversation),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
