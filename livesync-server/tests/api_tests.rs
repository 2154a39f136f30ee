//! Router-level tests for the message API and the change feed.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use futures::StreamExt;
use serde_json::{Value, json};
use server::{
    app_state::AppState,
    server::{create_app_router, metrics_handle, serve_on},
};
use shared::{
    config::server::Config,
    models::{ChangeEvent, Item, MessageListResponse},
};
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

fn app_with(config: Config) -> Router {
    let state = Arc::new(AppState::in_memory(Arc::new(config)));
    create_app_router(state, metrics_handle())
}

fn app() -> Router {
    app_with(Config::with_defaults())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn message_body(content: &str) -> Value {
    json!({
        "sender_id": Uuid::from_u128(7),
        "sender": { "display_name": "Ada", "role": "mentor" },
        "content": content
    })
}

#[tokio::test]
async fn created_messages_are_listed_oldest_first() {
    let app = app();
    let conversation = Uuid::new_v4();
    let uri = format!("/api/conversations/{conversation}/messages");

    for content in ["one", "two", "three"] {
        let (status, _) = send(&app, Method::POST, &uri, Some(message_body(content))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, Method::GET, &format!("{uri}?limit=2"), None).await;
    assert_eq!(status, StatusCode::OK);
    let list: MessageListResponse = serde_json::from_value(body).unwrap();
    assert_eq!(list.conversation_id, conversation);
    assert!(list.has_more);
    let contents: Vec<_> = list.items.iter().map(|item| item.payload.content.as_str()).collect();
    assert_eq!(contents, ["one", "two"]);
    assert_eq!(list.items[0].sender_label(), "Ada");
}

#[tokio::test]
async fn client_supplied_id_makes_create_idempotent() {
    let app = app();
    let conversation = Uuid::new_v4();
    let uri = format!("/api/conversations/{conversation}/messages");
    let id = Uuid::new_v4();
    let mut body = message_body("hello");
    body["id"] = json!(id);

    let (first, created) = send(&app, Method::POST, &uri, Some(body.clone())).await;
    let (second, existing) = send(&app, Method::POST, &uri, Some(body)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(created, existing);
    assert_eq!(created["id"], json!(id));
}

#[tokio::test]
async fn edit_read_and_delete_round_trip() {
    let app = app();
    let conversation = Uuid::new_v4();
    let (_, created) = send(
        &app,
        Method::POST,
        &format!("/api/conversations/{conversation}/messages"),
        Some(message_body("draft")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, edited) = send(
        &app,
        Method::PATCH,
        &format!("/api/messages/{id}"),
        Some(json!({ "content": "final" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["payload"]["content"], "final");
    assert_eq!(edited["payload"]["edited"], true);

    let (status, read) = send(&app, Method::POST, &format!("/api/messages/{id}/read"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["payload"]["read"], true);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/messages/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, problem) = send(&app, Method::DELETE, &format!("/api/messages/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(problem["code"], "not_found");
}

#[tokio::test]
async fn invalid_requests_return_problem_details() {
    let app = app();
    let conversation = Uuid::new_v4();
    let uri = format!("/api/conversations/{conversation}/messages");

    let (status, problem) = send(&app, Method::POST, &uri, Some(message_body("   "))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(problem["code"], "validation_failed");

    let (status, _) = send(&app, Method::GET, &format!("{uri}?limit=0"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bearer_token_guards_api_routes() {
    let mut config = Config::with_defaults();
    config.auth.bearer_token = Some("secret".into());
    let app = app_with(config);
    let uri = format!("/api/conversations/{}/messages", Uuid::new_v4());

    let (status, problem) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(problem["code"], "unauthorized");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header(header::AUTHORIZATION, "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (status, doc) = send(&app(), Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "LiveSync API");
}

/// Reads `count` SSE frames from a live response as `(event, data)` pairs.
async fn read_frames(response: reqwest::Response, count: usize) -> Vec<(String, String)> {
    let mut body = response.bytes_stream();
    let mut buffer = String::new();
    let mut frames = Vec::new();

    while frames.len() < count {
        let chunk = body.next().await.expect("stream ended early").unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            let field = |name: &str| {
                frame
                    .lines()
                    .filter_map(|line| line.strip_prefix(name))
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            frames.push((field("event:"), field("data:")));
        }
    }

    frames.truncate(count);
    frames
}

#[tokio::test]
async fn stream_delivers_ready_then_changes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_on(listener, app(), async move {
        let _ = stopped.await;
    }));

    let conversation = Uuid::new_v4();
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let stream = client
        .get(format!("{base}/api/stream/conversations/{conversation}"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), reqwest::StatusCode::OK);
    assert!(
        stream
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    let reader = tokio::spawn(read_frames(stream, 3));

    // The hub subscription is taken before the response headers are sent.
    let created: Item = client
        .post(format!("{base}/api/conversations/{conversation}/messages"))
        .json(&message_body("live"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let deleted = client
        .delete(format!("{base}/api/messages/{}", created.id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);

    let frames = tokio::time::timeout(Duration::from_secs(10), reader)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(frames[0].0, "ready");
    let ready: Value = serde_json::from_str(&frames[0].1).unwrap();
    assert_eq!(ready["conversation_id"], json!(conversation));

    assert_eq!(frames[1].0, "change");
    assert!(matches!(
        ChangeEvent::parse(&frames[1].1).unwrap(),
        ChangeEvent::Inserted { item } if item.id == created.id
    ));
    assert!(matches!(
        ChangeEvent::parse(&frames[2].1).unwrap(),
        ChangeEvent::Deleted { id, partition_key: Some(key) }
            if id == created.id && key == conversation
    ));

    let _ = stop.send(());
    let _ = server.await;
}

#[tokio::test]
async fn stream_ignores_other_conversations() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_on(listener, app(), async move {
        let _ = stopped.await;
    }));

    let watched = Uuid::new_v4();
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();
    let stream = client
        .get(format!("{base}/api/stream/conversations/{watched}"))
        .send()
        .await
        .unwrap();
    let reader = tokio::spawn(read_frames(stream, 2));

    for (conversation, content) in [(Uuid::new_v4(), "elsewhere"), (watched, "here")] {
        client
            .post(format!("{base}/api/conversations/{conversation}/messages"))
            .json(&message_body(content))
            .send()
            .await
            .unwrap();
    }

    let frames = tokio::time::timeout(Duration::from_secs(10), reader)
        .await
        .unwrap()
        .unwrap();
    match ChangeEvent::parse(&frames[1].1).unwrap() {
        ChangeEvent::Inserted { item } => assert_eq!(item.payload.content, "here"),
        other => panic!("unexpected event {other:?}"),
    }

    let _ = stop.send(());
    let _ = server.await;
}
