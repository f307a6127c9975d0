//! HTTP backend tests against a mock guide server

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use travai::backend::{Backend, HttpBackend, SseDecoder, StreamEvent, TurnRequest};
use travai::citations::Citation;
use travai::error::TravaiError;
use travai::session::{StreamController, TurnOutcome};

mod common;

fn backend_for(server: &MockServer, key: Option<&str>) -> HttpBackend {
    HttpBackend::new(
        url::Url::parse(&server.uri()).unwrap(),
        key.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn sse_body() -> String {
    [
        "data: {\"content\": \"It's in Bangkok.\\n\"}\n\n",
        "data: {}\n\n",
        "data: {\"content\": \"```json\\n{\\\"sources\\\": [{\\\"page\\\": 12}]}\\n```\"}\n\n",
        "event: end\ndata: {}\n\n",
    ]
    .concat()
}

#[tokio::test]
async fn test_stream_posts_turn_with_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .and(header("X-API-Key", "secret"))
        .and(body_json(json!({
            "messages": [{"role": "user", "content": "Where is the Grand Palace?"}],
            "thread_id": "thread-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(), "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("secret"));
    let mut body = backend
        .open_stream(&TurnRequest::new("thread-1", "Where is the Grand Palace?"))
        .await
        .unwrap();

    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    while let Some(chunk) = body.next().await {
        events.extend(decoder.push(&chunk.unwrap()));
    }
    events.extend(decoder.finish());

    assert_eq!(events.len(), 4);
    assert_eq!(
        events[0],
        StreamEvent::Content("It's in Bangkok.\n".to_string())
    );
    assert_eq!(events[1], StreamEvent::Heartbeat);
    assert_eq!(events[3], StreamEvent::End);
}

#[tokio::test]
async fn test_missing_and_wrong_keys_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Missing API Key"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "Invalid API Key"})))
        .mount(&server)
        .await;

    let backend = backend_for(&server, None);
    let err = backend
        .open_stream(&TurnRequest::new("t", "hi"))
        .await
        .err()
        .expect("401 should fail");
    assert!(TravaiError::is_unauthorized_error(&err));
    assert_eq!(err.to_string(), "Authorization failed: Missing API Key");

    let err = backend.list_threads().await.unwrap_err();
    assert!(TravaiError::is_unauthorized_error(&err));
    assert_eq!(err.to_string(), "Authorization failed: Invalid API Key");
}

#[tokio::test]
async fn test_server_error_maps_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = backend_for(&server, None).list_threads().await.unwrap_err();
    match err.downcast_ref::<TravaiError>() {
        Some(TravaiError::Http { status, .. }) => assert_eq!(*status, 500),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.to_string(), "HTTP error! status: 500");
}

#[tokio::test]
async fn test_thread_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .and(header("X-API-Key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "t1", "title": "Temples", "createdAt": "2025-01-02 10:00:00"},
            {"id": "t2", "title": "Beaches"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"role": "user", "content": "Where is Wat Pho?"},
                {"role": "assistant", "content": "Next to the Grand Palace."}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/threads/t1"))
        .and(body_json(json!({"title": "Bangkok temples"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "t1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/thread/t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("k"));

    let threads = backend.list_threads().await.unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].created_at.as_deref(), Some("2025-01-02 10:00:00"));
    assert_eq!(threads[1].created_at, None);

    let history = backend.history("t1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Next to the Grand Palace.");

    backend.rename_thread("t1", "Bangkok temples").await.unwrap();
    backend.delete_thread("t2").await.unwrap();
}

#[tokio::test]
async fn test_unknown_thread_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Thread not found"})))
        .mount(&server)
        .await;

    let err = backend_for(&server, None).history("missing").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TravaiError>(),
        Some(TravaiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_controller_turn_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(), "text/event-stream"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path_regex(r"^/threads/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("k"));
    let (controller, _events) = StreamController::new(Arc::new(backend), common::fast_settings());
    let id = controller.active_id().await;

    let outcome = controller
        .start(&id, "Where is the Grand Palace?")
        .await
        .unwrap()
        .wait()
        .await;
    match outcome {
        TurnOutcome::Completed(message) => {
            assert_eq!(message.content, "It's in Bangkok.");
            assert_eq!(message.citations, vec![Citation::new(12)]);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(controller.reference().await.page, Some(12));
}

#[tokio::test]
async fn test_replaced_key_is_sent_on_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads"))
        .and(header("X-API-Key", "new-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, Some("old-key"));
    backend.set_api_key(Some("new-key".to_string()));
    assert!(backend.list_threads().await.unwrap().is_empty());
}
