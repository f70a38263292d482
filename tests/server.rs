mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::{Harness, ScriptedChatModel};
use scoped_rag::auth::{Claims, SessionKey};
use scoped_rag::server::{build_router, AppState};

const SECRET: &str = "an-integration-test-secret";

struct Server {
    _dir: tempfile::TempDir,
    embedder: Arc<common::KeywordEmbedder>,
    router: axum::Router,
    key: SessionKey,
}

async fn server(chat: ScriptedChatModel) -> Server {
    let dir = tempfile::tempdir().unwrap();
    let root = common::write_library(dir.path());
    let Harness {
        embedder,
        indexer,
        pipeline,
        ..
    } = Harness::new(&root, chat);
    indexer.run_full().await.unwrap();

    let key = SessionKey::new(SECRET).unwrap();
    let router = build_router(AppState {
        pipeline: Arc::new(pipeline),
        session_key: Arc::new(key.clone()),
    });
    Server {
        _dir: dir,
        embedder,
        router,
        key,
    }
}

fn token(key: &SessionKey, department: Option<&str>, exp_offset: i64) -> String {
    key.sign(&Claims {
        sub: "u-1".into(),
        name: Some("Test User".into()),
        department: department.map(str::to_string),
        exp: chrono::Utc::now().timestamp() + exp_offset,
    })
    .unwrap()
}

fn chat_request(bearer: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let s = server(ScriptedChatModel::default()).await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&s.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_chat_without_token_is_rejected_before_retrieval() {
    let s = server(ScriptedChatModel::default()).await;
    let calls = s.embedder.calls();

    let (status, body) = send(
        &s.router,
        chat_request(None, r#"{"message":"How many vacation days do I get?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
    assert_eq!(s.embedder.calls(), calls);
}

#[tokio::test]
async fn test_chat_rejects_bad_tokens() {
    let s = server(ScriptedChatModel::default()).await;
    let other = SessionKey::new("a-different-secret-entirely").unwrap();

    for bad in [
        "not-a-token".to_string(),
        token(&other, Some("HR"), 600),
        token(&s.key, Some("HR"), -10),
        token(&s.key, None, 600),
        token(&s.key, Some("   "), 600),
    ] {
        let (status, body) = send(
            &s.router,
            chat_request(Some(&bad), r#"{"message":"How many vacation days do I get?"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "token {}", bad);
        assert_eq!(body["error"]["code"], "unauthorized");
    }
}

#[tokio::test]
async fn test_chat_answers_for_token_department() {
    let s = server(ScriptedChatModel::default()).await;
    let t = token(&s.key, Some("HR"), 600);

    let (status, body) = send(
        &s.router,
        chat_request(Some(&t), r#"{"message":"How many vacation days do I get?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["department_context_used"], "HR");
    assert!(body["response"]
        .as_str()
        .unwrap()
        .contains("leave_policy.md"));
}

#[tokio::test]
async fn test_body_cannot_override_department() {
    let s = server(ScriptedChatModel::default()).await;
    let t = token(&s.key, Some("Finance"), 600);
    let body = json!({
        "question": "How many vacation days do I get?",
        "department": "HR",
    });

    let (status, body) = send(&s.router, chat_request(Some(&t), &body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["department_context_used"], "Finance");
    assert_eq!(
        body["response"],
        scoped_rag::generate::DECLINE_MESSAGE
    );
}

#[tokio::test]
async fn test_chat_rejects_bad_bodies() {
    let s = server(ScriptedChatModel::default()).await;
    let t = token(&s.key, Some("HR"), 600);

    for raw in [r#"{"message":"   "}"#, "{not json", r#"{"text":"hi"}"#] {
        let (status, body) = send(&s.router, chat_request(Some(&t), raw)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", raw);
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn test_generation_failure_hides_upstream_detail() {
    let s = server(ScriptedChatModel::failing()).await;
    let t = token(&s.key, Some("HR"), 600);

    let (status, body) = send(
        &s.router,
        chat_request(Some(&t), r#"{"message":"How many vacation days do I get?"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "generation_failed");
    assert!(!body.to_string().contains("secret internal detail"));
}
