//! HTTP surface tests against the full router with a scripted model.

use askdb_core::{
    AskError, ChatLogStore, GenerationRequest, LanguageModel, Result, SqliteExecutor,
};
use askdb_server::{config::Config, routes, state::AppState};
use askdb_types::Turn;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct ScriptedModel {
    sql: Mutex<VecDeque<String>>,
    generate_calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(sql: &[&str]) -> Self {
        Self {
            sql: Mutex::new(sql.iter().map(|s| s.to_string()).collect()),
            generate_calls: AtomicUsize::new(0),
        }
    }
}

impl LanguageModel for ScriptedModel {
    fn generate_sql(&self, _: &GenerationRequest<'_>) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.sql
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AskError::Generation("HTTP 502 from upstream".to_string()))
    }

    fn rewrite_question(&self, question: &str, _: &str, _: Option<&str>) -> Result<String> {
        Ok(question.to_string())
    }

    fn summarize(&self, _: &str, _: &str, rows_json: &str) -> Result<String> {
        let rows: Vec<Value> = serde_json::from_str(rows_json)?;
        Ok(format!("{} open orders", rows.len()))
    }

    fn chat(&self, _: &[Turn], message: &str) -> Result<String> {
        Ok(format!("echo: {}", message))
    }
}

fn create_test_app(model: Arc<ScriptedModel>) -> (Router, Arc<AppState>) {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE v_open_order (order_no TEXT, item_no TEXT, city TEXT, balance_qty REAL);
        INSERT INTO v_open_order VALUES ('SO-1', 'AB-123', 'Pune', 5);
        INSERT INTO v_open_order VALUES ('SO-2', 'CD-456', 'Mumbai', 0);
        "#,
    )
    .unwrap();
    let executor = Arc::new(SqliteExecutor::from_connection(conn, "v_open_order"));
    let chat_log = Arc::new(ChatLogStore::open_in_memory().unwrap());

    let state = Arc::new(AppState::from_parts(
        Config::default(),
        model,
        executor,
        chat_log,
    ));
    (routes::router(state.clone()), state)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn as_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = create_test_app(Arc::new(ScriptedModel::new(&[])));
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_start_session_registers_id() {
    let (app, state) = create_test_app(Arc::new(ScriptedModel::new(&[])));
    let (status, body) = post_json(&app, "/session/start", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    let session_id = as_json(&body)["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_id.len(), 32);
    assert!(state.sessions.contains(&session_id));
}

#[tokio::test]
async fn test_ask_answers_with_insights() {
    let model = Arc::new(ScriptedModel::new(&[
        "SELECT order_no FROM v_open_order WHERE city = 'Pune'",
    ]));
    let (app, _) = create_test_app(model);
    let (status, body) = post_json(
        &app,
        "/ask",
        json!({"question": "which orders ship from Pune warehouse", "session_id": "s1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = as_json(&body);
    assert_eq!(body["summary"], "Here are the results.");
    assert_eq!(body["insights"], "1 open orders");
}

#[tokio::test]
async fn test_ask_greeting_skips_generation() {
    let model = Arc::new(ScriptedModel::new(&[]));
    let (app, _) = create_test_app(model.clone());
    let (status, body) = post_json(
        &app,
        "/ask",
        json!({"question": "good morning", "session_id": "s1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(as_json(&body)["summary"]
        .as_str()
        .unwrap()
        .starts_with("Hello! I am your ERP assistant."));
    assert_eq!(model.generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ask_empty_question_is_bad_request() {
    let (app, _) = create_test_app(Arc::new(ScriptedModel::new(&[])));
    let (status, _) = post_json(&app, "/ask", json!({"question": "   ", "session_id": "s1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ask_rejection_is_a_normal_answer() {
    let model = Arc::new(ScriptedModel::new(&["DROP TABLE v_open_order"]));
    let (app, _) = create_test_app(model);
    let (status, body) = post_json(
        &app,
        "/ask",
        json!({"question": "clean up every old order row now", "session_id": "s1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = as_json(&body);
    assert_eq!(
        body["summary"],
        "Rejected SQL: First keyword must be SELECT/WITH, got 'DROP'"
    );
    assert!(body["insights"].is_null());
}

#[tokio::test]
async fn test_ask_execution_error_is_server_error() {
    let model = Arc::new(ScriptedModel::new(&["SELECT missing_col FROM v_open_order"]));
    let (app, _) = create_test_app(model);
    let (status, body) = post_json(
        &app,
        "/ask",
        json!({"question": "show the missing column for each order", "session_id": "s1"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("Query failed:"));
    assert!(text.contains("missing_col"));
}

#[tokio::test]
async fn test_ask_generation_error_hides_details() {
    let (app, _) = create_test_app(Arc::new(ScriptedModel::new(&[])));
    let (status, body) = post_json(
        &app,
        "/ask",
        json!({"question": "top 5 customers by order amount", "session_id": "s1"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!String::from_utf8(body).unwrap().contains("502"));
}

#[tokio::test]
async fn test_chat_without_session_id() {
    let (app, state) = create_test_app(Arc::new(ScriptedModel::new(&[])));
    let (status, body) = post_json(&app, "/chat", json!({"message": "tell me a joke"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["reply"], "echo: tell me a joke");
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_smart_modes() {
    let model = Arc::new(ScriptedModel::new(&[
        "SELECT order_no FROM v_open_order",
    ]));
    let (app, _) = create_test_app(model);

    let (_, body) = post_json(&app, "/smart", json!({"message": "thanks!", "session_id": "s1"})).await;
    assert_eq!(as_json(&body)["mode"], "static");

    let (_, body) = post_json(
        &app,
        "/smart",
        json!({"message": "pending orders please", "session_id": "s1"}),
    )
    .await;
    let body = as_json(&body);
    assert_eq!(body["mode"], "sql");
    assert_eq!(body["reply"], "1 open orders");

    let (_, body) = post_json(&app, "/smart", json!({"message": "what can you do"})).await;
    assert_eq!(as_json(&body)["mode"], "chat");
}

#[tokio::test]
async fn test_smart_empty_message_is_bad_request() {
    let (app, _) = create_test_app(Arc::new(ScriptedModel::new(&[])));
    let (status, _) = post_json(&app, "/smart", json!({"message": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
