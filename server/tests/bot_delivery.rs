use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use pgcet_core::dialogue::{Document, DocumentKind, Reply};
use pgcet_core::registry::Registry;
use pgcet_core::{Course, CourseTables};
use pgcet_notifier::telegram::TelegramClient;
use pgcet_server::{bot, AppState, ServerConfig};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::net::TcpListener;

type Calls = Arc<Mutex<Vec<(&'static str, Value)>>>;

async fn send_message(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
    calls.lock().push(("sendMessage", body));
    Json(json!({ "ok": true, "result": {} }))
}

async fn send_document(State(calls): State<Calls>) -> Json<Value> {
    calls.lock().push(("sendDocument", Value::Null));
    Json(json!({ "ok": true, "result": {} }))
}

async fn stub_telegram() -> (TelegramClient, Calls) {
    let calls: Calls = Arc::default();
    let app = Router::new()
        .route("/botT/sendMessage", post(send_message))
        .route("/botT/sendDocument", post(send_document))
        .with_state(calls.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (TelegramClient::with_api_base(&format!("http://{addr}"), "T").unwrap(), calls)
}

fn state(docs: &Path) -> AppState {
    AppState::new(ServerConfig {
        registry: Registry::temporary().unwrap(),
        tables: CourseTables::bundled(),
        docs_dir: docs.to_path_buf(),
        kea: None,
        admin_token: None,
    })
}

fn cutoff(course: Course) -> Reply {
    Reply::Document { document: Document { kind: DocumentKind::Cutoff, course } }
}

#[tokio::test]
async fn present_document_is_uploaded() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("mca_cutoff.pdf"), b"%PDF-1.4 fake").unwrap();
    let (telegram, calls) = stub_telegram().await;

    bot::deliver(&state(dir.path()), &telegram, 77, cutoff(Course::Mca)).await.unwrap();
    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "sendDocument");
}

#[tokio::test]
async fn missing_document_falls_back_to_text() {
    let dir = tempdir().unwrap();
    let (telegram, calls) = stub_telegram().await;

    bot::deliver(&state(dir.path()), &telegram, 77, cutoff(Course::Mba)).await.unwrap();
    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    let (method, body) = &calls[0];
    assert_eq!(*method, "sendMessage");
    assert_eq!(body["chat_id"], 77);
    assert!(body["text"].as_str().unwrap().contains("not available"));
}

#[tokio::test]
async fn markdown_flag_and_silence_are_respected() {
    let dir = tempdir().unwrap();
    let (telegram, calls) = stub_telegram().await;
    let st = state(dir.path());

    bot::deliver(&st, &telegram, 5, Reply::Silent).await.unwrap();
    bot::deliver(&st, &telegram, 5, Reply::text("plain")).await.unwrap();
    bot::deliver(&st, &telegram, 5, Reply::Announcements).await.unwrap();

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.get("parse_mode").is_none());
    assert_eq!(calls[1].1["parse_mode"], "Markdown");
    assert!(calls[1].1["text"].as_str().unwrap().contains("not configured"));
}
