use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use pgcet_core::registry::Registry;
use pgcet_core::{Course, CourseTables};
use pgcet_server::{build_app, AppState, ServerConfig};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

fn state(docs: &Path, admin_token: Option<&str>) -> AppState {
    AppState::new(ServerConfig {
        registry: Registry::temporary().unwrap(),
        tables: CourseTables::bundled(),
        docs_dir: docs.to_path_buf(),
        kea: None,
        admin_token: admin_token.map(str::to_string),
    })
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Bytes) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn chat_request(user_id: i64, text: &str, token: Option<&str>) -> Request<Body> {
    let body = json!({ "user_id": user_id, "first_name": "Arun", "text": text }).to_string();
    let mut req = Request::post("/chat").header("content-type", "application/json");
    if let Some(token) = token {
        req = req.header("X-ADMIN-TOKEN", token);
    }
    req.body(Body::from(body)).unwrap()
}

async fn chat(app: Router, user_id: i64, text: &str) -> Value {
    let (status, bytes) = send(app, chat_request(user_id, text, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn predict_matches_engine() {
    let dir = tempdir().unwrap();
    let app = build_app(state(dir.path(), None));

    let (status, body) = get(app.clone(), "/predict?course=mca&marks=47.5").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let expected = CourseTables::bundled().estimate(Course::Mca, 47.5).unwrap();
    assert_eq!(json["rank"].as_i64(), Some(expected));
    assert_eq!(json["course"], "MCA");

    let (_, body) = get(app, "/predict?course=MBA&marks=0").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["rank"].as_i64(), Some(28_875));
}

#[tokio::test]
async fn predict_rejects_bad_input() {
    let dir = tempdir().unwrap();
    let app = build_app(state(dir.path(), None));
    let (status, _) = get(app.clone(), "/predict?course=MSC&marks=50").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(app.clone(), "/predict?course=MCA&marks=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(app, "/predict?course=MCA&marks=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_runs_prediction_conversation() {
    let dir = tempdir().unwrap();
    let app = build_app(state(dir.path(), Some(TOKEN)));

    let json = chat(app.clone(), 42, "/predict").await;
    assert_eq!(json["state"], "awaiting_prediction");

    let json = chat(app.clone(), 42, "Arun MCA 57").await;
    assert_eq!(json["state"], "idle");
    assert_eq!(json["reply"]["type"], "text");
    let text = json["reply"]["text"].as_str().unwrap();
    let expected = CourseTables::bundled().estimate(Course::Mca, 57.0).unwrap();
    assert!(text.contains(&format!("Predicted Rank: *{expected}*")), "{text}");
}

#[tokio::test]
async fn kea_without_source_reports_unavailable() {
    let dir = tempdir().unwrap();
    let app = build_app(state(dir.path(), Some(TOKEN)));
    let json = chat(app.clone(), 1, "/kea").await;
    assert!(json["reply"]["text"].as_str().unwrap().contains("not configured"));
    let (status, _) = get(app, "/announcements").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn colleges_by_district() {
    let dir = tempdir().unwrap();
    let app = build_app(state(dir.path(), None));
    let (status, body) = get(app.clone(), "/colleges/Bangalore?course=mba").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["colleges"][0], "Christ University");
    let (status, _) = get(app, "/colleges/Mysore").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn documents_served_only_when_known() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("mca_cutoff.pdf"), b"%PDF-1.4 fake").unwrap();
    let app = build_app(state(dir.path(), None));

    let (status, body) = get(app.clone(), "/documents/mca_cutoff.pdf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"%PDF-1.4 fake");
    let (status, _) = get(app.clone(), "/documents/mba_cutoff.pdf").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(app, "/documents/secrets.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_requires_token() {
    let dir = tempdir().unwrap();
    let app = build_app(state(dir.path(), Some(TOKEN)));
    chat(app.clone(), 9, "/start").await;

    let (status, _) = get(app.clone(), "/admin/users").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::get("/admin/users").header("X-ADMIN-TOKEN", TOKEN).body(Body::empty()).unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json[0]["user_id"], 9);
}

#[tokio::test]
async fn chat_requires_token_and_leaves_registry_untouched() {
    let dir = tempdir().unwrap();
    let st = state(dir.path(), Some(TOKEN));
    let app = build_app(st.clone());

    for text in ["/start", "/predict", "Mallory MBA 3"] {
        let (status, _) = send(app.clone(), chat_request(123_456_789, text, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(app.clone(), chat_request(123_456_789, text, Some("wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    assert!(st.registry().user_ids().unwrap().is_empty());
    assert!(st.registry().prediction(123_456_789).unwrap().is_none());

    let open = build_app(state(dir.path(), None));
    let (status, _) = send(open, chat_request(1, "/start", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
