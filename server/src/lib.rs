use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use pgcet_core::colleges::CollegeDirectory;
use pgcet_core::dialogue::{ConversationState, Dialogue, Document, Reply, Sender};
use pgcet_core::input::escape_markdown;
use pgcet_core::registry::{PredictionRecord, Registry, UserRecord};
use pgcet_core::{Course, CourseTables, Estimate};
use pgcet_notifier::kea::{format_announcements, Announcement, KeaClient, LATEST_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod bot;

pub const ANNOUNCEMENT_TTL: Duration = Duration::from_secs(300);

pub struct ServerConfig {
    pub registry: Registry,
    pub tables: CourseTables,
    pub docs_dir: PathBuf,
    pub kea: Option<KeaClient>,
    pub admin_token: Option<String>,
}

#[derive(Clone)]
struct CachedAnnouncements {
    fetched_at: Instant,
    items: Option<Vec<Announcement>>,
}

#[derive(Clone)]
pub struct AppState {
    pub dialogue: Arc<Dialogue>,
    pub docs_dir: PathBuf,
    pub kea: Option<KeaClient>,
    pub admin_token: Option<String>,
    announcements: Arc<RwLock<Option<CachedAnnouncements>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let dialogue = Dialogue::new(config.registry, Arc::new(config.tables), CollegeDirectory::bundled());
        Self {
            dialogue: Arc::new(dialogue),
            docs_dir: config.docs_dir,
            kea: config.kea,
            admin_token: config.admin_token,
            announcements: Arc::new(RwLock::new(None)),
        }
    }

    pub fn registry(&self) -> &Registry { self.dialogue.registry() }

    pub async fn latest_announcements(&self) -> Result<Option<Vec<Announcement>>, (StatusCode, String)> {
        let kea = self
            .kea
            .as_ref()
            .ok_or((StatusCode::SERVICE_UNAVAILABLE, "announcement source not configured".to_string()))?;
        let cached = self.announcements.read().clone();
        if let Some(cached) = cached.filter(|c| c.fetched_at.elapsed() < ANNOUNCEMENT_TTL) {
            return Ok(cached.items);
        }
        let items = kea.latest(LATEST_LIMIT).await.map_err(|e| {
            tracing::warn!(error = %e, "announcement fetch failed");
            (StatusCode::BAD_GATEWAY, format!("error fetching KEA updates: {e}"))
        })?;
        *self.announcements.write() = Some(CachedAnnouncements { fetched_at: Instant::now(), items: items.clone() });
        Ok(items)
    }

    pub async fn resolve_reply(&self, reply: Reply) -> Reply {
        match reply {
            Reply::Announcements => {
                let body = match self.latest_announcements().await {
                    Ok(items) => format_announcements(items.as_deref()),
                    Err((_, msg)) => format!("⚠️ {msg}"),
                };
                Reply::markdown(format!("📢 *KEA Recent Updates:*\n\n{}", escape_markdown(&body)))
            }
            other => other,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/courses", get(courses_handler))
        .route("/predict", get(predict_handler))
        .route("/colleges/:district", get(colleges_handler))
        .route("/announcements", get(announcements_handler))
        .route("/chat", post(chat_handler))
        .route("/documents/:name", get(document_handler))
        .route("/admin/users", get(admin_users))
        .route("/admin/predictions", get(admin_predictions))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
pub struct CourseInfo {
    pub course: Course,
    pub total_candidates: u32,
    pub distinct_marks: usize,
    pub observations: usize,
    pub max_marks: u32,
}

pub async fn courses_handler(State(state): State<AppState>) -> Json<Vec<CourseInfo>> {
    let tables = state.dialogue.tables();
    let infos = Course::ALL
        .iter()
        .filter_map(|&course| {
            let t = tables.get(course)?;
            Some(CourseInfo {
                course,
                total_candidates: t.total(),
                distinct_marks: t.len(),
                observations: t.observation_count(),
                max_marks: t.top().marks,
            })
        })
        .collect();
    Json(infos)
}

#[derive(Deserialize)]
pub struct PredictParams {
    pub course: String,
    pub marks: f64,
}

#[derive(Serialize)]
pub struct PredictResponse {
    pub course: Course,
    pub marks: f64,
    pub rank: Estimate,
    pub total_candidates: u32,
}

pub async fn predict_handler(
    State(state): State<AppState>,
    Query(params): Query<PredictParams>,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    let course: Course = params.course.parse().map_err(|e| (StatusCode::BAD_REQUEST, format!("{e}")))?;
    if !params.marks.is_finite() || params.marks < 0.0 {
        return Err((StatusCode::BAD_REQUEST, "marks must be a non-negative number".into()));
    }
    let tables = state.dialogue.tables();
    let table = tables
        .get(course)
        .ok_or((StatusCode::NOT_FOUND, format!("no rank table for {course}")))?;
    let rank = pgcet_core::estimate(table, params.marks);
    Ok(Json(PredictResponse { course, marks: params.marks, rank, total_candidates: table.total() }))
}

#[derive(Deserialize)]
pub struct CollegeParams {
    pub course: Option<String>,
}

pub async fn colleges_handler(
    State(state): State<AppState>,
    Path(district): Path<String>,
    Query(params): Query<CollegeParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let course = match params.course.as_deref() {
        Some(code) => code.parse::<Course>().map_err(|e| (StatusCode::BAD_REQUEST, format!("{e}")))?,
        None => Course::Mca,
    };
    let colleges = state
        .dialogue
        .colleges()
        .lookup(&district, course)
        .ok_or((StatusCode::NOT_FOUND, format!("no {course} colleges found in '{district}'")))?;
    Ok(Json(serde_json::json!({
        "district": district,
        "course": course,
        "colleges": colleges,
    })))
}

#[derive(Serialize)]
pub struct AnnouncementsResponse {
    pub found: bool,
    pub items: Vec<Announcement>,
    pub text: String,
}

pub async fn announcements_handler(
    State(state): State<AppState>,
) -> Result<Json<AnnouncementsResponse>, (StatusCode, String)> {
    let latest = state.latest_announcements().await?;
    let text = format_announcements(latest.as_deref());
    Ok(Json(AnnouncementsResponse { found: latest.is_some(), items: latest.unwrap_or_default(), text }))
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub text: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: Reply,
    pub state: ConversationState,
}

/// Requires `X-ADMIN-TOKEN`.
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let sender = Sender::new(req.user_id, req.first_name);
    let reply = state.dialogue.handle(&sender, &req.text).map_err(|e| {
        tracing::error!(user_id = req.user_id, error = %e, "chat handling failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "could not handle message".to_string())
    })?;
    let reply = state.resolve_reply(reply).await;
    Ok(Json(ChatResponse { reply, state: state.dialogue.state(req.user_id) }))
}

pub async fn document_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let doc = Document::from_file_name(&name).ok_or((StatusCode::NOT_FOUND, "unknown document".to_string()))?;
    let bytes = std::fs::read(state.docs_dir.join(doc.file_name()))
        .map_err(|_| (StatusCode::NOT_FOUND, format!("{} is not available", doc.display_name())))?;
    let disposition = format!("attachment; filename=\"{}\"", doc.display_name());
    Ok(([(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)], bytes))
}

// --- Admin endpoints ---
async fn admin_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<UserRecord>>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    state.registry().users().map(Json).map_err(internal)
}

async fn admin_predictions(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<PredictionRecord>>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    state.registry().predictions().map(Json).map_err(internal)
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %e, "registry read failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "registry unavailable".into())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
