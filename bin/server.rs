// Dex Tracker - Web Server
// REST API over the shared tracker, plus a single-page UI

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dex_tracker::{
    logging, open_tracker, AddError, CatalogEntry, EntryId, Event, Notice, Snapshot, SqliteStore,
    Tracker, TrackerConfig, View,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const DEFAULT_EVENT_LIMIT: usize = 50;

/// Shared application state
///
/// Mutations take the tracker mutex, one at a time across their awaits.
/// Reads only look at the latest published snapshot and the audit store.
#[derive(Clone)]
struct AppState {
    tracker: Arc<Mutex<Tracker>>,
    snapshot: watch::Receiver<Arc<Snapshot>>,
    audit: SqliteStore,
    cry_base_url: Arc<str>,
}

impl AppState {
    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            notice: None,
        }
    }

    fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    fn reply(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            notice: None,
        }
    }
}

/// Catalog entry plus the derived cry URL
#[derive(Serialize)]
struct EntryResponse<'a> {
    #[serde(flatten)]
    entry: &'a CatalogEntry,
    cry_url: String,
}

impl<'a> EntryResponse<'a> {
    fn new(entry: &'a CatalogEntry, cry_base_url: &str) -> Self {
        Self {
            entry,
            cry_url: entry.cry_url(cry_base_url),
        }
    }
}

#[derive(Serialize)]
struct ListResponse<'a> {
    tracked_ids: Vec<EntryId>,
    entries: Vec<EntryResponse<'a>>,
    refreshing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale_error: Option<String>,
}

#[derive(Deserialize)]
struct AddRequest {
    name: String,
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

fn parse_id(raw: &str) -> Result<EntryId, Response> {
    raw.parse::<EntryId>()
        .map_err(|e| ApiResponse::err(e).reply(StatusCode::BAD_REQUEST))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/entries - Tracked entries as currently cached
async fn list_entries(State(state): State<AppState>) -> Response {
    let snapshot = state.current();

    match snapshot.view() {
        View::Loading => {
            ApiResponse::<()>::err("Loading Pokémon...").reply(StatusCode::SERVICE_UNAVAILABLE)
        }
        View::Blocked(e) => ApiResponse::err(e.to_string())
            .with_notice(Notice::refresh_failed(e))
            .reply(StatusCode::SERVICE_UNAVAILABLE),
        View::Entries {
            entries,
            refreshing,
            stale,
        } => {
            let response = ListResponse {
                tracked_ids: snapshot.ids().as_slice().to_vec(),
                entries: entries
                    .iter()
                    .map(|entry| EntryResponse::new(entry, &state.cry_base_url))
                    .collect(),
                refreshing,
                stale_error: stale.map(|e| e.to_string()),
            };
            ApiResponse::ok(response).reply(StatusCode::OK)
        }
    }
}

/// GET /api/entries/:id - One cached entry, never fetched
async fn get_entry(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let snapshot = state.current();

    match snapshot.select(id) {
        Some(entry) => {
            ApiResponse::ok(EntryResponse::new(entry, &state.cry_base_url)).reply(StatusCode::OK)
        }
        None => ApiResponse::err(format!("#{} is not tracked", id)).reply(StatusCode::NOT_FOUND),
    }
}

/// POST /api/entries - Add by name
async fn add_entry(State(state): State<AppState>, Json(request): Json<AddRequest>) -> Response {
    let mut tracker = state.tracker.lock().await;
    let result = tracker.add_by_name(&request.name).await;
    drop(tracker);

    if let Err(e) = &result {
        if add_status(e) == StatusCode::BAD_GATEWAY {
            error!("Add '{}' failed: {}", request.name, e);
        }
    }
    add_reply(result, &state.cry_base_url)
}

fn add_status(err: &AddError) -> StatusCode {
    match err {
        AddError::EmptyName => StatusCode::BAD_REQUEST,
        AddError::NotFound(_) => StatusCode::NOT_FOUND,
        AddError::AlreadyTracked(_) => StatusCode::CONFLICT,
        AddError::NetworkFailure(_) | AddError::RefreshFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

/// A failed follow-up refresh still answers 201; it shows up as
/// `stale_error` on the next list.
fn add_reply(result: Result<CatalogEntry, AddError>, cry_base_url: &str) -> Response {
    let notice = Notice::from_add_result(&result);

    match result {
        Ok(entry) => ApiResponse::ok(EntryResponse::new(&entry, cry_base_url))
            .with_notice(notice)
            .reply(StatusCode::CREATED),
        Err(e) => ApiResponse::err(e.to_string())
            .with_notice(notice)
            .reply(add_status(&e)),
    }
}

/// DELETE /api/entries/:id - Stop tracking
async fn remove_entry(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let mut tracker = state.tracker.lock().await;

    if tracker.remove(id) {
        ApiResponse::ok(id)
            .with_notice(Notice::removed())
            .reply(StatusCode::OK)
    } else {
        ApiResponse::err(format!("#{} is not tracked", id)).reply(StatusCode::NOT_FOUND)
    }
}

/// POST /api/refresh - Re-fetch every tracked entry
async fn refresh(State(state): State<AppState>) -> Response {
    let mut tracker = state.tracker.lock().await;

    match tracker.refresh_all().await {
        Ok(cache) => ApiResponse::ok(cache.len()).reply(StatusCode::OK),
        Err(e) => {
            error!("Refresh failed: {}", e);
            ApiResponse::err(e.to_string())
                .with_notice(Notice::refresh_failed(&e))
                .reply(StatusCode::BAD_GATEWAY)
        }
    }
}

/// GET /api/events?limit=N - Audit log, newest first
async fn list_events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);

    match state.audit.recent_events(limit) {
        Ok(events) => ApiResponse::<Vec<Event>>::ok(events).reply(StatusCode::OK),
        Err(e) => {
            error!("Error reading events: {:#}", e);
            ApiResponse::err(e.to_string()).reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_stderr();
    let config = TrackerConfig::from_env()?;

    println!("🌐 Dex Tracker - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let tracker = open_tracker(&config, "server")?;
    println!("✓ Database opened: {}", config.db_path().display());

    // Create shared state
    let state = AppState {
        snapshot: tracker.watch(),
        audit: tracker.store().clone(),
        tracker: Arc::new(Mutex::new(tracker)),
        cry_base_url: config.cry_base_url.as_str().into(),
    };

    // Initial load runs in the background; the list endpoint reports
    // Loading, then the entries or the failure
    let loader = state.tracker.clone();
    tokio::spawn(async move {
        let mut tracker = loader.lock().await;
        match tracker.mount().await {
            Ok(()) => info!("Loaded {} tracked entries", tracker.cache().len()),
            Err(e) => error!("Initial refresh failed: {}", e),
        }
    });

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/entries", get(list_entries).post(add_entry))
        .route("/entries/:id", get(get_entry).delete(remove_entry))
        .route("/refresh", post(refresh))
        .route("/events", get(list_events))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    // Start server
    let addr = config.server_addr.as_str();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/entries", addr);
    println!("   UI:  http://{}", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server exited with an error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use dex_tracker::{FetchError, RefreshError};
    use serde_json::{json, Value};

    fn squirtle() -> CatalogEntry {
        serde_json::from_value(json!({
            "id": 7,
            "name": "squirtle",
            "sprites": {},
            "height": 5,
            "weight": 90,
            "base_experience": 63,
            "abilities": [],
            "types": [],
            "stats": [],
            "moves": []
        }))
        .unwrap()
    }

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_successful_add_is_created_with_added_notice() {
        let response = add_reply(Ok(squirtle()), "https://cries.example");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_of(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["notice"]["title"], json!("Pokémon Added"));
        assert_eq!(body["data"]["cry_url"], json!("https://cries.example/squirtle.mp3"));
    }

    #[tokio::test]
    async fn test_add_failures_map_to_status_codes() {
        let cause = RefreshError::NetworkFailure {
            total: 1,
            cause: FetchError::Transport {
                key: "25".to_string(),
                reason: "connection reset".to_string(),
            },
        };
        let cases = [
            (AddError::EmptyName, StatusCode::BAD_REQUEST),
            (AddError::NotFound("agumon".to_string()), StatusCode::NOT_FOUND),
            (AddError::AlreadyTracked(Box::new(squirtle())), StatusCode::CONFLICT),
            (AddError::RefreshFailed(cause), StatusCode::BAD_GATEWAY),
        ];

        for (err, status) in cases {
            let response = add_reply(Err(err), "https://cries.example");
            assert_eq!(response.status(), status);

            let body = body_of(response).await;
            assert_eq!(body["success"], json!(false));
            assert!(body["notice"]["title"].is_string());
        }
    }
}
