//! HTTP surface

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, instrument};

use crate::{
    database::{LocationStore, Storage},
    errors::{GpsLoggerError, Rejection},
    models::ClientPayload,
    normalize::{self, parse_generic, parse_owntracks},
    render,
    view::{TrackView, Window},
};

/// Rows returned by `/last` when `n` is not given
pub const DEFAULT_LAST_N: u32 = 10;

/// Paths served, logged at startup
pub const ROUTES: &[&str] = &[
    "GET /",
    "POST /api/loc",
    "GET|POST /owntracks",
    "POST /pub",
    "GET /map",
    "GET /map2",
    "GET /export.csv",
    "GET /last",
];

pub type AppState = Arc<Storage>;

/// Error returned from a handler
#[derive(Debug)]
pub enum ApiError {
    Rejected(Rejection),
    Storage(GpsLoggerError),
}

impl From<Rejection> for ApiError {
    fn from(value: Rejection) -> Self {
        ApiError::Rejected(value)
    }
}

impl From<GpsLoggerError> for ApiError {
    fn from(value: GpsLoggerError) -> Self {
        ApiError::Storage(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Rejected(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": reason.to_string()})),
            )
                .into_response(),
            ApiError::Storage(e) => {
                error!("Storage error: {}", e);
                let status = match e {
                    GpsLoggerError::StorageUnavailable(_) | GpsLoggerError::Timeout(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(json!({"ok": false, "error": "storage error"}))).into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    days: Option<String>,
    all: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LastParams {
    n: Option<String>,
}

pub fn router(storage: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/loc", post(receive_generic))
        .route("/owntracks", get(owntracks_hint).post(receive_owntracks))
        .route("/pub", post(receive_owntracks))
        .route("/map", get(static_map))
        .route("/map2", get(interactive_map))
        .route("/export.csv", get(export_csv))
        .route("/last", get(last_points))
        .with_state(storage)
}

async fn index() -> &'static str {
    "GPS Logger Server is running. POST /api/loc or /owntracks, view /map or /map2"
}

async fn ingest(
    storage: &Storage,
    payload: ClientPayload,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = normalize::normalize(payload, Utc::now())?;
    storage.insert(&record).await?;
    debug!(
        "Stored point from {} ({})",
        record.device_id,
        record.provider.as_deref().unwrap_or_default()
    );
    Ok(Json(json!({"ok": true})))
}

#[instrument(skip_all)]
async fn receive_generic(
    State(storage): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    ingest(&storage, ClientPayload::Generic(parse_generic(&body))).await
}

#[instrument(skip_all)]
async fn receive_owntracks(
    State(storage): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    ingest(&storage, ClientPayload::OwnTracks(parse_owntracks(&body))).await
}

async fn owntracks_hint() -> Json<serde_json::Value> {
    Json(json!({"ok": true, "hint": "POST a OwnTracks JSON here"}))
}

#[instrument(skip(storage))]
async fn static_map(
    State(storage): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Response, ApiError> {
    let window = Window::from_params(params.days.as_deref(), params.all.as_deref());
    let rows = storage.query_window(window.cutoff(Utc::now())).await?;

    Ok(match TrackView::assemble(rows, window) {
        Ok(view) => Html(render::static_map_page(&view)).into_response(),
        Err(empty) => render::static_map_empty(empty, window).into_response(),
    })
}

#[instrument(skip(storage))]
async fn interactive_map(
    State(storage): State<AppState>,
    Query(params): Query<WindowParams>,
) -> Result<Html<String>, ApiError> {
    let window = Window::from_params(params.days.as_deref(), params.all.as_deref());
    let rows = storage.query_window(window.cutoff(Utc::now())).await?;

    Ok(Html(match TrackView::assemble(rows, window) {
        Ok(view) => render::interactive_map_page(&view),
        Err(empty) => render::interactive_map_empty(empty),
    }))
}

#[instrument(skip(storage))]
async fn export_csv(State(storage): State<AppState>) -> Result<Response, ApiError> {
    let rows = storage.query_all_for_export().await?;
    let body = render::export_csv(&rows)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=gps_export.csv",
            ),
        ],
        body,
    )
        .into_response())
}

#[instrument(skip(storage))]
async fn last_points(
    State(storage): State<AppState>,
    Query(params): Query<LastParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let n = params
        .n
        .as_deref()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, i64::from(u32::MAX)) as u32)
        .unwrap_or(DEFAULT_LAST_N);

    let rows = storage.query_last_n(n).await?;
    Ok(Json(json!({"count": rows.len(), "rows": rows})))
}
