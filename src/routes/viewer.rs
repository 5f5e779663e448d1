//! Viewer session endpoints
//!
//! A session id is returned when a PDF is opened; every later call names it
//! in the path.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::routes::{pdf_attachment, MultipartForm};
use crate::state::AppState;
use crate::storage::validate_pdf_upload;
use crate::viewer::{
    HistoryState, PageStrokes, Point, ScrollState, ScrollUpdate, SessionSummary, StrokeInput,
    ViewerError, Viewport,
};

#[derive(Debug, Deserialize)]
pub struct EraseRequest {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
pub struct GotoRequest {
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct OverlayQuery {
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageImageQuery {
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation: Option<i64>,
    /// Composite the annotation layer over the page (default true)
    #[serde(default)]
    pub annotations: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub success: bool,
}

pub fn router(max_upload_mb: usize) -> Router<AppState> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/strokes", post(add_stroke))
        .route("/sessions/:id/erase", post(erase_at))
        .route("/sessions/:id/undo", post(undo))
        .route("/sessions/:id/redo", post(redo))
        .route("/sessions/:id/scroll", post(scroll))
        .route("/sessions/:id/goto", post(goto_page))
        .route("/sessions/:id/pages/:page/image", get(render_page))
        .route("/sessions/:id/pages/:page/overlay", get(render_overlay))
        .route("/sessions/:id/export", get(export))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}

fn session_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ViewerError::SessionNotFound(raw.to_string()).into())
}

/// Open the multipart `file` as a new session
async fn open_session(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SessionSummary>)> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    validate_pdf_upload(
        &file.file_name,
        &file.content_type,
        file.bytes.len(),
        state.config().server.max_upload_mb,
    )?;

    let summary = state.viewer().create(&file.file_name, file.bytes).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>> {
    Ok(Json(state.viewer().summary(session_id(&id)?).await?))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CloseResponse>> {
    let id = session_id(&id)?;
    if !state.viewer().remove(id).await {
        return Err(ViewerError::SessionNotFound(id.to_string()).into());
    }
    Ok(Json(CloseResponse { success: true }))
}

async fn add_stroke(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<StrokeInput>,
) -> Result<Json<PageStrokes>> {
    Ok(Json(state.viewer().add_stroke(session_id(&id)?, input).await?))
}

async fn erase_at(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EraseRequest>,
) -> Result<Json<PageStrokes>> {
    let at = Point::new(req.x, req.y);
    Ok(Json(state.viewer().erase(session_id(&id)?, req.page, at).await?))
}

async fn undo(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<HistoryState>> {
    Ok(Json(state.viewer().undo(session_id(&id)?).await?))
}

async fn redo(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<HistoryState>> {
    Ok(Json(state.viewer().redo(session_id(&id)?).await?))
}

async fn scroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ScrollUpdate>,
) -> Result<Json<ScrollState>> {
    let id = session_id(&id)?;
    Ok(Json(state.viewer().scroll(id, update, Instant::now()).await?))
}

async fn goto_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<GotoRequest>,
) -> Result<Json<ScrollState>> {
    let id = session_id(&id)?;
    Ok(Json(state.viewer().goto(id, req.page, Instant::now()).await?))
}

fn viewport(scale: Option<f64>, rotation: Option<i64>) -> Result<Viewport> {
    let defaults = Viewport::default();
    Ok(Viewport::new(
        scale.unwrap_or(defaults.scale),
        rotation.unwrap_or(defaults.rotation),
    )
    .map_err(ViewerError::from)?)
}

fn png_response(png: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from(png),
    )
        .into_response()
}

/// The page itself, rendered at the requested zoom and rotation
async fn render_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(String, u32)>,
    Query(query): Query<PageImageQuery>,
) -> Result<Response> {
    let id = session_id(&id)?;
    let viewport = viewport(query.scale, query.rotation)?;
    let annotations = query.annotations.unwrap_or(true);

    let png = state
        .viewer()
        .render_page(id, page, viewport, annotations)
        .await?;
    Ok(png_response(png))
}

/// Annotation layer of one page as a transparent PNG
async fn render_overlay(
    State(state): State<AppState>,
    Path((id, page)): Path<(String, u32)>,
    Query(query): Query<OverlayQuery>,
) -> Result<Response> {
    let id = session_id(&id)?;
    let viewport = viewport(query.scale, query.rotation)?;

    let png = state.viewer().render_overlay(id, page, viewport).await?;
    Ok(png_response(png))
}

/// The document with its annotations burned in
async fn export(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let (file_name, bytes) = state.viewer().export(session_id(&id)?).await?;
    pdf_attachment(&file_name, bytes)
}
