//! Processed-file history endpoints

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::history::{retention_cutoff, HistoryItem, HistoryRepository};
use crate::routes::MultipartForm;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub items: Vec<HistoryItem>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

pub fn router(max_upload_mb: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_history).post(save_history))
        .route("/cleanup", post(cleanup_history))
        .route("/:id", delete(delete_history))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}

async fn list_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<HistoryListResponse>> {
    let items = HistoryRepository::new(state.db()).list(&user.uid).await?;
    let total = items.len();
    Ok(Json(HistoryListResponse { items, total }))
}

/// Keep a result file: multipart `file` plus `toolType`
async fn save_history(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<HistoryItem>> {
    let mut form = MultipartForm::read(multipart).await?;
    let tool_type = form.text("toolType").unwrap_or("unknown").to_string();
    let file = form
        .take_file("file")
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let content_type = if file.content_type.is_empty() {
        mime_guess::from_path(&file.file_name)
            .first_or_octet_stream()
            .to_string()
    } else {
        file.content_type.clone()
    };

    let s3 = state.s3_client();
    let mut item = HistoryItem::new(
        &user.uid,
        &file.file_name,
        &content_type,
        file.bytes.len() as i64,
        &tool_type,
        "",
        Utc::now(),
    );
    item.file_url = s3.public_url(&item.storage_path);

    s3.put_object(&item.storage_path, file.bytes, &content_type).await?;
    HistoryRepository::new(state.db()).insert(&item).await?;

    tracing::info!(user_id = %user.uid, id = %item.id, tool = %item.tool_type, size = item.file_size, "Saved history item");
    Ok(Json(item))
}

async fn delete_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let item = HistoryRepository::new(state.db())
        .delete(&user.uid, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("History item {}", id)))?;

    state.s3_client().spawn_cleanup(item.storage_path);
    Ok(Json(DeleteResponse { success: true }))
}

/// Remove items past the retention window, with their files
async fn cleanup_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CleanupResponse>> {
    let cutoff = retention_cutoff(Utc::now()).to_rfc3339();
    let removed = HistoryRepository::new(state.db())
        .delete_older_than(&user.uid, &cutoff)
        .await?;

    let s3 = state.s3_client();
    let deletes = removed.iter().map(|item| s3.delete_object(&item.storage_path));
    for (item, result) in removed.iter().zip(join_all(deletes).await) {
        if let Err(e) = result {
            tracing::warn!(key = %item.storage_path, "Failed to delete expired history file: {}", e);
        }
    }

    tracing::info!(user_id = %user.uid, removed = removed.len(), "History cleanup");
    Ok(Json(CleanupResponse {
        removed: removed.len(),
    }))
}
