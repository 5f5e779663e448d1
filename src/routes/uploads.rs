//! Relay upload endpoints
//!
//! Clients upload large PDFs straight to the bucket through a presigned URL,
//! then hand the public URL to a gateway route. The relay object is deleted
//! once the operation finishes.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{delete, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, USER_ID_HEADER};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::{is_own_relay_key, is_relay_key, temp_upload_key, PresignedUpload, PDF_MIME};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/presign", post(presign_upload))
        .route("/", delete(delete_upload))
}

/// Issue a presigned PUT for `temp/{uid}/{millis}_{name}`
async fn presign_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PresignRequest>,
) -> Result<Json<PresignedUpload>> {
    let file_name = req.file_name.as_deref().map(str::trim).unwrap_or("");
    let file_type = req.file_type.as_deref().map(str::trim).unwrap_or("");
    if file_name.is_empty() || file_type.is_empty() {
        return Err(AppError::BadRequest("Missing fileName or fileType".to_string()));
    }

    let header_uid = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    let user = AuthUser::from_uid(header_uid.or(req.user_id.as_deref()))?;

    if file_type != PDF_MIME {
        return Err(AppError::BadRequest("Only PDF files allowed".to_string()));
    }

    let s3 = state.s3_client();
    let key = temp_upload_key(&user.uid, Utc::now(), file_name);
    let upload = s3.presign_upload(&key, file_type, s3.presign_ttl()).await?;

    tracing::info!(user_id = %user.uid, key = %upload.key, "Presigned relay upload");
    Ok(Json(upload))
}

/// Best-effort delete of one of the caller's relay objects
async fn delete_upload(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>> {
    let key = req
        .key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing key".to_string()))?;

    // Only relay objects may be removed through this route.
    if !is_relay_key(key) {
        return Err(AppError::BadRequest("Invalid key".to_string()));
    }
    if !is_own_relay_key(&user.uid, key) {
        tracing::warn!(user_id = %user.uid, key, "Rejected delete of another user's relay object");
        return Err(AppError::Forbidden("Key belongs to another user".to_string()));
    }

    match state.s3_client().delete_object(key).await {
        Ok(()) => Ok(Json(DeleteResponse {
            success: true,
            error: None,
        })),
        Err(e) => {
            tracing::warn!(key, "Relay delete failed: {}", e);
            Ok(Json(DeleteResponse {
                success: false,
                error: Some(e.to_string()),
            }))
        }
    }
}
