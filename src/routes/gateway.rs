//! Credit-gated vendor operations
//!
//! Each route accepts either a multipart upload (`file`, `password`,
//! `compressionLevel`) or a JSON body pointing at a relay object
//! (`fileUrl`, `fileName`, `password`, `compressionLevel`, `key`).

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Json, Multipart, Request, State},
    http::header,
    response::Response,
    routing::post,
    Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::gateway::{fetch_remote_file, CompressionLevel, GatewayOperation, InputFile, OperationKind};
use crate::routes::{pdf_attachment, MultipartForm};
use crate::state::AppState;
use crate::storage::{has_pdf_signature, is_own_relay_key, validate_pdf_upload};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRequest {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub compression_level: Option<String>,
    /// Relay object to delete once the operation finishes
    #[serde(default)]
    pub key: Option<String>,
}

/// Where the input bytes come from
enum Source {
    Upload(InputFile),
    Remote { url: String, name: String },
}

struct GatewayRequest {
    op: GatewayOperation,
    source: Source,
    cleanup_key: Option<String>,
}

pub fn router(max_upload_mb: usize) -> Router<AppState> {
    Router::new()
        .route("/compress", post(compress))
        .route("/encrypt", post(encrypt))
        .route("/decrypt", post(decrypt))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}

async fn compress(State(state): State<AppState>, user: AuthUser, req: Request) -> Result<Response> {
    run(state, user, OperationKind::Compress, req).await
}

async fn encrypt(State(state): State<AppState>, user: AuthUser, req: Request) -> Result<Response> {
    run(state, user, OperationKind::Encrypt, req).await
}

async fn decrypt(State(state): State<AppState>, user: AuthUser, req: Request) -> Result<Response> {
    run(state, user, OperationKind::Decrypt, req).await
}

async fn run(state: AppState, user: AuthUser, kind: OperationKind, req: Request) -> Result<Response> {
    let request = parse_request(&state, &user, kind, req).await?;
    let cleanup_key = request.cleanup_key.clone();

    let result = execute(&state, &user, request).await;

    if let Some(key) = cleanup_key {
        state.s3_client().spawn_cleanup(key);
    }
    result
}

async fn execute(state: &AppState, user: &AuthUser, request: GatewayRequest) -> Result<Response> {
    let tool = request.op.kind().tool();

    if let Source::Upload(input) = &request.source {
        ensure_pdf_bytes(&input.bytes)?;
    }

    if !state.ledger().can_deduct_at(&user.uid, tool, chrono::Utc::now()).await? {
        tracing::info!(user_id = %user.uid, tool = %tool, "Rejected: no credits left");
        return Err(AppError::PaymentRequired(
            "No credits left. Wait for the daily reset or buy a credit pack.".to_string(),
        ));
    }

    let input = match request.source {
        Source::Upload(input) => input,
        Source::Remote { url, name } => {
            let max_mb = state.config().server.max_upload_mb;
            let input = fetch_remote_file(state.http(), &url, &name, max_mb).await?;
            ensure_pdf_bytes(&input.bytes)?;
            input
        }
    };

    let processed = state.gateway().process(&request.op, input).await?;

    let deduction = state.ledger().deduct(&user.uid, tool).await?;
    if !deduction.success {
        // Lost a race with another request between the pre-check and now.
        tracing::warn!(user_id = %user.uid, tool = %tool, "Credit deduction failed after vendor success");
    }

    tracing::info!(
        user_id = %user.uid,
        tool = %tool,
        file_name = %processed.file_name,
        size = processed.bytes.len(),
        "Gateway operation complete"
    );
    pdf_attachment(&processed.file_name, processed.bytes)
}

fn ensure_pdf_bytes(bytes: &[u8]) -> Result<()> {
    if has_pdf_signature(bytes) {
        Ok(())
    } else {
        Err(AppError::BadRequest("File must be a PDF document".to_string()))
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn parse_request(
    state: &AppState,
    user: &AuthUser,
    kind: OperationKind,
    req: Request,
) -> Result<GatewayRequest> {
    if is_multipart(&req) {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        parse_multipart(state, kind, MultipartForm::read(multipart).await?)
    } else {
        let Json(body) = Json::<RemoteFileRequest>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let key = owned_relay_key(&user.uid, body.key.clone());
        parse_remote(kind, &user.uid, body).map_err(|e| {
            // The relay object is useless once the request is rejected.
            if let Some(key) = key {
                state.s3_client().spawn_cleanup(key);
            }
            e
        })
    }
}

fn parse_multipart(state: &AppState, kind: OperationKind, mut form: MultipartForm) -> Result<GatewayRequest> {
    let password = form.text("password").map(str::to_string);
    let level = form.text("compressionLevel").map(CompressionLevel::parse);
    let file = form.take_file("file");

    let op = operation(kind, password, level, file.is_some())?;
    let file = file.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    validate_pdf_upload(
        &file.file_name,
        &file.content_type,
        file.bytes.len(),
        state.config().server.max_upload_mb,
    )?;

    Ok(GatewayRequest {
        op,
        source: Source::Upload(InputFile {
            name: file.file_name,
            bytes: file.bytes,
        }),
        cleanup_key: None,
    })
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// The cleanup key, kept only when it is one of the caller's relay objects
fn owned_relay_key(user_id: &str, key: Option<String>) -> Option<String> {
    let key = non_blank(key)?;
    if is_own_relay_key(user_id, &key) {
        Some(key)
    } else {
        tracing::warn!(user_id, key = %key, "Ignoring cleanup key outside the caller's relay prefix");
        None
    }
}

fn parse_remote(kind: OperationKind, user_id: &str, body: RemoteFileRequest) -> Result<GatewayRequest> {
    let cleanup_key = owned_relay_key(user_id, body.key);
    let url = non_blank(body.file_url);
    let name = non_blank(body.file_name);
    let level = body.compression_level.as_deref().map(CompressionLevel::parse);

    let op = operation(kind, body.password, level, url.is_some() && name.is_some())?;
    let (url, name) = url
        .zip(name)
        .ok_or_else(|| AppError::BadRequest("Missing fileUrl or fileName".to_string()))?;

    Ok(GatewayRequest {
        op,
        source: Source::Remote { url, name },
        cleanup_key,
    })
}

/// Build the operation, checking the fields it needs
fn operation(
    kind: OperationKind,
    password: Option<String>,
    level: Option<CompressionLevel>,
    has_file: bool,
) -> Result<GatewayOperation> {
    match kind {
        OperationKind::Compress => Ok(GatewayOperation::Compress {
            level: level.unwrap_or_default(),
        }),
        OperationKind::Encrypt | OperationKind::Decrypt => {
            let password = password
                .filter(|p| !p.is_empty() && has_file)
                .ok_or_else(|| AppError::BadRequest("Missing file or password".to_string()))?;
            Ok(match kind {
                OperationKind::Encrypt => GatewayOperation::Encrypt { password },
                _ => GatewayOperation::Decrypt { password },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_required_for_encrypt() {
        let err = operation(OperationKind::Encrypt, None, None, true).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Missing file or password");

        let err = operation(OperationKind::Decrypt, Some("pw".into()), None, false).unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Missing file or password");
    }

    #[test]
    fn test_compress_defaults_to_medium() {
        let op = operation(OperationKind::Compress, None, None, true).unwrap();
        assert_eq!(op, GatewayOperation::Compress { level: CompressionLevel::Medium });
    }

    #[test]
    fn test_remote_request_requires_url_and_name() {
        let body = RemoteFileRequest {
            file_url: Some("https://files.example.com/temp/u1/1_a.pdf".into()),
            ..Default::default()
        };
        let err = parse_remote(OperationKind::Compress, "u1", body).err().unwrap();
        assert_eq!(err.to_string(), "Bad request: Missing fileUrl or fileName");
    }

    fn remote_with_key(key: &str) -> RemoteFileRequest {
        RemoteFileRequest {
            file_url: Some("https://files.example.com/a.pdf".into()),
            file_name: Some("a.pdf".into()),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_only_own_relay_keys_are_cleaned_up() {
        let history = parse_remote(OperationKind::Compress, "u1", remote_with_key("users/u1/history/x_a.pdf")).unwrap();
        assert!(history.cleanup_key.is_none());

        let foreign = parse_remote(OperationKind::Compress, "u1", remote_with_key("temp/u2/1_a.pdf")).unwrap();
        assert!(foreign.cleanup_key.is_none());

        let own = parse_remote(OperationKind::Compress, "u1", remote_with_key(" temp/u1/1_a.pdf ")).unwrap();
        assert_eq!(own.cleanup_key.as_deref(), Some("temp/u1/1_a.pdf"));
    }
}
