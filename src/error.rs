//! Error types for the Nebula PDF server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::payments::PaymentError;
use crate::pdf::PdfError;
use crate::viewer::{RenderError, ViewerError};

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Insufficient credits: {0}")]
    PaymentRequired(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("S3 error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Viewer error: {0}")]
    Viewer(#[from] ViewerError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Presign failed: {0}")]
    Presign(String),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::PaymentRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "insufficient_credits", msg.clone())
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    format!("Server configuration error: {}", msg),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                match e {
                    StorageError::ObjectNotFound(key) => {
                        (StatusCode::NOT_FOUND, "not_found", format!("Object not found: {}", key))
                    }
                    StorageError::AccessDenied(_) => {
                        (StatusCode::FORBIDDEN, "access_denied", "Access denied".to_string())
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                    ),
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Gateway(e) => match e {
                GatewayError::NotConfigured(what) => {
                    tracing::error!("Gateway not configured: {}", what);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "configuration_error",
                        format!("Server configuration error: Missing {}", what),
                    )
                }
                GatewayError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "bad_request", msg.clone())
                }
                // Vendor text is surfaced verbatim so the user sees why the vendor refused.
                other => {
                    tracing::error!("Vendor error: {}", other);
                    (StatusCode::INTERNAL_SERVER_ERROR, "vendor_error", other.to_string())
                }
            },
            AppError::Pdf(e) => pdf_parts(e),
            AppError::Payment(e) => match e {
                PaymentError::InvalidSignature => {
                    (StatusCode::BAD_REQUEST, "invalid_signature", e.to_string())
                }
                PaymentError::UnknownPlan(_) => (StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
                PaymentError::UnknownOrder(_) => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
                PaymentError::Provider(msg) => {
                    tracing::error!("Payment provider error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "payment_error",
                        "Internal Server Error".to_string(),
                    )
                }
            },
            AppError::Viewer(e) => match e {
                ViewerError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
                ViewerError::PageOutOfRange { .. }
                | ViewerError::InvalidStroke(_)
                | ViewerError::Render(RenderError::InvalidViewport(_)) => {
                    (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
                }
                ViewerError::Render(RenderError::Cancelled) => {
                    (StatusCode::CONFLICT, "render_cancelled", e.to_string())
                }
                ViewerError::TooManySessions => {
                    (StatusCode::SERVICE_UNAVAILABLE, "too_many_sessions", e.to_string())
                }
                ViewerError::Pdf(inner) => pdf_parts(inner),
                _ => {
                    tracing::error!("Viewer error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "viewer_error",
                        "Failed to render annotations".to_string(),
                    )
                }
            },
            AppError::Json(e) => (StatusCode::BAD_REQUEST, "bad_request", format!("Invalid JSON: {}", e)),
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "io_error", "IO error".to_string())
            }
        }
    }
}

fn pdf_parts(e: &PdfError) -> (StatusCode, &'static str, String) {
    match e {
        PdfError::Load(_) | PdfError::InvalidInput(_) | PdfError::Image(_) => {
            (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
        }
        _ => {
            tracing::error!("PDF error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "pdf_error",
                "Failed to process PDF".to_string(),
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(ErrorResponse {
            success: matches!(self, AppError::Payment(PaymentError::InvalidSignature)).then_some(false),
            error: message,
            code,
            details: if cfg!(debug_assertions) && status.is_server_error() {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
