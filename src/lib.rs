//! Nebula PDF Server
//!
//! Server-side half of Nebula PDF: the per-user credit ledger, the relay
//! bucket for large uploads, the credit-gated vendor gateway (compress,
//! encrypt, decrypt), credit pack payments, file history and profiles,
//! structural PDF tools, and viewer sessions with ink annotations.
//!
//! # Modules
//!
//! - `ledger`: free/paid credit wallets with a daily free refill
//! - `gateway`: iLovePDF and PDF.co clients behind one trait
//! - `pdf`: merge, split, organize, stamp and convert with lopdf
//! - `viewer`: annotation history, scroll tracking and overlay rendering

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod history;
pub mod ledger;
pub mod payments;
pub mod pdf;
pub mod routes;
pub mod state;
pub mod storage;
pub mod viewer;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full HTTP application
pub fn app(state: AppState) -> Router {
    let max_upload_mb = state.config().server.max_upload_mb;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .nest("/api/v1/profile", routes::profile::router())
        .nest("/api/v1/credits", routes::credits::router())
        .nest("/api/v1/uploads", routes::uploads::router())
        .nest("/api/v1/gateway", routes::gateway::router(max_upload_mb))
        .nest("/api/v1/payments", routes::payments::router())
        .nest("/api/v1/history", routes::history::router(max_upload_mb))
        .nest("/api/v1/pdf", routes::pdf::router(max_upload_mb))
        .nest("/api/v1/viewer", routes::viewer::router(max_upload_mb))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
