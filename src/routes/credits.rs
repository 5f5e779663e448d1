//! Credit balance endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::ledger::{Balance, CreditTransaction, ToolType};
use crate::state::AppState;

const DEFAULT_TRANSACTION_LIMIT: i64 = 50;
const MAX_TRANSACTION_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ToolQuery {
    #[serde(default)]
    pub tool: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub tool: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub free: u32,
    pub paid: u32,
    pub total: u32,
    pub last_reset: DateTime<Utc>,
    pub ms_until_reset: i64,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

#[derive(Debug, Serialize)]
pub struct DeductResponse {
    pub success: bool,
    pub balance: Balance,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<CreditTransaction>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_credits))
        .route("/reset", post(reset_credits))
        .route("/deduct", post(deduct_credit))
        .route("/transactions", get(list_transactions))
}

/// Gated tool named by a request; compress when omitted
fn parse_tool(tool: Option<&str>) -> Result<ToolType> {
    match tool.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tool) => tool.parse().map_err(AppError::BadRequest),
        None => Ok(ToolType::Compress),
    }
}

async fn get_credits(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ToolQuery>,
) -> Result<Json<CreditsResponse>> {
    let tool = parse_tool(query.tool.as_deref())?;
    let now = Utc::now();
    let ledger = state.ledger();

    let balance = ledger.get_balance_at(&user.uid, tool, now).await?;
    let until_reset = ledger.time_until_reset_at(&user.uid, tool, now).await?;

    Ok(Json(CreditsResponse {
        free: balance.free,
        paid: balance.paid,
        total: balance.total,
        last_reset: balance.last_reset,
        ms_until_reset: until_reset.num_milliseconds().max(0),
    }))
}

async fn reset_credits(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ToolRequest>,
) -> Result<Json<ResetResponse>> {
    let tool = parse_tool(req.tool.as_deref())?;
    let reset = state.ledger().try_reset(&user.uid, tool).await?;
    Ok(Json(ResetResponse { reset }))
}

async fn deduct_credit(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ToolRequest>,
) -> Result<Json<DeductResponse>> {
    let tool = parse_tool(req.tool.as_deref())?;
    let deduction = state.ledger().deduct(&user.uid, tool).await?;

    if !deduction.success {
        return Err(AppError::PaymentRequired(
            "No credits left. Wait for the daily reset or buy a credit pack.".to_string(),
        ));
    }

    Ok(Json(DeductResponse {
        success: true,
        balance: deduction.balance,
    }))
}

async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .clamp(1, MAX_TRANSACTION_LIMIT);
    let transactions = state.ledger().list_transactions(&user.uid, limit).await?;
    Ok(Json(TransactionsResponse { transactions }))
}
