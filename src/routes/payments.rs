//! Credit pack purchase endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::ledger::{Balance, ToolType};
use crate::payments::{
    find_plan, verify_signature, CreditPlan, NewOrder, PaymentError, PaymentOrder,
    PaymentRepository, PLANS,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub plan_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub key_id: String,
    pub amount: u64,
    pub currency: String,
}

/// Fields the checkout widget hands back after payment
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub razorpay_order_id: Option<String>,
    #[serde(default)]
    pub razorpay_payment_id: Option<String>,
    #[serde(default)]
    pub razorpay_signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub credited: bool,
    pub balance: Balance,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: &'static [CreditPlan],
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<PaymentOrder>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/orders", get(list_orders).post(create_order))
        .route("/verify", post(verify_payment))
}

async fn list_plans() -> Json<PlansResponse> {
    Json(PlansResponse { plans: &PLANS })
}

async fn list_orders(State(state): State<AppState>, user: AuthUser) -> Result<Json<OrdersResponse>> {
    let orders = PaymentRepository::new(state.db()).list_for_user(&user.uid).await?;
    Ok(Json(OrdersResponse { orders }))
}

/// Create a Razorpay order for a plan and remember who placed it
async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let plan_id = req
        .plan_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Plan is required".to_string()))?;
    let plan = find_plan(plan_id)?;

    let razorpay = state
        .razorpay()
        .ok_or_else(|| AppError::Configuration("Missing Razorpay Keys".to_string()))?;

    let currency = &state.config().payments.currency;
    let receipt = format!("receipt_{}", &Uuid::new_v4().simple().to_string()[..12]);
    let order = razorpay
        .create_order(plan.amount_paise(), currency, &receipt)
        .await?;

    PaymentRepository::new(state.db())
        .insert(&NewOrder {
            order_id: &order.id,
            user_id: &user.uid,
            plan_id: plan.id,
            credits: plan.credits,
            amount: order.amount,
            currency: &order.currency,
        })
        .await?;

    tracing::info!(user_id = %user.uid, order_id = %order.id, plan = plan.id, "Created payment order");

    Ok(Json(CreateOrderResponse {
        order_id: order.id,
        key_id: razorpay.key_id().to_string(),
        amount: order.amount,
        currency: order.currency,
    }))
}

/// Check the checkout signature and grant the order's credits once
async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let razorpay = state
        .razorpay()
        .ok_or_else(|| AppError::Configuration("Missing Razorpay Keys".to_string()))?;

    let (Some(order_id), Some(payment_id), Some(signature)) = (
        req.razorpay_order_id.as_deref(),
        req.razorpay_payment_id.as_deref(),
        req.razorpay_signature.as_deref(),
    ) else {
        return Err(AppError::BadRequest("Missing payment details".to_string()));
    };

    if !verify_signature(razorpay.key_secret(), order_id, payment_id, signature) {
        tracing::warn!(order_id, payment_id, "Payment signature mismatch");
        return Err(PaymentError::InvalidSignature.into());
    }

    let completion = PaymentRepository::new(state.db())
        .complete(order_id, payment_id, state.ledger().policy())
        .await?;
    let balance = state
        .ledger()
        .get_balance(&completion.order.user_id, ToolType::Compress)
        .await?;

    tracing::info!(
        order_id,
        payment_id,
        user_id = %completion.order.user_id,
        credited = completion.credited,
        "Payment verified"
    );

    Ok(Json(VerifyResponse {
        success: true,
        credited: completion.credited,
        balance,
    }))
}
