//! Payment order persistence

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::PaymentError;
use crate::error::Result;
use crate::ledger::{grant_paid_with, CreditPolicy};

/// Stored order row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub order_id: String,
    pub user_id: String,
    pub plan_id: String,
    pub credits: i64,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to record a freshly created order
#[derive(Debug, Clone)]
pub struct NewOrder<'n> {
    pub order_id: &'n str,
    pub user_id: &'n str,
    pub plan_id: &'n str,
    pub credits: u32,
    pub amount: u64,
    pub currency: &'n str,
}

/// Outcome of completing an order
#[derive(Debug, Clone)]
pub struct Completion {
    /// Credits were granted by this call (false on a repeated verify)
    pub credited: bool,
    pub order: PaymentOrder,
}

/// Payment order repository
pub struct PaymentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PaymentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a created order
    pub async fn insert(&self, order: &NewOrder<'_>) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO payment_orders
                (order_id, user_id, plan_id, credits, amount, currency, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'created', ?, ?)
            "#,
        )
        .bind(order.order_id)
        .bind(order.user_id)
        .bind(order.plan_id)
        .bind(i64::from(order.credits))
        .bind(order.amount as i64)
        .bind(order.currency)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Get an order by id
    pub async fn get(&self, order_id: &str) -> Result<Option<PaymentOrder>> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT order_id, user_id, plan_id, credits, amount, currency, status,
                   payment_id, created_at, updated_at
            FROM payment_orders
            WHERE order_id = ?
            "#,
        )
        .bind(order_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Orders placed by a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<PaymentOrder>> {
        let orders = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT order_id, user_id, plan_id, credits, amount, currency, status,
                   payment_id, created_at, updated_at
            FROM payment_orders
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Mark an order paid and grant its credits, exactly once
    pub async fn complete(
        &self,
        order_id: &str,
        payment_id: &str,
        policy: &CreditPolicy,
    ) -> Result<Completion> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = 'paid', payment_id = ?, updated_at = ?
            WHERE order_id = ? AND status != 'paid'
            "#,
        )
        .bind(payment_id)
        .bind(now.to_rfc3339())
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT order_id, user_id, plan_id, credits, amount, currency, status,
                   payment_id, created_at, updated_at
            FROM payment_orders
            WHERE order_id = ?
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PaymentError::UnknownOrder(order_id.to_string()))?;

        let credited = updated == 1;
        if credited {
            let credits = u32::try_from(order.credits).unwrap_or(0);
            grant_paid_with(&mut *tx, policy, &order.user_id, credits, order_id, now).await?;
        }

        tx.commit().await?;
        Ok(Completion { credited, order })
    }
}
