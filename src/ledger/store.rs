//! Credit wallet persistence
//!
//! Every mutation runs read-modify-write inside one SQLite transaction so
//! concurrent deductions for the same user serialize on the write lock.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::policy::CreditPolicy;
use super::types::{
    Balance, CreditRecord, CreditSource, CreditTransaction, Deduction, ToolType, TransactionKind,
};
use crate::error::{AppError, Result};

#[derive(sqlx::FromRow)]
struct AccountRow {
    free: i64,
    paid: i64,
    last_reset: String,
}

impl AccountRow {
    fn into_record(self) -> Result<CreditRecord> {
        let last_reset = DateTime::parse_from_rfc3339(&self.last_reset)
            .map_err(|e| AppError::Internal(format!("Corrupt last_reset timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(CreditRecord {
            free: u32::try_from(self.free).unwrap_or(0),
            paid: u32::try_from(self.paid).unwrap_or(0),
            last_reset,
        })
    }
}

/// Ledger entry to append alongside a wallet write
struct Entry<'e> {
    kind: TransactionKind,
    tool: Option<ToolType>,
    source: Option<CreditSource>,
    amount: i64,
    reference: Option<&'e str>,
}

/// Credit ledger backed by SQLite
#[derive(Clone)]
pub struct CreditLedger {
    pool: SqlitePool,
    policy: CreditPolicy,
}

impl CreditLedger {
    pub fn new(pool: SqlitePool, policy: CreditPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    /// Current balance, creating the wallet on first read
    pub async fn get_balance(&self, user_id: &str, tool: ToolType) -> Result<Balance> {
        self.get_balance_at(user_id, tool, Utc::now()).await
    }

    pub async fn get_balance_at(
        &self,
        user_id: &str,
        _tool: ToolType,
        now: DateTime<Utc>,
    ) -> Result<Balance> {
        let mut conn = self.pool.acquire().await?;
        let record = load_or_create(&mut *conn, &self.policy, user_id, now).await?;
        Ok(self.policy.balance(&record))
    }

    /// Time left before the free allowance may refill
    pub async fn time_until_reset(&self, user_id: &str, tool: ToolType) -> Result<chrono::Duration> {
        self.time_until_reset_at(user_id, tool, Utc::now()).await
    }

    pub async fn time_until_reset_at(
        &self,
        user_id: &str,
        _tool: ToolType,
        now: DateTime<Utc>,
    ) -> Result<chrono::Duration> {
        let mut conn = self.pool.acquire().await?;
        let record = load_or_create(&mut *conn, &self.policy, user_id, now).await?;
        Ok(self.policy.time_until_reset(&record, now))
    }

    /// Whether a deduction would succeed right now
    pub async fn can_deduct_at(&self, user_id: &str, _tool: ToolType, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let record = load_or_create(&mut *conn, &self.policy, user_id, now).await?;
        Ok(self.policy.available(&record, now) > 0)
    }

    /// Refill the free allowance if the cycle has elapsed
    pub async fn try_reset(&self, user_id: &str, tool: ToolType) -> Result<bool> {
        self.try_reset_at(user_id, tool, Utc::now()).await
    }

    pub async fn try_reset_at(&self, user_id: &str, tool: ToolType, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let mut record = load_or_create(&mut *tx, &self.policy, user_id, now).await?;

        if !self.policy.apply_reset(&mut record, now) {
            tx.commit().await?;
            return Ok(false);
        }

        store(&mut *tx, user_id, &record, now).await?;
        append(
            &mut *tx,
            user_id,
            &record,
            now,
            Entry {
                kind: TransactionKind::Reset,
                tool: Some(tool),
                source: Some(CreditSource::Free),
                amount: i64::from(self.policy.max_free),
                reference: None,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::debug!("Reset free credits for {}", user_id);
        Ok(true)
    }

    /// Spend one credit for `tool`, free before paid
    pub async fn deduct(&self, user_id: &str, tool: ToolType) -> Result<Deduction> {
        self.deduct_at(user_id, tool, Utc::now()).await
    }

    pub async fn deduct_at(&self, user_id: &str, tool: ToolType, now: DateTime<Utc>) -> Result<Deduction> {
        let mut tx = self.pool.begin().await?;
        let mut record = load_or_create(&mut *tx, &self.policy, user_id, now).await?;
        let before = record;

        let outcome = self.policy.debit(&mut record, now);

        let Some(source) = outcome.source else {
            tx.commit().await?;
            tracing::info!("Deduction refused for {}: no credits left", user_id);
            return Ok(Deduction {
                success: false,
                source: None,
                balance: self.policy.balance(&before),
            });
        };

        store(&mut *tx, user_id, &record, now).await?;
        if outcome.reset {
            let mut refilled = before;
            self.policy.apply_reset(&mut refilled, now);
            append(
                &mut *tx,
                user_id,
                &refilled,
                now,
                Entry {
                    kind: TransactionKind::Reset,
                    tool: Some(tool),
                    source: Some(CreditSource::Free),
                    amount: i64::from(self.policy.max_free),
                    reference: None,
                },
            )
            .await?;
        }
        append(
            &mut *tx,
            user_id,
            &record,
            now,
            Entry {
                kind: TransactionKind::Debit,
                tool: Some(tool),
                source: Some(source),
                amount: -1,
                reference: None,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::debug!("Deducted 1 {} credit from {} for {}", source.as_str(), user_id, tool);
        Ok(Deduction {
            success: true,
            source: Some(source),
            balance: self.policy.balance(&record),
        })
    }

    /// Add purchased credits in a standalone transaction
    pub async fn grant_paid(&self, user_id: &str, credits: u32, reference: &str) -> Result<Balance> {
        let mut tx = self.pool.begin().await?;
        let balance = grant_paid_with(&mut *tx, &self.policy, user_id, credits, reference, Utc::now()).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Most recent ledger entries for a user
    pub async fn list_transactions(&self, user_id: &str, limit: i64) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT id, user_id, kind, tool, source, amount, reference,
                   free_after, paid_after, created_at
            FROM credit_transactions
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Add purchased credits inside a caller-owned transaction
pub(crate) async fn grant_paid_with(
    conn: &mut SqliteConnection,
    policy: &CreditPolicy,
    user_id: &str,
    credits: u32,
    reference: &str,
    now: DateTime<Utc>,
) -> Result<Balance> {
    let mut record = load_or_create(conn, policy, user_id, now).await?;
    policy.credit_paid(&mut record, credits);

    store(conn, user_id, &record, now).await?;
    append(
        conn,
        user_id,
        &record,
        now,
        Entry {
            kind: TransactionKind::Purchase,
            tool: None,
            source: Some(CreditSource::Paid),
            amount: i64::from(credits),
            reference: Some(reference),
        },
    )
    .await?;

    tracing::info!("Granted {} paid credits to {} ({})", credits, user_id, reference);
    Ok(policy.balance(&record))
}

async fn load_or_create(
    conn: &mut SqliteConnection,
    policy: &CreditPolicy,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<CreditRecord> {
    let fresh = policy.fresh_record(now);
    let stamp = now.to_rfc3339();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO credit_accounts (user_id, free, paid, last_reset, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(i64::from(fresh.free))
    .bind(i64::from(fresh.paid))
    .bind(&stamp)
    .bind(&stamp)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT free, paid, last_reset FROM credit_accounts WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(policy.normalize(row.into_record()?))
}

async fn store(
    conn: &mut SqliteConnection,
    user_id: &str,
    record: &CreditRecord,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE credit_accounts
        SET free = ?, paid = ?, last_reset = ?, updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(i64::from(record.free))
    .bind(i64::from(record.paid))
    .bind(record.last_reset.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn append(
    conn: &mut SqliteConnection,
    user_id: &str,
    record: &CreditRecord,
    now: DateTime<Utc>,
    entry: Entry<'_>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_transactions
            (id, user_id, kind, tool, source, amount, reference, free_after, paid_after, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(entry.kind.as_str())
    .bind(entry.tool.map(|t| t.as_str()))
    .bind(entry.source.map(|s| s.as_str()))
    .bind(entry.amount)
    .bind(entry.reference)
    .bind(i64::from(record.free))
    .bind(i64::from(record.paid))
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
