//! `payment_transactions` table. First writer wins on the ledger key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::billing::{LedgerEntry, LedgerKind, LedgerStatus, MonthlyRevenue};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{AppendResult, LedgerRepository};

use super::store::{db_error, invalid_column, timestamp, PostgresBillingStore};

#[derive(Debug, sqlx::FromRow)]
struct RevenueRow {
    month: String,
    currency: String,
    amount: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    stripe_payment_intent_id: String,
    user_id: Uuid,
    stripe_subscription_id: Option<String>,
    stripe_charge_id: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    kind: String,
    paid_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            status: LedgerStatus::parse(&row.status)
                .ok_or_else(|| invalid_column("ledger status", &row.status))?,
            kind: LedgerKind::parse(&row.kind)
                .ok_or_else(|| invalid_column("ledger kind", &row.kind))?,
            key: row.stripe_payment_intent_id,
            user_id: UserId::from_uuid(row.user_id),
            stripe_subscription_id: row.stripe_subscription_id,
            charge_id: row.stripe_charge_id,
            amount: row.amount,
            currency: row.currency,
            paid_at: timestamp(row.paid_at),
            metadata: row.metadata,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

const COLUMNS: &str = "stripe_payment_intent_id, user_id, stripe_subscription_id, stripe_charge_id, \
                       amount, currency, status, kind, paid_at, metadata, created_at";

#[async_trait]
impl LedgerRepository for PostgresBillingStore {
    async fn append(&self, entry: LedgerEntry) -> Result<AppendResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                stripe_payment_intent_id, user_id, stripe_subscription_id, stripe_charge_id,
                amount, currency, status, kind, paid_at, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (stripe_payment_intent_id) DO NOTHING
            "#,
        )
        .bind(&entry.key)
        .bind(entry.user_id.as_uuid())
        .bind(&entry.stripe_subscription_id)
        .bind(&entry.charge_id)
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(entry.status.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.paid_at.map(|t| *t.as_datetime()))
        .bind(&entry.metadata)
        .bind(entry.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to append ledger entry"))?;

        Ok(if result.rows_affected() == 0 {
            AppendResult::Skipped
        } else {
            AppendResult::Written
        })
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE stripe_payment_intent_id = $1",
            COLUMNS
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load ledger entry"))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payment_transactions WHERE user_id = $1 ORDER BY created_at",
            COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list ledger entries"))?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    async fn monthly_revenue(&self, since: Timestamp) -> Result<Vec<MonthlyRevenue>, DomainError> {
        let rows: Vec<RevenueRow> = sqlx::query_as(
            r#"
            SELECT to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM') AS month,
                   currency,
                   SUM(amount)::BIGINT AS amount
            FROM payment_transactions
            WHERE status = $1 AND created_at >= $2
            GROUP BY month, currency
            ORDER BY month, currency
            "#,
        )
        .bind(LedgerStatus::Succeeded.as_str())
        .bind(since.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to sum revenue"))?;

        Ok(rows
            .into_iter()
            .map(|row| MonthlyRevenue {
                month: row.month,
                currency: row.currency,
                amount: row.amount,
            })
            .collect())
    }
}
