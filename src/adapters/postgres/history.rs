//! `subscription_histories` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::billing::{HistoryAction, HistoryEntry};
use crate::domain::foundation::{DomainError, ErrorCode, HistoryId, Timestamp, UserId};
use crate::ports::{AppendResult, HistoryRepository};

use super::store::{db_error, invalid_column, parse_plan, PostgresBillingStore};

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    user_id: Uuid,
    stripe_subscription_id: Option<String>,
    action: String,
    from_plan: Option<String>,
    to_plan: String,
    amount: Option<i64>,
    currency: String,
    notes: Option<String>,
    metadata: Value,
    webhook_event_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DomainError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let metadata = match row.metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(invalid_column("history metadata", &other.to_string())),
        };
        Ok(HistoryEntry {
            id: HistoryId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            stripe_subscription_id: row.stripe_subscription_id,
            action: HistoryAction::parse(&row.action)
                .ok_or_else(|| invalid_column("history action", &row.action))?,
            from_plan: row.from_plan.as_deref().map(parse_plan).transpose()?,
            to_plan: parse_plan(&row.to_plan)?,
            amount: row.amount,
            currency: row.currency,
            notes: row.notes,
            metadata,
            webhook_event_id: row.webhook_event_id,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

const COLUMNS: &str = "id, user_id, stripe_subscription_id, action, from_plan, to_plan, amount, \
                       currency, notes, metadata, webhook_event_id, created_at";

#[async_trait]
impl HistoryRepository for PostgresBillingStore {
    async fn insert(&self, entry: HistoryEntry) -> Result<AppendResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_histories (
                id, user_id, stripe_subscription_id, action, from_plan, to_plan, amount,
                currency, notes, metadata, webhook_event_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (webhook_event_id) WHERE webhook_event_id IS NOT NULL DO NOTHING
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(&entry.stripe_subscription_id)
        .bind(entry.action.as_str())
        .bind(entry.from_plan.map(|p| p.as_str()))
        .bind(entry.to_plan.as_str())
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(&entry.notes)
        .bind(Value::Object(entry.metadata.clone()))
        .bind(&entry.webhook_event_id)
        .bind(entry.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert history entry"))?;

        Ok(if result.rows_affected() == 0 {
            AppendResult::Skipped
        } else {
            AppendResult::Written
        })
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<HistoryEntry>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscription_histories WHERE webhook_event_id = $1",
            COLUMNS
        );
        let row: Option<HistoryRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load history entry"))?;

        row.map(HistoryEntry::try_from).transpose()
    }

    async fn find_recent_transition(
        &self,
        entry: &HistoryEntry,
        since: Timestamp,
    ) -> Result<Option<HistoryEntry>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM subscription_histories
            WHERE user_id = $1
              AND action = $2
              AND from_plan IS NOT DISTINCT FROM $3
              AND to_plan = $4
              AND created_at >= $5
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            COLUMNS
        );
        let row: Option<HistoryRow> = sqlx::query_as(&sql)
            .bind(entry.user_id.as_uuid())
            .bind(entry.action.as_str())
            .bind(entry.from_plan.map(|p| p.as_str()))
            .bind(entry.to_plan.as_str())
            .bind(since.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to search recent history"))?;

        row.map(HistoryEntry::try_from).transpose()
    }

    async fn find_recent_cancel(
        &self,
        user_id: &UserId,
        stripe_subscription_id: &str,
        since: Timestamp,
    ) -> Result<Option<HistoryEntry>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM subscription_histories
            WHERE user_id = $1
              AND action = 'canceled'
              AND stripe_subscription_id = $2
              AND created_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            COLUMNS
        );
        let row: Option<HistoryRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .bind(stripe_subscription_id)
            .bind(since.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to search recent cancellations"))?;

        row.map(HistoryEntry::try_from).transpose()
    }

    async fn update_annotations(&self, entry: &HistoryEntry) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_histories
            SET metadata = $2, notes = $3, webhook_event_id = $4
            WHERE id = $1
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(Value::Object(entry.metadata.clone()))
        .bind(&entry.notes)
        .bind(&entry.webhook_event_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update history entry"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::NotFound, "History entry not found"));
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscription_histories WHERE user_id = $1 ORDER BY created_at",
            COLUMNS
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list history"))?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }
}
