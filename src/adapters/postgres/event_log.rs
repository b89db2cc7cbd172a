//! `webhook_logs` table: one row per provider event id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::billing::{EventLogRecord, EventLogStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::EventLogStore;

use super::store::{db_error, invalid_column, timestamp, PostgresBillingStore};

#[derive(Debug, sqlx::FromRow)]
struct WebhookLogRow {
    stripe_event_id: String,
    event_type: String,
    payload: serde_json::Value,
    status: String,
    error_message: Option<String>,
    attempts: i32,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookLogRow> for EventLogRecord {
    type Error = DomainError;

    fn try_from(row: WebhookLogRow) -> Result<Self, Self::Error> {
        let status = EventLogStatus::parse(&row.status)
            .ok_or_else(|| invalid_column("webhook status", &row.status))?;
        Ok(EventLogRecord {
            event_id: row.stripe_event_id,
            event_type: row.event_type,
            payload: row.payload,
            status,
            error_message: row.error_message,
            processed_at: timestamp(row.processed_at),
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const RETURNING: &str = "stripe_event_id, event_type, payload, status, error_message, attempts, \
                         processed_at, created_at, updated_at";

fn ensure_found(result: sqlx::postgres::PgQueryResult, event_id: &str) -> Result<(), DomainError> {
    if result.rows_affected() == 0 {
        return Err(DomainError::new(
            ErrorCode::EventNotFound,
            format!("Webhook event {} not found", event_id),
        ));
    }
    Ok(())
}

#[async_trait]
impl EventLogStore for PostgresBillingStore {
    async fn ingest(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventLogRecord, DomainError> {
        let sql = format!(
            r#"
            INSERT INTO webhook_logs (stripe_event_id, event_type, payload, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                payload = EXCLUDED.payload,
                status = 'pending',
                error_message = NULL,
                processed_at = NULL,
                updated_at = NOW()
            RETURNING {}
            "#,
            RETURNING
        );

        let row: WebhookLogRow = sqlx::query_as(&sql)
            .bind(event_id)
            .bind(event_type)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to ingest webhook event"))?;

        row.try_into()
    }

    async fn mark_processing(&self, event_id: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_logs
            SET status = 'processing', attempts = attempts + 1, updated_at = NOW()
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark webhook processing"))?;

        ensure_found(result, event_id)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_logs
            SET status = 'processed', error_message = NULL, processed_at = NOW(), updated_at = NOW()
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark webhook processed"))?;

        ensure_found(result, event_id)
    }

    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_logs
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE stripe_event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark webhook failed"))?;

        ensure_found(result, event_id)
    }

    async fn find(&self, event_id: &str) -> Result<Option<EventLogRecord>, DomainError> {
        let sql = format!("SELECT {} FROM webhook_logs WHERE stripe_event_id = $1", RETURNING);
        let row: Option<WebhookLogRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load webhook event"))?;

        row.map(EventLogRecord::try_from).transpose()
    }

    async fn list(
        &self,
        status: Option<EventLogStatus>,
        event_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EventLogRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM webhook_logs \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR event_type = $2) \
             ORDER BY created_at DESC, stripe_event_id DESC \
             LIMIT $3",
            RETURNING
        );
        let rows: Vec<WebhookLogRow> = sqlx::query_as(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(event_type)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list webhook events"))?;

        rows.into_iter().map(EventLogRecord::try_from).collect()
    }
}
