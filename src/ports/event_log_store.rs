//! EventLogStore port - Durable record of every inbound provider event.
//!
//! The store is keyed by provider event id. Stripe delivers at least once,
//! so `ingest` must tolerate the same id arriving again: the existing record
//! is reset to `pending` instead of a second one being created.

use async_trait::async_trait;

use crate::domain::billing::{EventLogRecord, EventLogStatus};
use crate::domain::foundation::DomainError;

/// Port for the inbound event log.
///
/// Implementations should use the event id as PRIMARY KEY so concurrent
/// deliveries of one event converge on a single row.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Creates the record in `pending`, or resets an existing one to `pending`
    /// clearing its error and processed timestamp.
    async fn ingest(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventLogRecord, DomainError>;

    /// Marks the start of a processing attempt.
    async fn mark_processing(&self, event_id: &str) -> Result<(), DomainError>;

    /// Marks the event as handled (including recognized no-ops).
    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError>;

    /// Records a failed attempt with its reason.
    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), DomainError>;

    /// Looks up a record by event id.
    async fn find(&self, event_id: &str) -> Result<Option<EventLogRecord>, DomainError>;

    /// Most recent records first, optionally filtered by status and type.
    async fn list(
        &self,
        status: Option<EventLogStatus>,
        event_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EventLogRecord>, DomainError>;
}
