//! HistoryRepository port - Append-only plan transition history.

use async_trait::async_trait;

use crate::domain::billing::HistoryEntry;
use crate::domain::foundation::{DomainError, Timestamp, UserId};

use super::ledger_repository::AppendResult;

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Inserts an entry.
    ///
    /// Returns `Skipped` when another entry already carries the same
    /// webhook event id.
    async fn insert(&self, entry: HistoryEntry) -> Result<AppendResult, DomainError>;

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<HistoryEntry>, DomainError>;

    /// Latest entry with the same user, action, from-plan and to-plan
    /// created at or after `since`.
    async fn find_recent_transition(
        &self,
        entry: &HistoryEntry,
        since: Timestamp,
    ) -> Result<Option<HistoryEntry>, DomainError>;

    /// Latest `canceled` entry for the user and provider subscription
    /// created at or after `since`.
    async fn find_recent_cancel(
        &self,
        user_id: &UserId,
        stripe_subscription_id: &str,
        since: Timestamp,
    ) -> Result<Option<HistoryEntry>, DomainError>;

    /// Persists new metadata, notes and event id of an existing entry.
    async fn update_annotations(&self, entry: &HistoryEntry) -> Result<(), DomainError>;

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, DomainError>;
}
