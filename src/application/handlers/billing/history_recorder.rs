//! HistoryRecorder - Idempotent writer for plan transition history.
//!
//! Duplicate detection, in order:
//! 1. The webhook event id, when present, is authoritative.
//! 2. A `canceled` entry merges into a cancel of the same subscription
//!    recorded within the last 24 hours.
//! 3. Entries without an event id are dropped when the same transition was
//!    recorded within the last 5 minutes.
//!
//! History is an audit trail: failures are logged and never abort the
//! mutation that produced the entry.

use std::sync::Arc;

use crate::domain::billing::{
    HistoryAction, HistoryEntry, CANCEL_MERGE_WINDOW_HOURS, DUPLICATE_WINDOW_MINUTES,
};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{AppendResult, HistoryRepository};

/// What happened to a recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Written,
    /// Folded into an earlier cancel of the same subscription.
    Merged,
    Duplicate,
    /// Storage failed; already logged.
    Failed,
}

#[derive(Clone)]
pub struct HistoryRecorder {
    repository: Arc<dyn HistoryRepository>,
}

impl HistoryRecorder {
    pub fn new(repository: Arc<dyn HistoryRepository>) -> Self {
        Self { repository }
    }

    /// Records `entry` unless it duplicates one already stored.
    pub async fn record(&self, entry: HistoryEntry) -> HistoryOutcome {
        let action = entry.action;
        let user_id = entry.user_id;
        match self.try_record(entry).await {
            Ok(outcome) => {
                tracing::debug!(
                    user_id = %user_id,
                    action = action.as_str(),
                    outcome = ?outcome,
                    "History entry recorded"
                );
                outcome
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    action = action.as_str(),
                    error = %e,
                    "Failed to record subscription history"
                );
                HistoryOutcome::Failed
            }
        }
    }

    /// Records `entry` without the time-window checks.
    ///
    /// Used where a second row is intended, such as account deletion.
    pub async fn record_unchecked(&self, entry: HistoryEntry) -> HistoryOutcome {
        let user_id = entry.user_id;
        match self.repository.insert(entry).await {
            Ok(AppendResult::Written) => HistoryOutcome::Written,
            Ok(AppendResult::Skipped) => HistoryOutcome::Duplicate,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to record subscription history");
                HistoryOutcome::Failed
            }
        }
    }

    async fn try_record(&self, entry: HistoryEntry) -> Result<HistoryOutcome, DomainError> {
        if let Some(event_id) = &entry.webhook_event_id {
            if self.repository.find_by_event_id(event_id).await?.is_some() {
                return Ok(HistoryOutcome::Duplicate);
            }
        }

        let now = Timestamp::now();

        if entry.action == HistoryAction::Canceled {
            if let Some(stripe_subscription_id) = &entry.stripe_subscription_id {
                let since = now.minus_hours(CANCEL_MERGE_WINDOW_HOURS);
                let recent = self
                    .repository
                    .find_recent_cancel(&entry.user_id, stripe_subscription_id, since)
                    .await?;
                if let Some(mut existing) = recent {
                    if !existing.absorb(&entry) {
                        return Ok(HistoryOutcome::Duplicate);
                    }
                    self.repository.update_annotations(&existing).await?;
                    return Ok(HistoryOutcome::Merged);
                }
            }
        }

        if entry.webhook_event_id.is_none() {
            let since = now.minus_minutes(DUPLICATE_WINDOW_MINUTES);
            if self
                .repository
                .find_recent_transition(&entry, since)
                .await?
                .is_some()
            {
                return Ok(HistoryOutcome::Duplicate);
            }
        }

        Ok(match self.repository.insert(entry).await? {
            AppendResult::Written => HistoryOutcome::Written,
            AppendResult::Skipped => HistoryOutcome::Duplicate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::Plan;
    use crate::domain::foundation::UserId;
    use serde_json::json;

    fn recorder() -> (HistoryRecorder, InMemoryBillingStore) {
        let store = InMemoryBillingStore::new();
        (HistoryRecorder::new(Arc::new(store.clone())), store)
    }

    fn cancel(user: UserId) -> HistoryEntry {
        HistoryEntry::new(user, HistoryAction::Canceled, Plan::Free)
            .from_plan(Some(Plan::Standard))
            .for_subscription("sub_1")
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Event id
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn same_event_id_is_written_once() {
        let (recorder, store) = recorder();
        let user = UserId::new();
        let entry = HistoryEntry::new(user, HistoryAction::Created, Plan::Premium)
            .with_event_id("evt_1");

        assert_eq!(recorder.record(entry.clone()).await, HistoryOutcome::Written);
        assert_eq!(recorder.record(entry).await, HistoryOutcome::Duplicate);
        assert_eq!(store.history_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn distinct_event_ids_bypass_time_window() {
        let (recorder, store) = recorder();
        let user = UserId::new();
        let first = HistoryEntry::new(user, HistoryAction::Upgraded, Plan::Premium)
            .from_plan(Some(Plan::Standard))
            .with_event_id("evt_1");
        let second = HistoryEntry::new(user, HistoryAction::Upgraded, Plan::Premium)
            .from_plan(Some(Plan::Standard))
            .with_event_id("evt_2");

        recorder.record(first).await;
        assert_eq!(recorder.record(second).await, HistoryOutcome::Written);
        assert_eq!(store.history_entries().await.len(), 2);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Heuristics
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn identical_transition_without_event_id_is_dropped() {
        let (recorder, store) = recorder();
        let user = UserId::new();
        let entry = HistoryEntry::new(user, HistoryAction::Reactivated, Plan::Standard)
            .from_plan(Some(Plan::Standard));

        recorder.record(entry.clone()).await;
        assert_eq!(recorder.record(entry).await, HistoryOutcome::Duplicate);
        assert_eq!(store.history_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn identical_webhook_cancel_links_event_id() {
        let (recorder, store) = recorder();
        let user = UserId::new();

        recorder
            .record(cancel(user).with_metadata("cancel_source", "user"))
            .await;
        let outcome = recorder
            .record(
                cancel(user)
                    .with_metadata("cancel_source", "user")
                    .with_event_id("evt_del"),
            )
            .await;

        assert_eq!(outcome, HistoryOutcome::Merged);
        assert_eq!(store.history_entries().await.len(), 1);
        assert!(store.find_by_event_id("evt_del").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_cancel_merges_metadata() {
        let (recorder, store) = recorder();
        let user = UserId::new();

        recorder
            .record(cancel(user).with_metadata("cancel_source", "user"))
            .await;
        let outcome = recorder
            .record(
                cancel(user)
                    .with_metadata("cancel_source", "stripe_webhook")
                    .with_event_id("evt_del"),
            )
            .await;

        assert_eq!(outcome, HistoryOutcome::Merged);
        let entries = store.history_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata["cancel_source"], json!("stripe_webhook"));
        assert_eq!(entries[0].webhook_event_id.as_deref(), Some("evt_del"));
    }

    #[tokio::test]
    async fn unchecked_record_allows_second_cancel() {
        let (recorder, store) = recorder();
        let user = UserId::new();

        recorder.record(cancel(user)).await;
        let outcome = recorder
            .record_unchecked(cancel(user).with_metadata("cancel_source", "account_deletion"))
            .await;

        assert_eq!(outcome, HistoryOutcome::Written);
        assert_eq!(store.history_entries().await.len(), 2);
    }
}
