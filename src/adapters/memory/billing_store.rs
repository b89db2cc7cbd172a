//! In-Memory Billing Store
//!
//! One lock guards every table so a [`SubscriptionTransition`] lands
//! atomically, like the database transaction in the Postgres adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{
    monthly_revenue, BillingAccount, EventLogRecord, EventLogStatus, HistoryAction, HistoryEntry,
    LedgerEntry, MonthlyRevenue, OwnedGroup, Subscription,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{
    AccountRepository, AppendResult, EventLogStore, HistoryRepository, LedgerRepository,
    SubscriptionRepository, SubscriptionTransition,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<UserId, BillingAccount>,
    groups: Vec<OwnedGroup>,
    subscriptions: HashMap<String, Subscription>,
    ledger: Vec<LedgerEntry>,
    history: Vec<HistoryEntry>,
    events: HashMap<String, EventLogRecord>,
}

/// Process-local implementation of every billing store port.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingStore {
    tables: Arc<RwLock<Tables>>,
    fail_transitions: Arc<AtomicBool>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account.
    pub async fn insert_account(&self, account: BillingAccount) {
        self.tables
            .write()
            .await
            .accounts
            .insert(account.id, account);
    }

    /// Adds a group.
    pub async fn insert_group(&self, group: OwnedGroup) {
        self.tables.write().await.groups.push(group);
    }

    /// Adds or replaces a subscription without touching any cache.
    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.tables
            .write()
            .await
            .subscriptions
            .insert(subscription.stripe_subscription_id.clone(), subscription);
    }

    /// Makes every following `apply` fail with a database error.
    pub fn fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    pub async fn account(&self, user_id: &UserId) -> Option<BillingAccount> {
        self.tables.read().await.accounts.get(user_id).cloned()
    }

    pub async fn groups_of(&self, owner_id: &UserId) -> Vec<OwnedGroup> {
        self.tables
            .read()
            .await
            .groups
            .iter()
            .filter(|g| &g.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.tables.read().await.ledger.clone()
    }

    pub async fn history_entries(&self) -> Vec<HistoryEntry> {
        self.tables.read().await.history.clone()
    }

    pub async fn subscription_count(&self) -> usize {
        self.tables.read().await.subscriptions.len()
    }
}

#[async_trait]
impl EventLogStore for InMemoryBillingStore {
    async fn ingest(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<EventLogRecord, DomainError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .events
            .entry(event_id.to_string())
            .and_modify(|r| r.reset_for_redelivery(event_type, payload.clone()))
            .or_insert_with(|| EventLogRecord::new(event_id, event_type, payload));
        Ok(record.clone())
    }

    async fn mark_processing(&self, event_id: &str) -> Result<(), DomainError> {
        self.update_event(event_id, |r| r.mark_processing()).await
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        self.update_event(event_id, |r| r.mark_processed()).await
    }

    async fn mark_failed(&self, event_id: &str, reason: &str) -> Result<(), DomainError> {
        self.update_event(event_id, |r| r.mark_failed(reason)).await
    }

    async fn find(&self, event_id: &str) -> Result<Option<EventLogRecord>, DomainError> {
        Ok(self.tables.read().await.events.get(event_id).cloned())
    }

    async fn list(
        &self,
        status: Option<EventLogStatus>,
        event_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EventLogRecord>, DomainError> {
        let tables = self.tables.read().await;
        let mut records: Vec<EventLogRecord> = tables
            .events
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .filter(|r| event_type.map_or(true, |t| r.event_type == t))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.event_id.cmp(&a.event_id))
        });
        records.truncate(limit as usize);
        Ok(records)
    }
}

impl InMemoryBillingStore {
    async fn update_event<F>(&self, event_id: &str, f: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut EventLogRecord),
    {
        let mut tables = self.tables.write().await;
        let record = tables.events.get_mut(event_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::EventNotFound,
                format!("Webhook event {} not found", event_id),
            )
        })?;
        f(record);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryBillingStore {
    async fn find_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .get(stripe_subscription_id)
            .cloned())
    }

    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| &s.user_id == user_id && s.status.is_live())
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| &s.user_id == user_id)
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn apply(&self, transition: SubscriptionTransition) -> Result<(), DomainError> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(DomainError::database("Simulated transition failure"));
        }

        let mut tables = self.tables.write().await;

        if let Some(update) = &transition.account {
            let account = tables.accounts.get_mut(&update.user_id).ok_or_else(|| {
                DomainError::new(
                    ErrorCode::UserNotFound,
                    format!("User {} not found", update.user_id),
                )
            })?;
            account.plan = update.plan;
            account.subscription_status = update.status.clone();
        }

        if let Some(update) = transition.groups {
            for group in tables
                .groups
                .iter_mut()
                .filter(|g| g.owner_id == update.owner_id)
            {
                group.max_members = update.max_members;
            }
        }

        let subscription = transition.subscription;
        match tables
            .subscriptions
            .get_mut(&subscription.stripe_subscription_id)
        {
            // Keep the original row identity on update by natural key.
            Some(existing) => {
                let id = existing.id;
                let created_at = existing.created_at;
                *existing = subscription;
                existing.id = id;
                existing.created_at = created_at;
            }
            None => {
                tables
                    .subscriptions
                    .insert(subscription.stripe_subscription_id.clone(), subscription);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryBillingStore {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<BillingAccount>, DomainError> {
        Ok(self.account(user_id).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<BillingAccount>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn owned_groups(&self, owner_id: &UserId) -> Result<Vec<OwnedGroup>, DomainError> {
        Ok(self.groups_of(owner_id).await)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryBillingStore {
    async fn append(&self, entry: LedgerEntry) -> Result<AppendResult, DomainError> {
        let mut tables = self.tables.write().await;
        if tables.ledger.iter().any(|e| e.key == entry.key) {
            return Ok(AppendResult::Skipped);
        }
        tables.ledger.push(entry);
        Ok(AppendResult::Written)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables.ledger.iter().find(|e| e.key == key).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn monthly_revenue(&self, since: Timestamp) -> Result<Vec<MonthlyRevenue>, DomainError> {
        Ok(monthly_revenue(&self.tables.read().await.ledger, since))
    }
}

#[async_trait]
impl HistoryRepository for InMemoryBillingStore {
    async fn insert(&self, entry: HistoryEntry) -> Result<AppendResult, DomainError> {
        let mut tables = self.tables.write().await;
        if let Some(event_id) = &entry.webhook_event_id {
            let taken = tables
                .history
                .iter()
                .any(|h| h.webhook_event_id.as_ref() == Some(event_id));
            if taken {
                return Ok(AppendResult::Skipped);
            }
        }
        tables.history.push(entry);
        Ok(AppendResult::Written)
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<HistoryEntry>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .find(|h| h.webhook_event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn find_recent_transition(
        &self,
        entry: &HistoryEntry,
        since: Timestamp,
    ) -> Result<Option<HistoryEntry>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|h| h.same_transition(entry) && !h.created_at.is_before(&since))
            .max_by_key(|h| h.created_at)
            .cloned())
    }

    async fn find_recent_cancel(
        &self,
        user_id: &UserId,
        stripe_subscription_id: &str,
        since: Timestamp,
    ) -> Result<Option<HistoryEntry>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|h| {
                &h.user_id == user_id
                    && h.action == HistoryAction::Canceled
                    && h.stripe_subscription_id.as_deref() == Some(stripe_subscription_id)
                    && !h.created_at.is_before(&since)
            })
            .max_by_key(|h| h.created_at)
            .cloned())
    }

    async fn update_annotations(&self, entry: &HistoryEntry) -> Result<(), DomainError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .history
            .iter_mut()
            .find(|h| h.id == entry.id)
            .ok_or_else(|| DomainError::new(ErrorCode::NotFound, "History entry not found"))?;
        existing.metadata = entry.metadata.clone();
        existing.notes = entry.notes.clone();
        existing.webhook_event_id = entry.webhook_event_id.clone();
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|h| &h.user_id == user_id)
            .cloned()
            .collect())
    }
}
