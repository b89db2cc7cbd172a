//! SubscriptionDeletedProcessor - Ends a subscription on `customer.subscription.deleted`.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::billing::{
    BillingStatus, CancelSource, HistoryAction, HistoryEntry, Plan, StripeEvent, Subscription,
    SubscriptionObject, WebhookError, STANDARD_GROUP_CEILING,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{AccountRepository, SubscriptionRepository, SubscriptionTransition};

use super::dispatcher::ProcessOutcome;
use super::history_recorder::HistoryRecorder;
use super::locks::SubscriptionLocks;

pub struct SubscriptionDeletedProcessor {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    history: HistoryRecorder,
    locks: SubscriptionLocks,
}

impl SubscriptionDeletedProcessor {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        history: HistoryRecorder,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            history,
            locks,
        }
    }

    pub async fn process(&self, event: &StripeEvent) -> Result<ProcessOutcome, WebhookError> {
        let remote: SubscriptionObject = event.object()?;

        let _guard = self.locks.acquire(&remote.id).await;

        let Some(mut subscription) = self.subscriptions.find_by_stripe_id(&remote.id).await?
        else {
            tracing::info!(
                event_id = %event.id,
                subscription_id = %remote.id,
                "Deletion of unknown subscription, skipping"
            );
            return Ok(ProcessOutcome::ignored("unknown subscription"));
        };

        let previous_plan = subscription.plan;
        subscription.mark_canceled(remote.period_end().and_then(Timestamp::from_unix_secs));
        let history = cancel_entry(&subscription, previous_plan, &event.id);

        match self.accounts.find_by_id(&subscription.user_id).await? {
            Some(account) if account.is_deleted() => {
                self.subscriptions
                    .apply(SubscriptionTransition::subscription_only(subscription))
                    .await?;
                self.history
                    .record(history.with_metadata("user_deleted", true))
                    .await;
                tracing::info!(
                    event_id = %event.id,
                    user_id = %account.id,
                    subscription_id = %remote.id,
                    "Subscription of deleted user canceled"
                );
            }
            Some(account) => {
                let transition = SubscriptionTransition::subscription_only(subscription)
                    .with_account_cache(Plan::Free, Some(BillingStatus::Canceled))
                    .with_group_ceiling(STANDARD_GROUP_CEILING);
                self.subscriptions.apply(transition).await?;
                self.history.record(history).await;
                tracing::info!(
                    event_id = %event.id,
                    user_id = %account.id,
                    subscription_id = %remote.id,
                    "Subscription canceled, user moved to free plan"
                );
            }
            None => {
                self.subscriptions
                    .apply(SubscriptionTransition::subscription_only(subscription))
                    .await?;
                tracing::warn!(
                    event_id = %event.id,
                    subscription_id = %remote.id,
                    "Subscription owner not found, status updated only"
                );
            }
        }

        Ok(ProcessOutcome::Applied)
    }
}

fn cancel_entry(subscription: &Subscription, from: Plan, event_id: &str) -> HistoryEntry {
    let period_end = subscription
        .current_period_end
        .map(|t| Value::String(t.to_rfc3339()))
        .unwrap_or(Value::Null);
    HistoryEntry::new(subscription.user_id, HistoryAction::Canceled, Plan::Free)
        .from_plan(Some(from))
        .for_subscription(subscription.stripe_subscription_id.clone())
        .with_event_id(event_id)
        .with_metadata("current_period_end", period_end)
        .with_metadata("cancel_source", CancelSource::StripeWebhook.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{BillingAccount, CheckoutActivation, OwnedGroup};
    use crate::domain::foundation::{GroupId, UserId};
    use serde_json::json;

    async fn fixture(deleted: bool) -> (InMemoryBillingStore, SubscriptionDeletedProcessor, UserId) {
        let store = InMemoryBillingStore::new();
        let user = UserId::new();
        let mut account = BillingAccount::new(user, "owner@example.com");
        account.plan = Plan::Premium;
        account.subscription_status = Some(BillingStatus::Active);
        if deleted {
            account.deleted_at = Some(Timestamp::now());
        }
        store.insert_account(account).await;
        store
            .insert_group(OwnedGroup {
                id: GroupId::new(),
                owner_id: user,
                name: "club".to_string(),
                max_members: 200,
                active_member_count: 5,
            })
            .await;
        store
            .insert_subscription(Subscription::from_checkout(CheckoutActivation {
                user_id: user,
                stripe_subscription_id: "sub_1".to_string(),
                stripe_customer_id: None,
                plan: Plan::Premium,
                current_period_end: Timestamp::now().add_days(3),
            }))
            .await;
        let processor = SubscriptionDeletedProcessor::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            HistoryRecorder::new(Arc::new(store.clone())),
            SubscriptionLocks::new(),
        );
        (store, processor, user)
    }

    fn event() -> StripeEvent {
        StripeEvent::from_value(&json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1", "status": "canceled" } }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn deletion_downgrades_user_to_free() {
        let (store, processor, user) = fixture(false).await;
        processor.process(&event()).await.unwrap();

        let account = store.account(&user).await.unwrap();
        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.subscription_status, Some(BillingStatus::Canceled));
        assert_eq!(store.groups_of(&user).await[0].max_members, 50);

        let history = store.history_entries().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Canceled);
        assert_eq!(history[0].from_plan, Some(Plan::Premium));
        assert_eq!(history[0].metadata["cancel_source"], json!("stripe_webhook"));
    }

    #[tokio::test]
    async fn deleted_user_is_left_untouched() {
        let (store, processor, user) = fixture(true).await;
        processor.process(&event()).await.unwrap();

        let sub = store.find_by_stripe_id("sub_1").await.unwrap().unwrap();
        assert_eq!(sub.status, BillingStatus::Canceled);

        let account = store.account(&user).await.unwrap();
        assert_eq!(account.plan, Plan::Premium);
        assert_eq!(account.subscription_status, Some(BillingStatus::Active));
        assert_eq!(store.groups_of(&user).await[0].max_members, 200);

        let history = store.history_entries().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].metadata["user_deleted"], json!(true));
    }

    #[tokio::test]
    async fn redelivery_keeps_single_history_row() {
        let (store, processor, _) = fixture(false).await;
        processor.process(&event()).await.unwrap();
        processor.process(&event()).await.unwrap();
        assert_eq!(store.history_entries().await.len(), 1);
    }
}
