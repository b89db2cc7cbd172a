//! SubscriptionUpdatedProcessor - Mirrors `customer.subscription.updated`.

use std::sync::Arc;

use crate::domain::billing::{
    BillingStatus, PriceCatalog, StripeEvent, SubscriptionObject, WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{AccountRepository, SubscriptionRepository, SubscriptionTransition};

use super::dispatcher::ProcessOutcome;
use super::locks::SubscriptionLocks;

pub struct SubscriptionUpdatedProcessor {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    catalog: Arc<PriceCatalog>,
    locks: SubscriptionLocks,
}

impl SubscriptionUpdatedProcessor {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        catalog: Arc<PriceCatalog>,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            catalog,
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
                "Update for unknown subscription, skipping"
            );
            return Ok(ProcessOutcome::ignored("unknown subscription"));
        };

        subscription.refresh_from_provider(
            BillingStatus::from_provider(&remote.status),
            remote.period_end().and_then(Timestamp::from_unix_secs),
            remote.cancel_at_period_end,
        );

        let account = self.accounts.find_by_id(&subscription.user_id).await?;
        let Some(account) = account.filter(|a| !a.is_deleted()) else {
            tracing::info!(
                event_id = %event.id,
                subscription_id = %remote.id,
                "Subscription owner missing or deleted, status refreshed only"
            );
            self.subscriptions
                .apply(SubscriptionTransition::subscription_only(subscription))
                .await?;
            return Ok(ProcessOutcome::Applied);
        };

        let mapped_plan = remote
            .first_price_id()
            .and_then(|price_id| self.catalog.plan_for(price_id));
        let plan_changed = match mapped_plan {
            Some(plan) if plan != subscription.plan => {
                subscription.plan = plan;
                true
            }
            _ => false,
        };

        let plan = subscription.plan;
        let cached_status = subscription.user_facing_status();
        let mut transition = SubscriptionTransition::subscription_only(subscription)
            .with_account_cache(plan, Some(cached_status.clone()));
        if plan_changed {
            transition = transition.with_group_ceiling(plan.group_ceiling());
        }
        self.subscriptions.apply(transition).await?;

        tracing::info!(
            event_id = %event.id,
            user_id = %account.id,
            subscription_id = %remote.id,
            status = cached_status.as_str(),
            plan = plan.as_str(),
            plan_changed,
            "Subscription updated from provider"
        );

        Ok(ProcessOutcome::Applied)
    }
}
