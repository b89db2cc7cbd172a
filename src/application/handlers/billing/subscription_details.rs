//! GetSubscriptionHandler - Query handler for the user's billing summary.
//!
//! Refreshes the local row from the provider when it can; a provider
//! failure falls back to the stored state.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, BillingStatus, CancelSource, Plan, PriceCatalog, Subscription};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{AccountRepository, PaymentProvider, SubscriptionRepository, SubscriptionTransition};

use super::locks::SubscriptionLocks;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionDetails {
    pub stripe_subscription_id: String,
    pub status: BillingStatus,
    pub current_period_end: Option<Timestamp>,
    pub can_cancel: bool,
    pub will_cancel_at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetSubscriptionResult {
    pub plan: Plan,
    pub subscription: Option<SubscriptionDetails>,
}

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<PriceCatalog>,
    locks: SubscriptionLocks,
}

impl GetSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<PriceCatalog>,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            provider,
            catalog,
            locks,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<GetSubscriptionResult, BillingError> {
        let account = match self.accounts.find_by_id(&query.user_id).await? {
            Some(account) if !account.is_deleted() => account,
            _ => return Err(BillingError::UserNotFound(query.user_id)),
        };

        let Some(stored) = self.subscriptions.find_latest_for_user(&query.user_id).await? else {
            return Ok(GetSubscriptionResult {
                plan: account.plan,
                subscription: None,
            });
        };

        let subscription = self.sync_from_provider(stored).await?;
        let plan = if subscription.status.is_live() {
            subscription.plan
        } else {
            account.plan
        };

        Ok(GetSubscriptionResult {
            plan,
            subscription: Some(SubscriptionDetails {
                can_cancel: subscription.ensure_cancelable(CancelSource::User).is_ok(),
                will_cancel_at_period_end: subscription.is_scheduled_to_cancel(),
                status: subscription.user_facing_status(),
                current_period_end: subscription.current_period_end,
                stripe_subscription_id: subscription.stripe_subscription_id,
            }),
        })
    }

    async fn sync_from_provider(&self, stored: Subscription) -> Result<Subscription, BillingError> {
        let remote = match self
            .provider
            .retrieve_subscription(&stored.stripe_subscription_id)
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(
                    user_id = %stored.user_id,
                    subscription_id = %stored.stripe_subscription_id,
                    error = %e,
                    "Could not refresh subscription from provider, using stored state"
                );
                return Ok(stored);
            }
        };

        let _guard = self.locks.acquire(&stored.stripe_subscription_id).await;
        let mut subscription = self
            .subscriptions
            .find_by_stripe_id(&stored.stripe_subscription_id)
            .await?
            .unwrap_or(stored);

        subscription.refresh_from_provider(
            remote.status.clone(),
            remote.current_period_end.and_then(Timestamp::from_unix_secs),
            remote.cancel_at_period_end,
        );
        let mapped_plan = remote
            .first_item()
            .and_then(|item| item.price_id.as_deref())
            .and_then(|price_id| self.catalog.plan_for(price_id));
        let plan_changed = match mapped_plan {
            Some(plan) if plan != subscription.plan => {
                subscription.plan = plan;
                true
            }
            _ => false,
        };

        let mut transition = SubscriptionTransition::subscription_only(subscription.clone());
        if subscription.status.is_live() {
            transition = transition
                .with_account_cache(subscription.plan, Some(subscription.user_facing_status()));
            if plan_changed {
                transition = transition.with_group_ceiling(subscription.plan.group_ceiling());
            }
        }
        self.subscriptions.apply(transition).await?;

        Ok(subscription)
    }
}
