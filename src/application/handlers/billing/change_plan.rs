//! ChangePlanHandler - Command handler for in-place upgrades and downgrades.
//!
//! The remote price swap is the point of the operation, so a provider
//! failure is returned to the caller and nothing is written locally.

use std::sync::Arc;

use crate::domain::billing::{
    ensure_groups_fit, BillingError, HistoryAction, HistoryEntry, Plan, PriceCatalog,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    AccountRepository, PaymentProvider, SubscriptionRepository, SubscriptionTransition,
    SubscriptionUpdate,
};

use super::history_recorder::HistoryRecorder;
use super::locks::SubscriptionLocks;

/// Command to move a user's live subscription to another paid plan.
#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub user_id: UserId,
    pub plan: Plan,
}

/// Result of a successful plan change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePlanResult {
    pub stripe_subscription_id: String,
    pub from: Plan,
    pub to: Plan,
    pub action: HistoryAction,
}

pub struct ChangePlanHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<PriceCatalog>,
    history: HistoryRecorder,
    locks: SubscriptionLocks,
}

impl ChangePlanHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<PriceCatalog>,
        history: HistoryRecorder,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            provider,
            catalog,
            history,
            locks,
        }
    }

    pub async fn handle(&self, cmd: ChangePlanCommand) -> Result<ChangePlanResult, BillingError> {
        if !cmd.plan.is_paid() {
            return Err(BillingError::invalid_plan(cmd.plan.as_str()));
        }

        match self.accounts.find_by_id(&cmd.user_id).await? {
            Some(account) if !account.is_deleted() => {}
            _ => return Err(BillingError::UserNotFound(cmd.user_id)),
        }

        let current = self
            .subscriptions
            .find_current_for_user(&cmd.user_id)
            .await?
            .ok_or(BillingError::NoSubscription)?;

        let _guard = self.locks.acquire(&current.stripe_subscription_id).await;
        let mut subscription = self
            .subscriptions
            .find_by_stripe_id(&current.stripe_subscription_id)
            .await?
            .filter(|s| s.status.is_live())
            .ok_or(BillingError::NoSubscription)?;

        let from = subscription.plan;
        if from == cmd.plan {
            return Err(BillingError::PlanUnchanged(from));
        }
        if !from.is_paid() {
            return Err(BillingError::InvalidPlanChange { from, to: cmd.plan });
        }

        let price_id = self
            .catalog
            .price_for(cmd.plan)
            .ok_or_else(|| BillingError::invalid_plan(cmd.plan.as_str()))?
            .to_string();

        let groups = self.accounts.owned_groups(&cmd.user_id).await?;
        ensure_groups_fit(from, cmd.plan, &groups)?;

        let stripe_subscription_id = subscription.stripe_subscription_id.clone();
        let remote = self
            .provider
            .retrieve_subscription(&stripe_subscription_id)
            .await?;
        let item_id = remote
            .first_item()
            .map(|item| item.id.clone())
            .ok_or_else(|| BillingError::provider("Remote subscription has no items"))?;
        let updated = self
            .provider
            .update_subscription(
                &stripe_subscription_id,
                SubscriptionUpdate::change_price(item_id, price_id),
            )
            .await?;

        subscription.refresh_from_provider(
            updated.status.clone(),
            updated.current_period_end.and_then(Timestamp::from_unix_secs),
            updated.cancel_at_period_end,
        );
        subscription.change_plan(cmd.plan);

        let status = subscription.user_facing_status();
        let transition = SubscriptionTransition::subscription_only(subscription)
            .with_account_cache(cmd.plan, Some(status))
            .with_group_ceiling(cmd.plan.group_ceiling());
        self.subscriptions.apply(transition).await?;

        let action = HistoryAction::for_plan_change(from, cmd.plan);
        self.history
            .record(
                HistoryEntry::new(cmd.user_id, action, cmd.plan)
                    .from_plan(Some(from))
                    .for_subscription(stripe_subscription_id.clone())
                    .with_metadata("source", "change_plan"),
            )
            .await;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %stripe_subscription_id,
            from = from.as_str(),
            to = cmd.plan.as_str(),
            "Subscription plan changed"
        );

        Ok(ChangePlanResult {
            stripe_subscription_id,
            from,
            to: cmd.plan,
            action,
        })
    }
}
