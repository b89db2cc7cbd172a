//! ResumeSubscriptionHandler - Withdraws a scheduled cancellation.

use std::sync::Arc;

use crate::domain::billing::{BillingError, HistoryAction, HistoryEntry};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    AccountRepository, PaymentProvider, SubscriptionRepository, SubscriptionTransition,
    SubscriptionUpdate,
};

use super::history_recorder::HistoryRecorder;
use super::locks::SubscriptionLocks;

#[derive(Debug, Clone)]
pub struct ResumeSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeSubscriptionResult {
    pub stripe_subscription_id: String,
    pub current_period_end: Option<Timestamp>,
}

pub struct ResumeSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    provider: Arc<dyn PaymentProvider>,
    history: HistoryRecorder,
    locks: SubscriptionLocks,
}

impl ResumeSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        provider: Arc<dyn PaymentProvider>,
        history: HistoryRecorder,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            provider,
            history,
            locks,
        }
    }

    pub async fn handle(
        &self,
        cmd: ResumeSubscriptionCommand,
    ) -> Result<ResumeSubscriptionResult, BillingError> {
        match self.accounts.find_by_id(&cmd.user_id).await? {
            Some(account) if !account.is_deleted() => {}
            _ => return Err(BillingError::UserNotFound(cmd.user_id)),
        }

        let candidate = self
            .subscriptions
            .find_current_for_user(&cmd.user_id)
            .await?
            .ok_or(BillingError::NoSubscription)?;

        let _guard = self.locks.acquire(&candidate.stripe_subscription_id).await;
        let mut subscription = self
            .subscriptions
            .find_by_stripe_id(&candidate.stripe_subscription_id)
            .await?
            .ok_or(BillingError::NoSubscription)?;
        subscription.ensure_resumable(Timestamp::now())?;

        let stripe_subscription_id = subscription.stripe_subscription_id.clone();
        self.provider
            .update_subscription(
                &stripe_subscription_id,
                SubscriptionUpdate::cancel_at_period_end(false),
            )
            .await
            .map_err(|e| {
                tracing::warn!(
                    user_id = %cmd.user_id,
                    subscription_id = %stripe_subscription_id,
                    error = %e,
                    "Provider resume failed"
                );
                BillingError::from(e)
            })?;

        subscription.resume();
        let plan = subscription.plan;
        let status = subscription.user_facing_status();
        let current_period_end = subscription.current_period_end;
        self.subscriptions
            .apply(
                SubscriptionTransition::subscription_only(subscription)
                    .with_account_cache(plan, Some(status)),
            )
            .await?;

        self.history
            .record(
                HistoryEntry::new(cmd.user_id, HistoryAction::Reactivated, plan)
                    .from_plan(Some(plan))
                    .for_subscription(stripe_subscription_id.clone()),
            )
            .await;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %stripe_subscription_id,
            "Subscription resumed"
        );

        Ok(ResumeSubscriptionResult {
            stripe_subscription_id,
            current_period_end,
        })
    }
}
