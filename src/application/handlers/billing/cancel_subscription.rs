//! CancelSubscriptionHandler - Schedules cancellation at period end.
//!
//! The local cancel proceeds even when the provider call fails; the next
//! `customer.subscription.updated` delivery reconciles the remote side.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::billing::{
    BillingError, BillingStatus, CancelSource, HistoryAction, HistoryEntry, Plan,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    AccountRepository, PaymentProvider, SubscriptionRepository, SubscriptionTransition,
    SubscriptionUpdate,
};

use super::history_recorder::HistoryRecorder;
use super::locks::SubscriptionLocks;

/// Command to cancel a user's subscription at the end of the period.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    pub source: CancelSource,
    pub reason: Option<String>,
}

impl CancelSubscriptionCommand {
    pub fn by_user(user_id: UserId) -> Self {
        Self {
            user_id,
            source: CancelSource::User,
            reason: None,
        }
    }

    pub fn for_account_deletion(user_id: UserId) -> Self {
        Self {
            user_id,
            source: CancelSource::AccountDeletion,
            reason: Some("Account deleted".to_string()),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSubscriptionResult {
    pub stripe_subscription_id: String,
    /// When access ends.
    pub cancel_at: Option<Timestamp>,
    /// False when the provider call failed and only local state changed.
    pub provider_synced: bool,
}

pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    provider: Arc<dyn PaymentProvider>,
    history: HistoryRecorder,
    locks: SubscriptionLocks,
}

impl CancelSubscriptionHandler {
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
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let account = self
            .accounts
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or(BillingError::UserNotFound(cmd.user_id))?;
        if account.is_deleted() && cmd.source != CancelSource::AccountDeletion {
            return Err(BillingError::UserNotFound(cmd.user_id));
        }

        let candidate = match cmd.source {
            CancelSource::AccountDeletion => {
                self.subscriptions.find_latest_for_user(&cmd.user_id).await?
            }
            CancelSource::User | CancelSource::StripeWebhook => {
                self.subscriptions.find_current_for_user(&cmd.user_id).await?
            }
        }
        .ok_or(BillingError::NoSubscription)?;

        let _guard = self.locks.acquire(&candidate.stripe_subscription_id).await;
        let mut subscription = self
            .subscriptions
            .find_by_stripe_id(&candidate.stripe_subscription_id)
            .await?
            .ok_or(BillingError::NoSubscription)?;
        subscription.ensure_cancelable(cmd.source)?;

        let stripe_subscription_id = subscription.stripe_subscription_id.clone();
        let provider_synced = match self
            .provider
            .update_subscription(&stripe_subscription_id, SubscriptionUpdate::cancel_at_period_end(true))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    user_id = %cmd.user_id,
                    subscription_id = %stripe_subscription_id,
                    error = %e,
                    "Provider cancel failed, canceling locally"
                );
                false
            }
        };

        let plan = subscription.plan;
        subscription.schedule_cancel();
        let cancel_at = subscription.current_period_end;
        self.subscriptions
            .apply(
                SubscriptionTransition::subscription_only(subscription)
                    .with_account_cache(plan, Some(BillingStatus::WillCancel)),
            )
            .await?;

        let mut entry = HistoryEntry::new(cmd.user_id, HistoryAction::Canceled, Plan::Free)
            .from_plan(Some(plan))
            .for_subscription(stripe_subscription_id.clone())
            .with_metadata("cancel_source", cmd.source.as_str())
            .with_metadata(
                "current_period_end",
                cancel_at
                    .map(|t| Value::String(t.to_rfc3339()))
                    .unwrap_or(Value::Null),
            );
        if let Some(reason) = &cmd.reason {
            entry = entry.with_notes(reason.clone());
        }
        match cmd.source {
            CancelSource::AccountDeletion => self.history.record_unchecked(entry).await,
            CancelSource::User | CancelSource::StripeWebhook => self.history.record(entry).await,
        };

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %stripe_subscription_id,
            source = cmd.source.as_str(),
            provider_synced,
            "Subscription scheduled to cancel"
        );

        Ok(CancelSubscriptionResult {
            stripe_subscription_id,
            cancel_at,
            provider_synced,
        })
    }
}
