//! Subscription aggregate.
//!
//! The locally persisted projection of a provider subscription. The provider
//! subscription id is the natural key; every mutation path goes through the
//! methods here so the guards for cancel, resume and plan change live in one
//! place.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

use super::errors::BillingError;
use super::plan::Plan;
use super::status::BillingStatus;

/// Who asked for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelSource {
    /// The user, through the billing API.
    User,
    /// The provider, through a `customer.subscription.deleted` event.
    StripeWebhook,
    /// Account deletion flow.
    AccountDeletion,
}

impl CancelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelSource::User => "user",
            CancelSource::StripeWebhook => "stripe_webhook",
            CancelSource::AccountDeletion => "account_deletion",
        }
    }
}

/// Fields a completed checkout writes onto a subscription.
#[derive(Debug, Clone)]
pub struct CheckoutActivation {
    pub user_id: UserId,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    pub plan: Plan,
    pub current_period_end: Timestamp,
}

/// Local projection of a provider subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    pub plan: Plan,
    pub status: BillingStatus,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates the row for a subscription first seen at checkout.
    pub fn from_checkout(activation: CheckoutActivation) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::new(),
            user_id: activation.user_id,
            stripe_subscription_id: activation.stripe_subscription_id,
            stripe_customer_id: activation.stripe_customer_id,
            plan: activation.plan,
            status: BillingStatus::Active,
            current_period_end: Some(activation.current_period_end),
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Re-applies a checkout to an existing row with the same provider id.
    pub fn apply_checkout(&mut self, activation: CheckoutActivation) {
        self.user_id = activation.user_id;
        if activation.stripe_customer_id.is_some() {
            self.stripe_customer_id = activation.stripe_customer_id;
        }
        self.plan = activation.plan;
        self.status = BillingStatus::Active;
        self.current_period_end = Some(activation.current_period_end);
        self.cancel_at_period_end = false;
        self.touch();
    }

    /// Records the customer id if the row has none yet. Returns whether
    /// anything changed.
    pub fn fill_customer(&mut self, stripe_customer_id: Option<String>) -> bool {
        if self.stripe_customer_id.is_some() || stripe_customer_id.is_none() {
            return false;
        }
        self.stripe_customer_id = stripe_customer_id;
        self.touch();
        true
    }

    /// Mirrors the provider's view of status, period end and cancel flag.
    ///
    /// A missing period end keeps the stored one.
    pub fn refresh_from_provider(
        &mut self,
        status: BillingStatus,
        current_period_end: Option<Timestamp>,
        cancel_at_period_end: bool,
    ) {
        self.status = status;
        if current_period_end.is_some() {
            self.current_period_end = current_period_end;
        }
        self.cancel_at_period_end = cancel_at_period_end;
        self.touch();
    }

    /// Marks the subscription as ended by the provider.
    pub fn mark_canceled(&mut self, current_period_end: Option<Timestamp>) {
        self.status = BillingStatus::Canceled;
        self.cancel_at_period_end = false;
        if current_period_end.is_some() {
            self.current_period_end = current_period_end;
        }
        self.touch();
    }

    /// True once a cancellation at period end is scheduled.
    pub fn is_scheduled_to_cancel(&self) -> bool {
        self.cancel_at_period_end || self.status == BillingStatus::WillCancel
    }

    /// Checks that the subscription may be canceled for the given source.
    ///
    /// Users may cancel live subscriptions that are not already scheduled to
    /// cancel; account deletion may also finalize a scheduled one. Nothing
    /// may cancel a subscription the provider has already ended.
    pub fn ensure_cancelable(&self, source: CancelSource) -> Result<(), BillingError> {
        let allowed = match source {
            CancelSource::AccountDeletion => {
                !self.status.is_terminal()
                    && (self.status.is_live() || self.is_scheduled_to_cancel())
            }
            CancelSource::User | CancelSource::StripeWebhook => {
                self.status.is_live() && !self.is_scheduled_to_cancel()
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(BillingError::cannot_cancel(
                self.user_facing_status().as_str(),
            ))
        }
    }

    /// Schedules cancellation at the end of the current period.
    pub fn schedule_cancel(&mut self) {
        self.cancel_at_period_end = true;
        self.touch();
    }

    /// Checks that a scheduled cancellation can still be withdrawn at `now`.
    pub fn ensure_resumable(&self, now: Timestamp) -> Result<(), BillingError> {
        if !self.is_scheduled_to_cancel() {
            return Err(BillingError::NotCancelable);
        }
        match self.current_period_end {
            Some(end) if end.is_before(&now) => Err(BillingError::PeriodEnded),
            _ => Ok(()),
        }
    }

    /// Withdraws a scheduled cancellation.
    pub fn resume(&mut self) {
        self.cancel_at_period_end = false;
        if self.status == BillingStatus::WillCancel {
            self.status = BillingStatus::Active;
        }
        self.touch();
    }

    /// Moves the subscription to another plan in place.
    pub fn change_plan(&mut self, plan: Plan) {
        self.plan = plan;
        self.cancel_at_period_end = false;
        self.touch();
    }

    /// Status the owning user's cache should show for this subscription.
    pub fn user_facing_status(&self) -> BillingStatus {
        if self.cancel_at_period_end {
            BillingStatus::WillCancel
        } else {
            self.status.clone()
        }
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
