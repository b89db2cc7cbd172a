//! CheckoutCompletedProcessor - Activates a subscription from `checkout.session.completed`.

use std::sync::Arc;

use serde_json::json;

use crate::domain::billing::{
    checkout_key, normalize_currency, BillingStatus, CheckoutActivation, CheckoutSessionObject,
    HistoryAction, HistoryEntry, LedgerEntry, LedgerKind, LedgerStatus, Plan, StripeEvent,
    Subscription, WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AccountRepository, LedgerRepository, SubscriptionRepository, SubscriptionTransition,
};

use super::dispatcher::ProcessOutcome;
use super::history_recorder::HistoryRecorder;
use super::locks::SubscriptionLocks;

pub struct CheckoutCompletedProcessor {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    ledger: Arc<dyn LedgerRepository>,
    history: HistoryRecorder,
    locks: SubscriptionLocks,
}

impl CheckoutCompletedProcessor {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        ledger: Arc<dyn LedgerRepository>,
        history: HistoryRecorder,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            ledger,
            history,
            locks,
        }
    }

    pub async fn process(&self, event: &StripeEvent) -> Result<ProcessOutcome, WebhookError> {
        let session: CheckoutSessionObject = event.object()?;

        let (Some(email), Some(stripe_subscription_id)) =
            (session.email(), session.subscription_id())
        else {
            tracing::info!(
                event_id = %event.id,
                session_id = %session.id,
                "Checkout session without email or subscription, skipping"
            );
            return Ok(ProcessOutcome::ignored("missing email or subscription"));
        };

        let account = match self.accounts.find_by_email(email).await? {
            Some(account) if account.is_deleted() => {
                tracing::warn!(
                    event_id = %event.id,
                    user_id = %account.id,
                    "Checkout completed for deleted user, skipping"
                );
                return Ok(ProcessOutcome::ignored("user deleted"));
            }
            Some(account) => account,
            None => {
                tracing::warn!(event_id = %event.id, "Checkout completed for unknown email, skipping");
                return Ok(ProcessOutcome::ignored("unknown user"));
            }
        };

        let plan = paid_plan(session.metadata_value("plan"));
        let upgrade_from = session
            .metadata_value("upgrade_from")
            .and_then(|p| p.parse::<Plan>().ok())
            .unwrap_or(Plan::Free);

        let _guard = self.locks.acquire(stripe_subscription_id).await;

        let now = Timestamp::now();
        let activated_at = Timestamp::from_unix_secs(event.created)
            .filter(|_| event.created > 0)
            .unwrap_or(now);
        let activation = CheckoutActivation {
            user_id: account.id,
            stripe_subscription_id: stripe_subscription_id.to_string(),
            stripe_customer_id: session.customer_id().map(str::to_string),
            plan,
            current_period_end: activated_at.add_months(1),
        };
        match self
            .subscriptions
            .find_by_stripe_id(stripe_subscription_id)
            .await?
        {
            // Activated by an earlier delivery; later events own the row now.
            Some(mut existing) if existing.user_id == account.id => {
                if existing.fill_customer(activation.stripe_customer_id) {
                    self.subscriptions
                        .apply(SubscriptionTransition::subscription_only(existing))
                        .await?;
                }
                tracing::debug!(
                    event_id = %event.id,
                    subscription_id = %stripe_subscription_id,
                    "Subscription already activated"
                );
            }
            existing => {
                let subscription = match existing {
                    Some(mut other_owner) => {
                        other_owner.apply_checkout(activation);
                        other_owner
                    }
                    None => Subscription::from_checkout(activation),
                };
                let transition = SubscriptionTransition::subscription_only(subscription)
                    .with_account_cache(plan, Some(BillingStatus::Active))
                    .with_group_ceiling(plan.group_ceiling());
                self.subscriptions.apply(transition).await?;
            }
        }

        let payment_intent = session.payment_intent_id();
        let (status, paid_at) = if payment_intent.is_some() {
            (LedgerStatus::RequiresAction, None)
        } else {
            (LedgerStatus::Succeeded, Some(now))
        };
        let currency = normalize_currency(session.currency.as_deref());
        let entry = LedgerEntry {
            key: checkout_key(payment_intent, &session.id),
            user_id: account.id,
            stripe_subscription_id: Some(stripe_subscription_id.to_string()),
            charge_id: session.charge_id().map(str::to_string),
            amount: session.amount_total.unwrap_or(0),
            currency: currency.clone(),
            status,
            kind: LedgerKind::Subscription,
            paid_at,
            metadata: json!({
                "session_id": session.id,
                "plan": plan.as_str(),
                "requires_3ds": payment_intent.is_some(),
            }),
            created_at: now,
        };
        let written = self.ledger.append(entry).await?;

        let action = if upgrade_from == Plan::Free {
            HistoryAction::Created
        } else {
            HistoryAction::Upgraded
        };
        let from_plan = upgrade_from.is_paid().then_some(upgrade_from);
        let history = HistoryEntry::new(account.id, action, plan)
            .from_plan(from_plan)
            .for_subscription(stripe_subscription_id)
            .with_amount(session.amount_total, currency)
            .with_event_id(&event.id)
            .with_metadata("session_id", session.id.clone());
        self.history.record(history).await;

        tracing::info!(
            event_id = %event.id,
            user_id = %account.id,
            subscription_id = %stripe_subscription_id,
            plan = plan.as_str(),
            ledger = ?written,
            "Checkout completed, subscription activated"
        );

        Ok(ProcessOutcome::Applied)
    }
}

/// Paid plan named in session metadata, defaulting to standard.
fn paid_plan(value: Option<&str>) -> Plan {
    match value.map(str::parse::<Plan>) {
        Some(Ok(plan)) if plan.is_paid() => plan,
        Some(_) => {
            tracing::warn!(plan = ?value, "Unrecognized plan in checkout metadata, using standard");
            Plan::Standard
        }
        None => Plan::Standard,
    }
}
