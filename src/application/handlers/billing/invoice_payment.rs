//! InvoicePaymentProcessor - Records `invoice.payment_succeeded` and `invoice.payment_failed`.

use std::sync::Arc;

use serde_json::json;

use crate::domain::billing::{
    invoice_key, normalize_currency, BillingStatus, InvoiceObject, LedgerEntry, LedgerKind,
    LedgerStatus, StripeEvent, WebhookError,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    AccountRepository, LedgerRepository, SubscriptionRepository, SubscriptionTransition,
};

use super::dispatcher::ProcessOutcome;
use super::locks::SubscriptionLocks;

pub const PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";

pub struct InvoicePaymentProcessor {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    ledger: Arc<dyn LedgerRepository>,
    locks: SubscriptionLocks,
}

impl InvoicePaymentProcessor {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        ledger: Arc<dyn LedgerRepository>,
        locks: SubscriptionLocks,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            ledger,
            locks,
        }
    }

    pub async fn process(&self, event: &StripeEvent) -> Result<ProcessOutcome, WebhookError> {
        let invoice: InvoiceObject = event.object()?;
        let succeeded = event.event_type == PAYMENT_SUCCEEDED;

        let Some(stripe_subscription_id) = invoice.subscription_id() else {
            tracing::info!(event_id = %event.id, invoice_id = %invoice.id, "Invoice without subscription, skipping");
            return Ok(ProcessOutcome::ignored("invoice without subscription"));
        };

        let _guard = self.locks.acquire(stripe_subscription_id).await;

        let Some(mut subscription) = self
            .subscriptions
            .find_by_stripe_id(stripe_subscription_id)
            .await?
        else {
            tracing::info!(
                event_id = %event.id,
                subscription_id = %stripe_subscription_id,
                "Invoice for unknown subscription, skipping"
            );
            return Ok(ProcessOutcome::ignored("unknown subscription"));
        };

        let now = Timestamp::now();
        let (status, amount, paid_at) = if succeeded {
            (LedgerStatus::Succeeded, invoice.amount_paid, Some(now))
        } else {
            (LedgerStatus::Failed, invoice.amount_due, None)
        };
        let entry = LedgerEntry {
            key: invoice_key(invoice.payment_intent_id(), &invoice.id),
            user_id: subscription.user_id,
            stripe_subscription_id: Some(stripe_subscription_id.to_string()),
            charge_id: invoice.charge_id().map(str::to_string),
            amount,
            currency: normalize_currency(invoice.currency.as_deref()),
            status,
            kind: LedgerKind::Invoice,
            paid_at,
            metadata: json!({
                "invoice_id": invoice.id,
                "billing_reason": invoice.billing_reason,
            }),
            created_at: now,
        };
        let written = self.ledger.append(entry).await?;

        if !succeeded && moves_to_past_due(&subscription.status, invoice.subscription_status()) {
            let period_end = subscription.current_period_end;
            let cancel_flag = subscription.cancel_at_period_end;
            subscription.refresh_from_provider(BillingStatus::PastDue, period_end, cancel_flag);

            let owner = self.accounts.find_by_id(&subscription.user_id).await?;
            let mut transition = SubscriptionTransition::subscription_only(subscription.clone());
            if owner.is_some_and(|a| !a.is_deleted()) {
                transition = transition.with_account_cache(
                    subscription.plan,
                    Some(subscription.user_facing_status()),
                );
            }
            self.subscriptions.apply(transition).await?;
        }

        tracing::info!(
            event_id = %event.id,
            user_id = %subscription.user_id,
            subscription_id = %stripe_subscription_id,
            status = status.as_str(),
            amount,
            ledger = ?written,
            "Invoice payment recorded"
        );

        Ok(ProcessOutcome::Applied)
    }
}

/// A failed invoice moves a live subscription to `past_due`, or any
/// non-terminal one whose embedded subscription already reports it. A late
/// invoice never reopens an ended subscription.
fn moves_to_past_due(local: &BillingStatus, reported: Option<BillingStatus>) -> bool {
    if local.is_terminal() || *local == BillingStatus::PastDue {
        return false;
    }
    match reported {
        Some(status) => status == BillingStatus::PastDue,
        None => local.is_live(),
    }
}
