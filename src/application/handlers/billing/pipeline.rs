//! WebhookPipeline - Ingest, route and process one provider event.
//!
//! ```text
//! payload ─► parse ─► event log (pending) ─► route ─┬─► none: processed
//!                                                   └─► processor ─► processed | failed + Err
//! ```
//!
//! The pipeline is the unit the retry executor re-invokes. Every step is
//! idempotent, so running it again after a partial failure converges on
//! the same state.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{PriceCatalog, StripeEvent, WebhookError};
use crate::ports::{
    AccountRepository, EventLogStore, HistoryRepository, LedgerRepository,
    SubscriptionRepository, WebhookJobHandler,
};

use super::checkout_completed::CheckoutCompletedProcessor;
use super::dispatcher::{route, ProcessOutcome, ProcessorKind};
use super::history_recorder::HistoryRecorder;
use super::invoice_payment::InvoicePaymentProcessor;
use super::locks::SubscriptionLocks;
use super::subscription_deleted::SubscriptionDeletedProcessor;
use super::subscription_updated::SubscriptionUpdatedProcessor;

/// What the pipeline did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No processor handles this event type.
    Unrouted,
    Processed {
        processor: ProcessorKind,
        outcome: ProcessOutcome,
    },
}

pub struct WebhookPipeline {
    events: Arc<dyn EventLogStore>,
    checkout_completed: CheckoutCompletedProcessor,
    subscription_updated: SubscriptionUpdatedProcessor,
    subscription_deleted: SubscriptionDeletedProcessor,
    invoice_payment: InvoicePaymentProcessor,
}

impl WebhookPipeline {
    pub fn new(
        events: Arc<dyn EventLogStore>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        ledger: Arc<dyn LedgerRepository>,
        history: Arc<dyn HistoryRepository>,
        catalog: Arc<PriceCatalog>,
        locks: SubscriptionLocks,
    ) -> Self {
        let recorder = HistoryRecorder::new(history);
        Self {
            events,
            checkout_completed: CheckoutCompletedProcessor::new(
                subscriptions.clone(),
                accounts.clone(),
                ledger.clone(),
                recorder.clone(),
                locks.clone(),
            ),
            subscription_updated: SubscriptionUpdatedProcessor::new(
                subscriptions.clone(),
                accounts.clone(),
                catalog,
                locks.clone(),
            ),
            subscription_deleted: SubscriptionDeletedProcessor::new(
                subscriptions.clone(),
                accounts.clone(),
                recorder,
                locks.clone(),
            ),
            invoice_payment: InvoicePaymentProcessor::new(subscriptions, accounts, ledger, locks),
        }
    }

    /// Runs one delivery of `payload` through the pipeline.
    pub async fn process(
        &self,
        payload: &serde_json::Value,
    ) -> Result<DispatchOutcome, WebhookError> {
        let event = StripeEvent::from_value(payload)?;

        self.events
            .ingest(&event.id, &event.event_type, payload.clone())
            .await?;

        let Some(processor) = route(&event.event_type) else {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Unhandled webhook event type"
            );
            self.events.mark_processed(&event.id).await?;
            return Ok(DispatchOutcome::Unrouted);
        };

        self.events.mark_processing(&event.id).await?;

        match self.run(processor, &event).await {
            Ok(outcome) => {
                self.events.mark_processed(&event.id).await?;
                if let ProcessOutcome::Ignored { reason } = &outcome {
                    tracing::info!(
                        event_id = %event.id,
                        processor = processor.as_str(),
                        reason = *reason,
                        "Webhook event acknowledged without changes"
                    );
                }
                Ok(DispatchOutcome::Processed { processor, outcome })
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    processor = processor.as_str(),
                    error = %e,
                    "Webhook processing failed"
                );
                if let Err(mark_err) = self.events.mark_failed(&event.id, &e.to_string()).await {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %mark_err,
                        "Failed to record webhook failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        processor: ProcessorKind,
        event: &StripeEvent,
    ) -> Result<ProcessOutcome, WebhookError> {
        match processor {
            ProcessorKind::CheckoutCompleted => self.checkout_completed.process(event).await,
            ProcessorKind::SubscriptionUpdated => self.subscription_updated.process(event).await,
            ProcessorKind::SubscriptionDeleted => self.subscription_deleted.process(event).await,
            ProcessorKind::InvoicePayment => self.invoice_payment.process(event).await,
        }
    }
}

#[async_trait]
impl WebhookJobHandler for WebhookPipeline {
    async fn handle(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        self.process(payload).await.map(|_| ())
    }
}
