//! Admin subscription commands.
//!
//! Act on the provider only. Local state follows through the webhooks the
//! provider emits for the change.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::ports::{PaymentProvider, RemoteSubscription, SubscriptionUpdate};

#[derive(Debug, Clone)]
pub enum AdminSubscriptionCommand {
    /// Cancel now, or at period end when `immediately` is false.
    Cancel {
        stripe_subscription_id: String,
        immediately: bool,
    },
    /// Withdraw a scheduled cancellation.
    Resume { stripe_subscription_id: String },
}

pub struct AdminSubscriptionHandler {
    provider: Arc<dyn PaymentProvider>,
}

impl AdminSubscriptionHandler {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }

    pub async fn handle(
        &self,
        cmd: AdminSubscriptionCommand,
    ) -> Result<RemoteSubscription, BillingError> {
        let remote = match &cmd {
            AdminSubscriptionCommand::Cancel {
                stripe_subscription_id,
                immediately: true,
            } => self.provider.cancel_subscription(stripe_subscription_id).await?,
            AdminSubscriptionCommand::Cancel {
                stripe_subscription_id,
                immediately: false,
            } => {
                self.provider
                    .update_subscription(
                        stripe_subscription_id,
                        SubscriptionUpdate::cancel_at_period_end(true),
                    )
                    .await?
            }
            AdminSubscriptionCommand::Resume {
                stripe_subscription_id,
            } => {
                self.provider
                    .update_subscription(
                        stripe_subscription_id,
                        SubscriptionUpdate::cancel_at_period_end(false),
                    )
                    .await?
            }
        };

        tracing::info!(
            subscription_id = %remote.id,
            status = remote.status.as_str(),
            cancel_at_period_end = remote.cancel_at_period_end,
            command = ?cmd,
            "Admin subscription command applied"
        );

        Ok(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::BillingStatus;

    fn handler() -> (AdminSubscriptionHandler, MockPaymentProvider) {
        let provider = MockPaymentProvider::new();
        provider.add_subscription(MockPaymentProvider::active_subscription("sub_1", "price_std"));
        (AdminSubscriptionHandler::new(Arc::new(provider.clone())), provider)
    }

    #[tokio::test]
    async fn immediate_cancel_cancels_remotely() {
        let (handler, _) = handler();
        let remote = handler
            .handle(AdminSubscriptionCommand::Cancel {
                stripe_subscription_id: "sub_1".to_string(),
                immediately: true,
            })
            .await
            .unwrap();
        assert_eq!(remote.status, BillingStatus::Canceled);
    }

    #[tokio::test]
    async fn period_end_cancel_then_resume() {
        let (handler, provider) = handler();
        handler
            .handle(AdminSubscriptionCommand::Cancel {
                stripe_subscription_id: "sub_1".to_string(),
                immediately: false,
            })
            .await
            .unwrap();
        assert!(provider.subscription("sub_1").unwrap().cancel_at_period_end);

        handler
            .handle(AdminSubscriptionCommand::Resume {
                stripe_subscription_id: "sub_1".to_string(),
            })
            .await
            .unwrap();
        assert!(!provider.subscription("sub_1").unwrap().cancel_at_period_end);
    }

    #[tokio::test]
    async fn unknown_subscription_is_provider_error() {
        let (handler, _) = handler();
        let err = handler
            .handle(AdminSubscriptionCommand::Resume {
                stripe_subscription_id: "sub_missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "stripe_error");
    }
}
