//! CreatePortalSessionHandler - Opens the provider's billing portal.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{PaymentProvider, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct CreatePortalSessionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePortalSessionResult {
    pub url: String,
}

pub struct CreatePortalSessionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    provider: Arc<dyn PaymentProvider>,
    return_url: String,
}

impl CreatePortalSessionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        provider: Arc<dyn PaymentProvider>,
        return_url: impl Into<String>,
    ) -> Self {
        Self {
            subscriptions,
            provider,
            return_url: return_url.into(),
        }
    }

    pub async fn handle(
        &self,
        cmd: CreatePortalSessionCommand,
    ) -> Result<CreatePortalSessionResult, BillingError> {
        let subscription = self
            .subscriptions
            .find_latest_for_user(&cmd.user_id)
            .await?
            .ok_or(BillingError::NoSubscription)?;
        let customer_id = subscription
            .stripe_customer_id
            .as_deref()
            .ok_or(BillingError::NoCustomer)?;

        let session = self
            .provider
            .create_portal_session(customer_id, &self.return_url)
            .await?;

        Ok(CreatePortalSessionResult { url: session.url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::{CheckoutActivation, Plan, Subscription};
    use crate::domain::foundation::Timestamp;

    async fn handler_with(customer: Option<&str>) -> (CreatePortalSessionHandler, MockPaymentProvider, UserId) {
        let store = InMemoryBillingStore::new();
        let provider = MockPaymentProvider::new();
        let user = UserId::new();
        store
            .insert_subscription(Subscription::from_checkout(CheckoutActivation {
                user_id: user,
                stripe_subscription_id: "sub_1".to_string(),
                stripe_customer_id: customer.map(str::to_string),
                plan: Plan::Standard,
                current_period_end: Timestamp::now().add_days(5),
            }))
            .await;
        let handler = CreatePortalSessionHandler::new(
            Arc::new(store),
            Arc::new(provider.clone()),
            "https://app.example.com/billing",
        );
        (handler, provider, user)
    }

    #[tokio::test]
    async fn opens_portal_for_customer() {
        let (handler, provider, user) = handler_with(Some("cus_1")).await;
        let result = handler
            .handle(CreatePortalSessionCommand { user_id: user })
            .await
            .unwrap();

        assert!(result.url.starts_with("https://billing.stripe.com/"));
        let call = &provider.calls()[0];
        assert_eq!(call.args[0], "cus_1");
        assert_eq!(call.args[1], "https://app.example.com/billing");
    }

    #[tokio::test]
    async fn missing_customer_is_rejected() {
        let (handler, _, user) = handler_with(None).await;
        let err = handler
            .handle(CreatePortalSessionCommand { user_id: user })
            .await
            .unwrap_err();
        assert_eq!(err, BillingError::NoCustomer);
    }

    #[tokio::test]
    async fn user_without_subscription_is_rejected() {
        let (handler, _, _) = handler_with(Some("cus_1")).await;
        let err = handler
            .handle(CreatePortalSessionCommand {
                user_id: UserId::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, BillingError::NoSubscription);
    }
}
