//! CreateCheckoutHandler - Command handler for starting a paid subscription.
//!
//! Users who already hold a live paid subscription are routed to an
//! in-place plan change instead of a second checkout.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{BillingError, Plan, PriceCatalog};
use crate::domain::foundation::UserId;
use crate::ports::{AccountRepository, CreateCheckoutRequest, PaymentProvider, SubscriptionRepository};

use super::change_plan::{ChangePlanCommand, ChangePlanHandler, ChangePlanResult};

/// Where the hosted checkout page sends the user back to.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Command to start a checkout for a plan.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateCheckoutResult {
    /// Redirect the user to the hosted checkout page.
    Checkout { session_id: String, url: String },
    /// An existing subscription was moved to the requested plan.
    PlanChanged(ChangePlanResult),
}

pub struct CreateCheckoutHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<PriceCatalog>,
    change_plan: Arc<ChangePlanHandler>,
    urls: CheckoutUrls,
}

impl CreateCheckoutHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        accounts: Arc<dyn AccountRepository>,
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<PriceCatalog>,
        change_plan: Arc<ChangePlanHandler>,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            subscriptions,
            accounts,
            provider,
            catalog,
            change_plan,
            urls,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        if !cmd.plan.is_paid() {
            return Err(BillingError::invalid_plan(cmd.plan.as_str()));
        }

        let account = match self.accounts.find_by_id(&cmd.user_id).await? {
            Some(account) if !account.is_deleted() => account,
            _ => return Err(BillingError::UserNotFound(cmd.user_id)),
        };

        if let Some(current) = self.subscriptions.find_current_for_user(&cmd.user_id).await? {
            if current.plan == cmd.plan {
                return Err(BillingError::SubscriptionExists(cmd.plan));
            }
            tracing::info!(
                user_id = %cmd.user_id,
                from = current.plan.as_str(),
                to = cmd.plan.as_str(),
                "Checkout requested with live subscription, changing plan instead"
            );
            let changed = self
                .change_plan
                .handle(ChangePlanCommand {
                    user_id: cmd.user_id,
                    plan: cmd.plan,
                })
                .await?;
            return Ok(CreateCheckoutResult::PlanChanged(changed));
        }

        // Cached plan can outlive its subscription until the deletion webhook lands.
        if account.plan == cmd.plan {
            return Err(BillingError::SamePlan(cmd.plan));
        }

        let price_id = self
            .catalog
            .price_for(cmd.plan)
            .ok_or_else(|| BillingError::invalid_plan(cmd.plan.as_str()))?;

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), cmd.user_id.to_string());
        metadata.insert("plan".to_string(), cmd.plan.as_str().to_string());
        metadata.insert("upgrade_from".to_string(), Plan::Free.as_str().to_string());

        let session = self
            .provider
            .create_checkout_session(CreateCheckoutRequest {
                customer_email: account.email.clone(),
                price_id: price_id.to_string(),
                success_url: self.urls.success_url.clone(),
                cancel_url: self.urls.cancel_url.clone(),
                metadata,
            })
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            plan = cmd.plan.as_str(),
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CreateCheckoutResult::Checkout {
            session_id: session.id,
            url: session.url,
        })
    }
}
