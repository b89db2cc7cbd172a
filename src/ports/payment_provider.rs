//! Payment provider port for external payment processing.
//!
//! The narrow set of remote calls billing needs: checkout sessions,
//! subscription retrieval/update/cancel and billing portal sessions.
//! Implementations are constructed once at startup and shared.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::billing::{BillingError, BillingStatus, WebhookError};

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a hosted checkout session for a new subscription.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Fetch the provider's current view of a subscription.
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, PaymentError>;

    /// Change price and/or cancel-at-period-end of a subscription.
    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<RemoteSubscription, PaymentError>;

    /// Cancel a subscription immediately.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, PaymentError>;

    /// Create a billing portal session for subscription management.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError>;
}

/// Request to create a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub customer_email: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Echoed back on `checkout.session.completed`.
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

/// One line item of a remote subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubscriptionItem {
    pub id: String,
    pub price_id: Option<String>,
}

/// Subscription as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer_id: Option<String>,
    pub status: BillingStatus,
    /// Unix seconds.
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub items: Vec<RemoteSubscriptionItem>,
}

impl RemoteSubscription {
    pub fn first_item(&self) -> Option<&RemoteSubscriptionItem> {
        self.items.first()
    }
}

/// How the provider bills a mid-period price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationBehavior {
    AlwaysInvoice,
    CreateProrations,
    None,
}

impl ProrationBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProrationBehavior::AlwaysInvoice => "always_invoice",
            ProrationBehavior::CreateProrations => "create_prorations",
            ProrationBehavior::None => "none",
        }
    }
}

/// Partial update of a remote subscription. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    /// Item whose price changes; required when `price_id` is set.
    pub item_id: Option<String>,
    pub price_id: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    pub proration_behavior: Option<ProrationBehavior>,
}

impl SubscriptionUpdate {
    /// Only toggles cancel-at-period-end.
    pub fn cancel_at_period_end(cancel: bool) -> Self {
        Self {
            cancel_at_period_end: Some(cancel),
            ..Default::default()
        }
    }

    /// Swaps the price of one item, invoicing the difference immediately and
    /// withdrawing any scheduled cancellation.
    pub fn change_price(item_id: impl Into<String>, price_id: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id.into()),
            price_id: Some(price_id.into()),
            cancel_at_period_end: Some(false),
            proration_behavior: Some(ProrationBehavior::AlwaysInvoice),
        }
    }
}

/// Failure of a remote provider call.
///
/// `provider_code` carries the provider's own code when the response body
/// had one (`resource_missing`, `card_declined`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    pub provider_code: Option<String>,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidRequest, message)
    }

    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimited
                | PaymentErrorCode::ProviderError
        )
    }
}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        BillingError::provider(err.to_string())
    }
}

/// Webhook processing surfaces provider failures as retryable work.
impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        WebhookError::Provider(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    /// Bad or revoked API key.
    Unauthorized,
    NotFound,
    InvalidRequest,
    RateLimited,
    /// 5xx or an unreadable response.
    ProviderError,
}

impl PaymentErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Unauthorized => "unauthorized",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::RateLimited => "rate_limited",
            PaymentErrorCode::ProviderError => "provider_error",
        }
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(PaymentError::network("reset").is_retryable());
        assert!(!PaymentError::not_found("Subscription").is_retryable());
    }

    #[test]
    fn display_includes_code() {
        let err = PaymentError::not_found("Subscription");
        assert_eq!(err.to_string(), "not_found: Subscription not found");
    }

    #[test]
    fn change_price_invoices_and_uncancels() {
        let update = SubscriptionUpdate::change_price("si_1", "price_p");
        assert_eq!(update.cancel_at_period_end, Some(false));
        assert_eq!(
            update.proration_behavior,
            Some(ProrationBehavior::AlwaysInvoice)
        );
    }

    #[test]
    fn payment_error_maps_into_billing_error() {
        let err: BillingError = PaymentError::network("timeout").into();
        assert_eq!(err.kind(), "stripe_error");
    }

    #[test]
    fn payment_error_maps_into_webhook_error() {
        let err: WebhookError = PaymentError::provider("502 from upstream").into();
        assert!(err.is_retryable());
    }
}
