//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` trait against the Stripe REST API using
//! form-encoded requests authenticated with the secret key.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key);
//! let adapter = StripePaymentAdapter::new(config);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::billing::BillingStatus;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, RemoteSubscription, RemoteSubscriptionItem, SubscriptionUpdate,
};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Per-request timeout.
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PaymentError> {
        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;
        Self::parse(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, PaymentError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;
        Self::parse(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, PaymentError> {
        let response = self
            .http_client
            .delete(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = api_error(status, &body);
            tracing::error!(
                status = status.as_u16(),
                code = %error.code,
                provider_code = error.provider_code.as_deref().unwrap_or(""),
                "Stripe API request failed"
            );
            return Err(error);
        }

        response.json().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

/// Maps a non-success Stripe response to a payment error.
fn api_error(status: reqwest::StatusCode, body: &str) -> PaymentError {
    #[derive(Deserialize)]
    struct Envelope {
        error: ApiErrorBody,
    }

    #[derive(Deserialize)]
    struct ApiErrorBody {
        code: Option<String>,
        message: Option<String>,
    }

    let parsed = serde_json::from_str::<Envelope>(body).ok().map(|e| e.error);
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("Stripe API error ({})", status.as_u16()));

    let code = match status.as_u16() {
        400 | 402 => PaymentErrorCode::InvalidRequest,
        401 | 403 => PaymentErrorCode::Unauthorized,
        404 => PaymentErrorCode::NotFound,
        429 => PaymentErrorCode::RateLimited,
        _ => PaymentErrorCode::ProviderError,
    };

    let error = PaymentError::new(code, message);
    match parsed.and_then(|e| e.code) {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItemResponse {
    id: String,
    price: Option<PriceResponse>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    data: Vec<SubscriptionItemResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CustomerField {
    Id(String),
    Expanded { id: String },
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: String,
    customer: Option<CustomerField>,
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    items: Option<ItemList>,
}

impl From<SubscriptionResponse> for RemoteSubscription {
    fn from(sub: SubscriptionResponse) -> Self {
        let items = sub.items.map(|list| list.data).unwrap_or_default();
        let current_period_end = sub
            .current_period_end
            .or_else(|| items.first().and_then(|i| i.current_period_end));
        RemoteSubscription {
            id: sub.id,
            customer_id: sub.customer.map(|c| match c {
                CustomerField::Id(id) | CustomerField::Expanded { id } => id,
            }),
            status: BillingStatus::from_provider(&sub.status),
            current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            items: items
                .into_iter()
                .map(|item| RemoteSubscriptionItem {
                    id: item.id,
                    price_id: item.price.map(|p| p.id),
                })
                .collect(),
        }
    }
}

fn checkout_params(request: &CreateCheckoutRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "subscription".to_string()),
        ("customer_email".to_string(), request.customer_email.clone()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    let mut metadata: Vec<_> = request.metadata.iter().collect();
    metadata.sort();
    for (key, value) in metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
        params.push((
            format!("subscription_data[metadata][{}]", key),
            value.clone(),
        ));
    }
    params
}

fn update_params(update: &SubscriptionUpdate) -> Result<Vec<(String, String)>, PaymentError> {
    let mut params = Vec::new();
    if let Some(price_id) = &update.price_id {
        let item_id = update
            .item_id
            .as_ref()
            .ok_or_else(|| PaymentError::invalid_request("price change requires an item id"))?;
        params.push(("items[0][id]".to_string(), item_id.clone()));
        params.push(("items[0][price]".to_string(), price_id.clone()));
    }
    if let Some(cancel) = update.cancel_at_period_end {
        params.push(("cancel_at_period_end".to_string(), cancel.to_string()));
    }
    if let Some(proration) = update.proration_behavior {
        params.push(("proration_behavior".to_string(), proration.as_str().to_string()));
    }
    Ok(params)
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        #[derive(Deserialize)]
        struct CheckoutSessionResponse {
            id: String,
            url: Option<String>,
        }

        let session: CheckoutSessionResponse = self
            .post("/v1/checkout/sessions", &checkout_params(&request))
            .await?;
        let url = session
            .url
            .ok_or_else(|| PaymentError::provider("Checkout session has no url"))?;

        tracing::info!(session_id = %session.id, "Stripe checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, PaymentError> {
        let sub: SubscriptionResponse = self
            .get(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;
        Ok(sub.into())
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<RemoteSubscription, PaymentError> {
        let params = update_params(&update)?;
        let sub: SubscriptionResponse = self
            .post(&format!("/v1/subscriptions/{}", subscription_id), &params)
            .await?;
        Ok(sub.into())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, PaymentError> {
        let sub: SubscriptionResponse = self
            .delete(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;
        Ok(sub.into())
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        #[derive(Deserialize)]
        struct PortalSessionResponse {
            url: String,
        }

        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        let portal: PortalSessionResponse =
            self.post("/v1/billing_portal/sessions", &params).await?;

        Ok(PortalSession { url: portal.url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProrationBehavior;
    use std::collections::HashMap;

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_new_sets_defaults() {
        let config = StripeConfig::new("sk_test_key");
        assert_eq!(config.api_base_url, "https://api.stripe.com");
    }

    #[test]
    fn config_with_base_url_trims_slash() {
        let config = StripeConfig::new("key").with_base_url("http://localhost:12111/");
        assert_eq!(config.api_base_url, "http://localhost:12111");
    }

    #[test]
    fn config_debug_redacts_key() {
        let rendered = format!("{:?}", StripeConfig::new("sk_live_secret"));
        assert!(!rendered.contains("sk_live_secret"));
        assert!(rendered.contains("REDACTED"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Request Encoding Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn checkout_params_carry_metadata_on_session_and_subscription() {
        let request = CreateCheckoutRequest {
            customer_email: "owner@example.com".to_string(),
            price_id: "price_prem".to_string(),
            success_url: "https://app.example.com/ok".to_string(),
            cancel_url: "https://app.example.com/cancel".to_string(),
            metadata: HashMap::from([
                ("plan".to_string(), "premium".to_string()),
                ("upgrade_from".to_string(), "free".to_string()),
            ]),
        };

        let params = checkout_params(&request);
        let has = |k: &str, v: &str| params.iter().any(|(pk, pv)| pk == k && pv == v);

        assert!(has("mode", "subscription"));
        assert!(has("line_items[0][price]", "price_prem"));
        assert!(has("metadata[plan]", "premium"));
        assert!(has("subscription_data[metadata][upgrade_from]", "free"));
    }

    #[test]
    fn change_price_params_include_item_and_proration() {
        let params = update_params(&SubscriptionUpdate::change_price("si_1", "price_std")).unwrap();
        assert_eq!(
            params,
            vec![
                ("items[0][id]".to_string(), "si_1".to_string()),
                ("items[0][price]".to_string(), "price_std".to_string()),
                ("cancel_at_period_end".to_string(), "false".to_string()),
                (
                    "proration_behavior".to_string(),
                    ProrationBehavior::AlwaysInvoice.as_str().to_string()
                ),
            ]
        );
    }

    #[test]
    fn price_change_without_item_is_rejected() {
        let update = SubscriptionUpdate {
            price_id: Some("price_std".to_string()),
            ..Default::default()
        };
        let err = update_params(&update).unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::InvalidRequest);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Response Parsing Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn subscription_response_maps_to_remote() {
        let json = r#"{
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "cancel_at_period_end": true,
            "items": {"data": [{"id": "si_1", "price": {"id": "price_std"}, "current_period_end": 1704067200}]}
        }"#;
        let sub: SubscriptionResponse = serde_json::from_str(json).unwrap();
        let remote: RemoteSubscription = sub.into();

        assert_eq!(remote.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(remote.status, BillingStatus::Active);
        assert!(remote.cancel_at_period_end);
        assert_eq!(remote.current_period_end, Some(1_704_067_200));
        assert_eq!(remote.first_item().unwrap().price_id.as_deref(), Some("price_std"));
    }

    #[test]
    fn expanded_customer_is_read_by_id() {
        let json = r#"{"id": "sub_1", "customer": {"id": "cus_9", "email": "x@example.com"}, "status": "past_due"}"#;
        let sub: SubscriptionResponse = serde_json::from_str(json).unwrap();
        let remote: RemoteSubscription = sub.into();
        assert_eq!(remote.customer_id.as_deref(), Some("cus_9"));
        assert_eq!(remote.status, BillingStatus::PastDue);
        assert!(remote.items.is_empty());
    }

    #[test]
    fn api_error_maps_status_and_code() {
        let body = r#"{"error": {"code": "resource_missing", "message": "No such subscription"}}"#;
        let err = api_error(reqwest::StatusCode::NOT_FOUND, body);
        assert_eq!(err.code, PaymentErrorCode::NotFound);
        assert_eq!(err.provider_code.as_deref(), Some("resource_missing"));
        assert_eq!(err.message, "No such subscription");
        assert!(!err.is_retryable());
    }

    #[test]
    fn api_error_without_body_is_retryable_on_5xx() {
        let err = api_error(reqwest::StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.code, PaymentErrorCode::ProviderError);
        assert!(err.is_retryable());
    }
}
