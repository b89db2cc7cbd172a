//! Payment provider configuration

use secrecy::SecretString;
use serde::Deserialize;

use crate::domain::billing::{PriceCatalog, MAX_EVENT_AGE_SECS};

use super::error::ValidationError;

/// Stripe credentials, price ids and the URLs checkout redirects to.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: String,

    /// Webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: String,

    pub standard_price_id: String,

    pub premium_price_id: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Origin of the web app, used to build redirect URLs.
    pub frontend_url: String,

    #[serde(default = "default_success_path")]
    pub checkout_success_path: String,

    #[serde(default = "default_cancel_path")]
    pub checkout_cancel_path: String,

    #[serde(default = "default_portal_return_path")]
    pub portal_return_path: String,

    /// Accepted clock skew for signed webhook timestamps.
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    pub fn api_key(&self) -> SecretString {
        SecretString::new(self.stripe_api_key.clone())
    }

    pub fn webhook_secret(&self) -> SecretString {
        SecretString::new(self.stripe_webhook_secret.clone())
    }

    pub fn price_catalog(&self) -> PriceCatalog {
        PriceCatalog::new(&self.standard_price_id, &self.premium_price_id)
    }

    pub fn checkout_success_url(&self) -> String {
        self.frontend_link(&self.checkout_success_path)
    }

    pub fn checkout_cancel_url(&self) -> String {
        self.frontend_link(&self.checkout_cancel_path)
    }

    pub fn portal_return_url(&self) -> String {
        self.frontend_link(&self.portal_return_path)
    }

    fn frontend_link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.frontend_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.standard_price_id.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STANDARD_PRICE_ID"));
        }
        if self.premium_price_id.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__PREMIUM_PRICE_ID"));
        }
        if self.standard_price_id == self.premium_price_id {
            return Err(ValidationError::DuplicatePriceId(self.standard_price_id.clone()));
        }

        check_url("PAYMENT__FRONTEND_URL", &self.frontend_url, production)?;
        check_url("PAYMENT__API_BASE_URL", &self.api_base_url, production)?;

        if self.webhook_tolerance_secs <= 0 || self.webhook_tolerance_secs > MAX_EVENT_AGE_SECS {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.provider_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn check_url(name: &'static str, url: &str, production: bool) -> Result<(), ValidationError> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if url.starts_with("http://") {
        return if production {
            Err(ValidationError::InsecureUrl(name))
        } else {
            Ok(())
        };
    }
    Err(ValidationError::InvalidUrl(name))
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_success_path() -> String {
    "/billing/success?session_id={CHECKOUT_SESSION_ID}".to_string()
}

fn default_cancel_path() -> String {
    "/billing/cancelled".to_string()
}

fn default_portal_return_path() -> String {
    "/billing".to_string()
}

fn default_webhook_tolerance() -> i64 {
    300
}

fn default_provider_timeout() -> u64 {
    30
}
