//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for Stripe:
//! - Checkout sessions
//! - Subscription retrieval, update and cancellation
//! - Billing portal sessions
//!
//! Webhook signature verification lives with the billing domain, see
//! `WebhookVerifier`.
//!
//! # Configuration
//!
//! - `payment.stripe_api_key`: Stripe secret API key
//! - `payment.api_base_url`: override for stripe-mock and tests

mod mock_payment_provider;
mod stripe_adapter;

pub use mock_payment_provider::{MockPaymentProvider, ProviderCall};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
