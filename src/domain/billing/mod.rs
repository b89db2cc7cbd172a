//! Billing domain module.
//!
//! Subscription lifecycle, payment ledger, plan history and the Stripe
//! webhook vocabulary they are reconciled from.
//!
//! # Module Structure
//!
//! - `subscription` - Subscription aggregate with cancel/resume/change-plan guards
//! - `account` - User cache and owned groups, downgrade guard
//! - `ledger` / `history` - Append-only, idempotent records
//! - `event_log` - Inbound event lifecycle
//! - `stripe_event` / `stripe_objects` - Webhook payload views
//! - `webhook_verifier` - Signature verification

mod account;
mod errors;
mod event_log;
mod history;
mod ledger;
mod plan;
mod price_catalog;
mod status;
mod stripe_event;
mod stripe_objects;
mod subscription;
mod webhook_errors;
mod webhook_verifier;

pub use account::{ensure_groups_fit, BillingAccount, OwnedGroup};
pub use errors::{BillingError, GROUP_MANAGEMENT_LINK};
pub use event_log::{EventLogRecord, EventLogStatus};
pub use history::{
    HistoryAction, HistoryEntry, CANCEL_MERGE_WINDOW_HOURS, DUPLICATE_WINDOW_MINUTES,
};
pub use ledger::{
    checkout_key, invoice_key, monthly_revenue, normalize_currency, LedgerEntry, LedgerKind,
    LedgerStatus, MonthlyRevenue, DEFAULT_CURRENCY,
};
pub use plan::{Plan, PREMIUM_GROUP_CEILING, STANDARD_GROUP_CEILING};
pub use price_catalog::PriceCatalog;
pub use status::BillingStatus;
pub use stripe_event::{StripeEvent, StripeEventData};
pub use stripe_objects::{
    CheckoutSessionObject, CustomerDetails, InvoiceObject, List, ObjectRef, PriceObject,
    SubscriptionItemObject, SubscriptionObject,
};
pub use subscription::{CancelSource, CheckoutActivation, Subscription};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, WebhookVerifier, MAX_EVENT_AGE_SECS};
