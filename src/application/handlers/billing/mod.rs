//! Billing handlers.
//!
//! Webhook processors that reconcile provider events into local state, and
//! command/query handlers for the interactive subscription operations.
//!
//! ## Webhook processing
//! - Event log ingestion and dispatch by event type
//! - Checkout completion, subscription update/deletion, invoice payments
//!
//! ## Commands
//! - Creating checkout sessions (routes to plan change when subscribed)
//! - Changing plan, cancelling and resuming
//! - Opening the billing portal
//! - Admin cancel/resume by provider id
//!
//! ## Queries
//! - Get subscription details, synced from the provider
//! - Webhook log listing and lookup, monthly revenue (admin)

mod admin_subscription;
mod billing_portal;
mod cancel_subscription;
mod change_plan;
mod checkout_completed;
mod create_checkout;
mod dispatcher;
mod history_recorder;
mod invoice_payment;
mod locks;
mod pipeline;
mod resume_subscription;
mod revenue_report;
mod subscription_deleted;
mod subscription_details;
mod subscription_updated;
mod webhook_log;

// Shared
pub use history_recorder::{HistoryOutcome, HistoryRecorder};
pub use locks::{SubscriptionGuard, SubscriptionLocks};

// Webhook processing
pub use checkout_completed::CheckoutCompletedProcessor;
pub use dispatcher::{route, ProcessOutcome, ProcessorKind};
pub use invoice_payment::{InvoicePaymentProcessor, PAYMENT_SUCCEEDED};
pub use pipeline::{DispatchOutcome, WebhookPipeline};
pub use subscription_deleted::SubscriptionDeletedProcessor;
pub use subscription_updated::SubscriptionUpdatedProcessor;

// Commands
pub use admin_subscription::{AdminSubscriptionCommand, AdminSubscriptionHandler};
pub use billing_portal::{
    CreatePortalSessionCommand, CreatePortalSessionHandler, CreatePortalSessionResult,
};
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use change_plan::{ChangePlanCommand, ChangePlanHandler, ChangePlanResult};
pub use create_checkout::{
    CheckoutUrls, CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
};
pub use resume_subscription::{
    ResumeSubscriptionCommand, ResumeSubscriptionHandler, ResumeSubscriptionResult,
};

// Queries
pub use subscription_details::{
    GetSubscriptionHandler, GetSubscriptionQuery, GetSubscriptionResult, SubscriptionDetails,
};
pub use revenue_report::{RevenueReportHandler, RevenueReportQuery};
pub use webhook_log::{GetWebhookEventHandler, ListWebhookEventsHandler, ListWebhookEventsQuery};
