//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `EventLogStore` - Inbound event log keyed by provider event id
//! - `SubscriptionRepository` - Subscription projection with atomic transitions
//! - `AccountRepository` - Users and owned groups
//! - `LedgerRepository` - Idempotent payment ledger
//! - `HistoryRepository` - Plan transition history
//!
//! ## External Ports
//!
//! - `PaymentProvider` - Remote payment provider capabilities
//! - `WebhookQueue` / `WebhookJobHandler` - Retry executor boundary

mod account_repository;
mod event_log_store;
mod history_repository;
mod ledger_repository;
mod payment_provider;
mod subscription_repository;
mod webhook_queue;

pub use account_repository::AccountRepository;
pub use event_log_store::EventLogStore;
pub use history_repository::HistoryRepository;
pub use ledger_repository::{AppendResult, LedgerRepository};
pub use payment_provider::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, ProrationBehavior, RemoteSubscription, RemoteSubscriptionItem,
    SubscriptionUpdate,
};
pub use subscription_repository::{
    AccountCacheUpdate, GroupCeilingUpdate, SubscriptionRepository, SubscriptionTransition,
};
pub use webhook_queue::{WebhookJob, WebhookJobHandler, WebhookQueue};
