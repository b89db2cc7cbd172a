//! Billing Reconciler - Payment provider webhook reconciliation
//!
//! Turns Stripe webhook deliveries into local subscription state, a payment
//! ledger and plan-change history, and exposes the interactive subscription
//! operations (checkout, change plan, cancel, resume) over HTTP.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
