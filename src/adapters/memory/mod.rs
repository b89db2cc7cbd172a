//! In-memory adapters.
//!
//! Back the store ports with process-local maps. Used by tests and by the
//! binary when no database is configured.

mod billing_store;

pub use billing_store::InMemoryBillingStore;
