//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers mutate subscription state; the webhook pipeline applies
//! provider events; query handlers read.

pub mod handlers;

pub use handlers::billing;
