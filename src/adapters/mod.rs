//! Adapters - Implementations of port interfaces.
//!
//! - `memory` - In-process store for tests and local runs
//! - `postgres` - sqlx-backed store
//! - `stripe` - Stripe REST client and a scriptable mock
//! - `queue` - Webhook channel and retrying worker
//! - `http` - axum routes

pub mod http;
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod stripe;
