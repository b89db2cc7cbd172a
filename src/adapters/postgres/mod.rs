//! PostgreSQL adapters - Database implementations for the billing ports.
//!
//! - `PostgresBillingStore` - event log, subscriptions, accounts, ledger and
//!   history over one `PgPool`
//! - [`connect`] / [`run_migrations`] - pool construction and schema setup

mod accounts;
mod event_log;
mod history;
mod ledger;
mod store;
mod subscriptions;

pub use store::PostgresBillingStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens a connection pool sized by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(&config.url)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to connect: {}", e))
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        "Database pool connected"
    );
    Ok(pool)
}

/// Applies the SQL migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Migration failed: {}", e))
        })?;
    tracing::info!("Database migrations completed");
    Ok(())
}
