//! Application configuration
//!
//! Values come from environment variables prefixed with `BILLING_RECONCILER`,
//! with `__` separating nested sections. A `.env` file is read first when one
//! exists.
//!
//! - `BILLING_RECONCILER__SERVER__PORT=8080` -> `server.port`
//! - `BILLING_RECONCILER__PAYMENT__STANDARD_PRICE_ID=price_...` -> `payment.standard_price_id`
//! - `BILLING_RECONCILER__QUEUE__MAX_ATTEMPTS=3` -> `queue.max_attempts`

mod database;
mod error;
mod payment;
mod queue;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use queue::QueueConfig;
pub use server::{Environment, ServerConfig};

use std::path::Path;

use serde::Deserialize;

pub const ENV_PREFIX: &str = "BILLING_RECONCILER";

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Absent means the in-memory store.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    pub payment: PaymentConfig,

    /// Webhook retry and worker settings
    #[serde(default)]
    pub queue: QueueConfig,
}

impl AppConfig {
    /// Loads `.env` if present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Like [`AppConfig::load`] but with an explicit env file, which must exist.
    pub fn load_from(env_file: &Path) -> Result<Self, ConfigError> {
        dotenvy::from_path(env_file)?;
        Self::from_env()
    }

    fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.payment.validate(self.is_production())?;
        self.queue.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
