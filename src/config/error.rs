//! Configuration error types

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Could not read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Semantic problems with otherwise well-formed configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid Stripe API key format")]
    InvalidStripeKey,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("Standard and premium plans share price id {0}")]
    DuplicatePriceId(String),

    #[error("{0} must be an absolute http(s) URL")]
    InvalidUrl(&'static str),

    #[error("{0} must use HTTPS in production")]
    InsecureUrl(&'static str),

    #[error("Queue max_attempts must be between 1 and 10")]
    InvalidRetryAttempts,

    #[error("Queue attempt timeout must be between 1 and 600 seconds")]
    InvalidAttemptTimeout,

    #[error("Queue capacity and concurrency must be positive")]
    InvalidQueueCapacity,
}
