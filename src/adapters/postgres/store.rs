//! PostgreSQL billing store.
//!
//! One pool-backed struct implementing every billing persistence port. The
//! port implementations live in sibling modules; this one holds the pool
//! and the row-decoding helpers they share.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{BillingStatus, Plan};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// PostgreSQL implementation of the billing ports.
///
/// Uses sqlx runtime queries with connection pooling.
#[derive(Clone)]
pub struct PostgresBillingStore {
    pub(super) pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Wraps a sqlx error with what was being attempted.
pub(super) fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

pub(super) fn parse_plan(s: &str) -> Result<Plan, DomainError> {
    Plan::from_str(s).map_err(|_| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", s))
    })
}

pub(super) fn parse_status(s: Option<String>) -> Option<BillingStatus> {
    s.as_deref().map(BillingStatus::from_provider)
}

pub(super) fn timestamp(dt: Option<DateTime<Utc>>) -> Option<Timestamp> {
    dt.map(Timestamp::from_datetime)
}

pub(super) fn invalid_column(column: &str, value: &str) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, value),
    )
}
