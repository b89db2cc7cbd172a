//! LedgerRepository port - Append-only payment ledger.

use async_trait::async_trait;

use crate::domain::billing::{LedgerEntry, MonthlyRevenue};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Result of an idempotent append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// A new row was written.
    Written,
    /// The key was already present; nothing changed.
    Skipped,
}

/// Implementations enforce key uniqueness in storage (`ON CONFLICT DO NOTHING`)
/// so concurrent appends of one key write exactly one row.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// First writer wins on `entry.key`.
    async fn append(&self, entry: LedgerEntry) -> Result<AppendResult, DomainError>;

    async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>, DomainError>;

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError>;

    /// Succeeded amounts per `YYYY-MM` and currency since `since`, oldest first.
    async fn monthly_revenue(&self, since: Timestamp) -> Result<Vec<MonthlyRevenue>, DomainError>;
}
