//! AccountRepository port - Read access to users and the groups they own.

use async_trait::async_trait;

use crate::domain::billing::{BillingAccount, OwnedGroup};
use crate::domain::foundation::{DomainError, UserId};

/// Lookups include soft-deleted accounts; callers decide what deletion means.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<BillingAccount>, DomainError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<BillingAccount>, DomainError>;

    /// Groups owned by the user with their active member counts.
    async fn owned_groups(&self, owner_id: &UserId) -> Result<Vec<OwnedGroup>, DomainError>;
}
