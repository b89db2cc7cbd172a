//! SubscriptionRepository port - Current-state projection of subscriptions.
//!
//! Writes go through [`SubscriptionTransition`], which bundles the
//! subscription row with the owning user's cached plan/status and the
//! ceiling of the user's groups. Implementations apply a transition
//! atomically so the cache never disagrees with the row.

use async_trait::async_trait;

use crate::domain::billing::{BillingStatus, Plan, Subscription};
use crate::domain::foundation::{DomainError, UserId};

/// New values for a user's cached plan and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCacheUpdate {
    pub user_id: UserId,
    pub plan: Plan,
    pub status: Option<BillingStatus>,
}

/// New member ceiling for every group a user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCeilingUpdate {
    pub owner_id: UserId,
    pub max_members: u32,
}

/// One atomic state change.
#[derive(Debug, Clone)]
pub struct SubscriptionTransition {
    /// Upserted by provider subscription id.
    pub subscription: Subscription,
    pub account: Option<AccountCacheUpdate>,
    pub groups: Option<GroupCeilingUpdate>,
}

impl SubscriptionTransition {
    /// Transition touching only the subscription row.
    pub fn subscription_only(subscription: Subscription) -> Self {
        Self {
            subscription,
            account: None,
            groups: None,
        }
    }

    /// Also rewrites the owner's cached plan and status.
    pub fn with_account_cache(mut self, plan: Plan, status: Option<BillingStatus>) -> Self {
        self.account = Some(AccountCacheUpdate {
            user_id: self.subscription.user_id,
            plan,
            status,
        });
        self
    }

    /// Also sets the ceiling of every group the owner holds.
    pub fn with_group_ceiling(mut self, max_members: u32) -> Self {
        self.groups = Some(GroupCeilingUpdate {
            owner_id: self.subscription.user_id,
            max_members,
        });
        self
    }
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Finds a subscription by its provider id.
    async fn find_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Most recent active or trialing subscription of a user.
    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Most recent subscription of a user regardless of status.
    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Applies a transition atomically.
    ///
    /// The subscription is inserted or updated by provider subscription id.
    async fn apply(&self, transition: SubscriptionTransition) -> Result<(), DomainError>;
}
