//! Billing view of a user account and the groups it owns.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{GroupId, Timestamp, UserId};

use super::errors::BillingError;
use super::plan::Plan;
use super::status::BillingStatus;

/// A user as seen by billing: identity plus the cached plan and status.
///
/// The cache mirrors the user's current subscription and is written in
/// the same transition as the subscription row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAccount {
    pub id: UserId,
    pub email: String,
    pub plan: Plan,
    pub subscription_status: Option<BillingStatus>,
    pub deleted_at: Option<Timestamp>,
}

impl BillingAccount {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            plan: Plan::Free,
            subscription_status: None,
            deleted_at: None,
        }
    }

    /// Soft-deleted accounts are kept for audit but never re-activated.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A group owned by a user with its current active membership count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedGroup {
    pub id: GroupId,
    pub owner_id: UserId,
    pub name: String,
    pub max_members: u32,
    pub active_member_count: u32,
}

/// Refuses a plan change that would leave owned groups above the new ceiling.
///
/// Only plan changes that lower the ceiling are checked.
pub fn ensure_groups_fit(from: Plan, to: Plan, groups: &[OwnedGroup]) -> Result<(), BillingError> {
    let ceiling = to.group_ceiling();
    if ceiling >= from.group_ceiling() {
        return Ok(());
    }

    let over: Vec<String> = groups
        .iter()
        .filter(|g| g.active_member_count > ceiling)
        .map(|g| g.name.clone())
        .collect();

    if over.is_empty() {
        Ok(())
    } else {
        Err(BillingError::downgrade_blocked(ceiling, over))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, active: u32) -> OwnedGroup {
        OwnedGroup {
            id: GroupId::new(),
            owner_id: UserId::new(),
            name: name.to_string(),
            max_members: 200,
            active_member_count: active,
        }
    }

    #[test]
    fn new_account_starts_free() {
        let account = BillingAccount::new(UserId::new(), "a@example.com");
        assert_eq!(account.plan, Plan::Free);
        assert!(account.subscription_status.is_none());
        assert!(!account.is_deleted());
    }

    #[test]
    fn downgrade_with_51_active_members_is_blocked() {
        let groups = vec![group("Orchestra", 51), group("Book club", 12)];
        let err = ensure_groups_fit(Plan::Premium, Plan::Standard, &groups).unwrap_err();
        match err {
            BillingError::DowngradeBlocked { groups, .. } => {
                assert_eq!(groups, vec!["Orchestra".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn downgrade_with_exactly_50_is_allowed() {
        let groups = vec![group("Orchestra", 50)];
        assert!(ensure_groups_fit(Plan::Premium, Plan::Standard, &groups).is_ok());
    }

    #[test]
    fn upgrade_is_never_blocked() {
        let groups = vec![group("Huge", 500)];
        assert!(ensure_groups_fit(Plan::Standard, Plan::Premium, &groups).is_ok());
    }
}
