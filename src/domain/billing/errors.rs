//! Billing-specific error types.
//!
//! Business-rule rejections returned by interactive subscription operations.
//! Every variant carries a stable machine-readable kind (see [`BillingError::kind`])
//! and a human-readable message.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NoSubscription, UserNotFound, EventNotFound | 404 |
//! | SubscriptionExists, SamePlan, InvalidPlanChange | 409 |
//! | CannotCancel, NotCancelable, PeriodEnded, PlanUnchanged | 409 |
//! | DowngradeBlocked | 422 |
//! | InvalidPlan, NoCustomer | 400 |
//! | Provider | 502 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, UserId};

use super::plan::Plan;

/// Where users are sent to shrink their groups before a downgrade.
pub const GROUP_MANAGEMENT_LINK: &str = "/user/groups";

/// Billing operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// User has no active or trialing subscription.
    NoSubscription,

    /// User does not exist or has been deleted.
    UserNotFound(UserId),

    /// No webhook log entry for this event id.
    EventNotFound(String),

    /// An active subscription for the requested plan already exists.
    SubscriptionExists(Plan),

    /// User's cached plan already equals the requested plan.
    SamePlan(Plan),

    /// No price is configured for the requested plan.
    InvalidPlan(String),

    /// Requested change between plans is not supported.
    InvalidPlanChange { from: Plan, to: Plan },

    /// Change-plan request targets the plan already held.
    PlanUnchanged(Plan),

    /// Subscription status does not allow cancellation.
    CannotCancel { status: String },

    /// Subscription is not scheduled for cancellation.
    NotCancelable,

    /// Current period already ended; resuming is no longer possible.
    PeriodEnded,

    /// Downgrade refused because owned groups exceed the target ceiling.
    DowngradeBlocked {
        ceiling: u32,
        groups: Vec<String>,
        link: String,
    },

    /// Subscription has no provider customer to open a portal for.
    NoCustomer,

    /// Remote payment provider call failed.
    Provider(String),

    /// Infrastructure error.
    Infrastructure(String),
}

impl BillingError {
    pub fn invalid_plan(plan: impl Into<String>) -> Self {
        BillingError::InvalidPlan(plan.into())
    }

    pub fn cannot_cancel(status: impl Into<String>) -> Self {
        BillingError::CannotCancel {
            status: status.into(),
        }
    }

    pub fn downgrade_blocked(ceiling: u32, groups: Vec<String>) -> Self {
        BillingError::DowngradeBlocked {
            ceiling,
            groups,
            link: GROUP_MANAGEMENT_LINK.to_string(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        BillingError::Provider(message.into())
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::NoSubscription => "no_subscription",
            BillingError::UserNotFound(_) => "user_not_found",
            BillingError::EventNotFound(_) => "event_not_found",
            BillingError::SubscriptionExists(_) => "subscription_exists",
            BillingError::SamePlan(_) => "same_plan",
            BillingError::InvalidPlan(_) => "invalid_plan",
            BillingError::InvalidPlanChange { .. } => "invalid_plan_change",
            BillingError::PlanUnchanged(_) => "plan_unchanged",
            BillingError::CannotCancel { .. } => "cannot_cancel",
            BillingError::NotCancelable => "not_cancelable",
            BillingError::PeriodEnded => "period_ended",
            BillingError::DowngradeBlocked { .. } => "downgrade_blocked",
            BillingError::NoCustomer => "no_customer",
            BillingError::Provider(_) => "stripe_error",
            BillingError::Infrastructure(_) => "internal_error",
        }
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::NoSubscription => "No active subscription found".to_string(),
            BillingError::UserNotFound(id) => format!("User not found: {}", id),
            BillingError::EventNotFound(id) => format!("Webhook event not found: {}", id),
            BillingError::SubscriptionExists(plan) => {
                format!("You are already subscribed to the {} plan", plan)
            }
            BillingError::SamePlan(plan) => format!("You are already on the {} plan", plan),
            BillingError::InvalidPlan(plan) => format!("Invalid plan: {}", plan),
            BillingError::InvalidPlanChange { from, to } => {
                format!("Cannot change plan from {} to {}", from, to)
            }
            BillingError::PlanUnchanged(plan) => {
                format!("Subscription is already on the {} plan", plan)
            }
            BillingError::CannotCancel { status } => {
                format!("Subscription in status '{}' cannot be canceled", status)
            }
            BillingError::NotCancelable => {
                "Subscription is not scheduled for cancellation".to_string()
            }
            BillingError::PeriodEnded => {
                "The current billing period has already ended".to_string()
            }
            BillingError::DowngradeBlocked { ceiling, groups, .. } => format!(
                "Cannot downgrade: {} group(s) have more than {} active members",
                groups.len(),
                ceiling
            ),
            BillingError::NoCustomer => "No billing customer associated".to_string(),
            BillingError::Provider(msg) => format!("Payment provider error: {}", msg),
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        BillingError::Infrastructure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(BillingError::NoSubscription.kind(), "no_subscription");
        assert_eq!(BillingError::PeriodEnded.kind(), "period_ended");
        assert_eq!(BillingError::NotCancelable.kind(), "not_cancelable");
        assert_eq!(BillingError::provider("boom").kind(), "stripe_error");
        assert_eq!(BillingError::invalid_plan("gold").kind(), "invalid_plan");
        assert_eq!(
            BillingError::EventNotFound("evt_1".to_string()).kind(),
            "event_not_found"
        );
    }

    #[test]
    fn downgrade_blocked_carries_link_and_groups() {
        let err = BillingError::downgrade_blocked(50, vec!["Choir".to_string()]);
        match &err {
            BillingError::DowngradeBlocked { groups, link, ceiling } => {
                assert_eq!(groups, &vec!["Choir".to_string()]);
                assert_eq!(link, GROUP_MANAGEMENT_LINK);
                assert_eq!(*ceiling, 50);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.message().contains("50 active members"));
    }

    #[test]
    fn domain_error_becomes_infrastructure() {
        let err: BillingError = DomainError::database("timeout").into();
        assert_eq!(err.kind(), "internal_error");
        assert!(err.message().contains("timeout"));
    }

    #[test]
    fn display_uses_message() {
        let err = BillingError::cannot_cancel("past_due");
        assert_eq!(
            err.to_string(),
            "Subscription in status 'past_due' cannot be canceled"
        );
    }
}
