//! Plan definitions.
//!
//! Represents the subscription plans a user can hold and the group size
//! ceiling each plan grants.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Member ceiling for groups owned by free and standard users.
pub const STANDARD_GROUP_CEILING: u32 = 50;

/// Member ceiling for groups owned by premium users.
pub const PREMIUM_GROUP_CEILING: u32 = 200;

/// Subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// No paid subscription.
    Free,
    /// Paid plan with the standard group ceiling.
    Standard,
    /// Paid plan with the raised group ceiling.
    Premium,
}

impl Plan {
    /// Returns true if this plan is billed.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }

    /// Maximum active members a group owned by a user on this plan may hold.
    pub fn group_ceiling(&self) -> u32 {
        match self {
            Plan::Premium => PREMIUM_GROUP_CEILING,
            Plan::Free | Plan::Standard => STANDARD_GROUP_CEILING,
        }
    }

    /// Returns the numeric rank of this plan for comparison.
    ///
    /// Higher rank = more capacity. Used to tell upgrades from downgrades.
    pub fn rank(&self) -> u8 {
        match self {
            Plan::Free => 0,
            Plan::Standard => 1,
            Plan::Premium => 2,
        }
    }

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Standard => "standard",
            Plan::Premium => "premium",
        }
    }
}

impl FromStr for Plan {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "standard" => Ok(Plan::Standard),
            "premium" => Ok(Plan::Premium),
            other => Err(ValidationError::invalid_format(
                "plan",
                format!("unknown plan '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_is_not_paid() {
        assert!(!Plan::Free.is_paid());
        assert!(Plan::Standard.is_paid());
        assert!(Plan::Premium.is_paid());
    }

    #[test]
    fn ceilings_follow_plan() {
        assert_eq!(Plan::Free.group_ceiling(), 50);
        assert_eq!(Plan::Standard.group_ceiling(), 50);
        assert_eq!(Plan::Premium.group_ceiling(), 200);
    }

    #[test]
    fn rank_orders_plans() {
        assert!(Plan::Free.rank() < Plan::Standard.rank());
        assert!(Plan::Standard.rank() < Plan::Premium.rank());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Premium".parse::<Plan>().unwrap(), Plan::Premium);
        assert_eq!(" standard ".parse::<Plan>().unwrap(), Plan::Standard);
        assert!("gold".parse::<Plan>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Plan::Standard).unwrap(), "\"standard\"");
        let plan: Plan = serde_json::from_str("\"premium\"").unwrap();
        assert_eq!(plan, Plan::Premium);
    }
}
