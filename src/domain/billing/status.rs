//! Subscription status values.
//!
//! Provider statuses are mirrored verbatim so that a status the domain does
//! not model is still stored and reported as the provider sent it.
//! `WillCancel` only ever appears in the user's cached status.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status of a subscription, or of a user's cached view of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BillingStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    Canceled,
    /// Cancellation scheduled for the end of the current period.
    WillCancel,
    /// Provider status this domain has no variant for.
    Other(String),
}

impl BillingStatus {
    /// Maps a provider status literal.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "active" => BillingStatus::Active,
            "trialing" => BillingStatus::Trialing,
            "past_due" => BillingStatus::PastDue,
            "unpaid" => BillingStatus::Unpaid,
            "incomplete" => BillingStatus::Incomplete,
            "incomplete_expired" => BillingStatus::IncompleteExpired,
            "paused" => BillingStatus::Paused,
            "canceled" => BillingStatus::Canceled,
            "will_cancel" => BillingStatus::WillCancel,
            other => BillingStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BillingStatus::Active => "active",
            BillingStatus::Trialing => "trialing",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Unpaid => "unpaid",
            BillingStatus::Incomplete => "incomplete",
            BillingStatus::IncompleteExpired => "incomplete_expired",
            BillingStatus::Paused => "paused",
            BillingStatus::Canceled => "canceled",
            BillingStatus::WillCancel => "will_cancel",
            BillingStatus::Other(s) => s.as_str(),
        }
    }

    /// True for the statuses that make a subscription the user's current one.
    pub fn is_live(&self) -> bool {
        matches!(self, BillingStatus::Active | BillingStatus::Trialing)
    }

    /// True once the provider will never bill this subscription again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BillingStatus::Canceled | BillingStatus::IncompleteExpired
        )
    }
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for BillingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BillingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(BillingStatus::from_provider(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_literals_round_trip() {
        for literal in [
            "active",
            "trialing",
            "past_due",
            "unpaid",
            "incomplete",
            "incomplete_expired",
            "paused",
            "canceled",
            "will_cancel",
        ] {
            assert_eq!(BillingStatus::from_provider(literal).as_str(), literal);
        }
    }

    #[test]
    fn unknown_literal_is_preserved() {
        let status = BillingStatus::from_provider("on_hold");
        assert_eq!(status, BillingStatus::Other("on_hold".to_string()));
        assert_eq!(status.as_str(), "on_hold");
    }

    #[test]
    fn only_active_and_trialing_are_live() {
        assert!(BillingStatus::Active.is_live());
        assert!(BillingStatus::Trialing.is_live());
        assert!(!BillingStatus::PastDue.is_live());
        assert!(!BillingStatus::WillCancel.is_live());
        assert!(!BillingStatus::Canceled.is_live());
    }

    #[test]
    fn canceled_and_expired_are_terminal() {
        assert!(BillingStatus::Canceled.is_terminal());
        assert!(BillingStatus::IncompleteExpired.is_terminal());
        assert!(!BillingStatus::PastDue.is_terminal());
        assert!(!BillingStatus::WillCancel.is_terminal());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&BillingStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
        let back: BillingStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(back, BillingStatus::Paused);
    }
}
