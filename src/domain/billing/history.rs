//! Subscription plan history.
//!
//! Append-only audit trail of plan transitions. Rows written from a webhook
//! carry the provider event id, which is their idempotency key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::{HistoryId, Timestamp, UserId};

use super::ledger::DEFAULT_CURRENCY;
use super::plan::Plan;

/// Window in which an identical transition without an event id is a duplicate.
pub const DUPLICATE_WINDOW_MINUTES: i64 = 5;

/// Window in which a second cancellation of the same subscription is merged.
pub const CANCEL_MERGE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Upgraded,
    Downgraded,
    Canceled,
    Reactivated,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Upgraded => "upgraded",
            HistoryAction::Downgraded => "downgraded",
            HistoryAction::Canceled => "canceled",
            HistoryAction::Reactivated => "reactivated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(HistoryAction::Created),
            "upgraded" => Some(HistoryAction::Upgraded),
            "downgraded" => Some(HistoryAction::Downgraded),
            "canceled" => Some(HistoryAction::Canceled),
            "reactivated" => Some(HistoryAction::Reactivated),
            _ => None,
        }
    }

    /// Action for a move between two paid plans.
    pub fn for_plan_change(from: Plan, to: Plan) -> Self {
        if to.rank() < from.rank() {
            HistoryAction::Downgraded
        } else {
            HistoryAction::Upgraded
        }
    }
}

/// One recorded plan transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub user_id: UserId,
    pub stripe_subscription_id: Option<String>,
    pub action: HistoryAction,
    pub from_plan: Option<Plan>,
    pub to_plan: Plan,
    pub amount: Option<i64>,
    pub currency: String,
    pub notes: Option<String>,
    pub metadata: Map<String, Value>,
    pub webhook_event_id: Option<String>,
    pub created_at: Timestamp,
}

impl HistoryEntry {
    pub fn new(user_id: UserId, action: HistoryAction, to_plan: Plan) -> Self {
        Self {
            id: HistoryId::new(),
            user_id,
            stripe_subscription_id: None,
            action,
            from_plan: None,
            to_plan,
            amount: None,
            currency: DEFAULT_CURRENCY.to_string(),
            notes: None,
            metadata: Map::new(),
            webhook_event_id: None,
            created_at: Timestamp::now(),
        }
    }

    pub fn from_plan(mut self, plan: Option<Plan>) -> Self {
        self.from_plan = plan;
        self
    }

    pub fn for_subscription(mut self, stripe_subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(stripe_subscription_id.into());
        self
    }

    pub fn with_amount(mut self, amount: Option<i64>, currency: impl Into<String>) -> Self {
        self.amount = amount;
        self.currency = currency.into();
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.webhook_event_id = Some(event_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// True when `other` is the same transition for duplicate detection.
    pub fn same_transition(&self, other: &HistoryEntry) -> bool {
        self.user_id == other.user_id
            && self.action == other.action
            && self.from_plan == other.from_plan
            && self.to_plan == other.to_plan
    }

    /// Folds a later record of the same cancellation into this one.
    ///
    /// Keys from `incoming` overwrite existing keys. Notes are appended. An
    /// event id is adopted when this entry has none. Returns false when
    /// nothing would change.
    pub fn absorb(&mut self, incoming: &HistoryEntry) -> bool {
        let adopts_event_id =
            self.webhook_event_id.is_none() && incoming.webhook_event_id.is_some();
        let metadata_changed = incoming
            .metadata
            .iter()
            .any(|(k, v)| self.metadata.get(k) != Some(v));
        let notes_changed = match (&self.notes, &incoming.notes) {
            (_, None) => false,
            (Some(existing), Some(new)) => !existing.contains(new.as_str()),
            (None, Some(_)) => true,
        };

        if adopts_event_id {
            self.webhook_event_id = incoming.webhook_event_id.clone();
        }
        if !metadata_changed && !notes_changed {
            return adopts_event_id;
        }

        for (k, v) in &incoming.metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
        if notes_changed {
            if let Some(new) = &incoming.notes {
                self.notes = Some(match self.notes.take() {
                    Some(existing) => format!("{}\n{}", existing, new),
                    None => new.clone(),
                });
            }
        }
        true
    }
}
