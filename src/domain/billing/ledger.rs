//! Payment ledger entries.
//!
//! A ledger key is written at most once. Keys are the provider payment
//! intent id when one exists, otherwise a deterministic fallback derived
//! from the checkout session or invoice id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

/// Currency used when the provider omits one.
pub const DEFAULT_CURRENCY: &str = "jpy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Succeeded,
    /// Payment awaits customer authentication (e.g. 3-D Secure).
    RequiresAction,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Succeeded => "succeeded",
            LedgerStatus::RequiresAction => "requires_action",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(LedgerStatus::Succeeded),
            "requires_action" => Some(LedgerStatus::RequiresAction),
            "failed" => Some(LedgerStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Initial subscription payment from checkout.
    Subscription,
    /// Recurring invoice payment.
    Invoice,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Subscription => "subscription",
            LedgerKind::Invoice => "invoice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subscription" => Some(LedgerKind::Subscription),
            "invoice" => Some(LedgerKind::Invoice),
            _ => None,
        }
    }
}

/// One payment attempt or result.
///
/// `amount` is the provider-supplied value in the currency's minor unit,
/// passed through without conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub user_id: UserId,
    pub stripe_subscription_id: Option<String>,
    pub charge_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: LedgerStatus,
    pub kind: LedgerKind,
    pub paid_at: Option<Timestamp>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// Succeeded amount for one calendar month and currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`, UTC.
    pub month: String,
    pub currency: String,
    pub amount: i64,
}

/// Sums succeeded entries created at or after `since` per month and
/// currency, oldest month first.
pub fn monthly_revenue<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    since: Timestamp,
) -> Vec<MonthlyRevenue> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for entry in entries {
        if entry.status != LedgerStatus::Succeeded || entry.created_at.is_before(&since) {
            continue;
        }
        *totals
            .entry((entry.created_at.month_key(), entry.currency.clone()))
            .or_insert(0) += entry.amount;
    }
    totals
        .into_iter()
        .map(|((month, currency), amount)| MonthlyRevenue {
            month,
            currency,
            amount,
        })
        .collect()
}

/// Ledger key for a checkout payment.
pub fn checkout_key(payment_intent: Option<&str>, session_id: &str) -> String {
    match payment_intent {
        Some(pi) if !pi.is_empty() => pi.to_string(),
        _ => format!("session_{}", session_id),
    }
}

/// Ledger key for an invoice payment.
pub fn invoice_key(payment_intent: Option<&str>, invoice_id: &str) -> String {
    match payment_intent {
        Some(pi) if !pi.is_empty() => pi.to_string(),
        _ => format!("invoice_{}", invoice_id),
    }
}

/// Lowercases the provider currency or falls back to the default.
pub fn normalize_currency(currency: Option<&str>) -> String {
    currency
        .filter(|c| !c.is_empty())
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_key_prefers_payment_intent() {
        assert_eq!(checkout_key(Some("pi_1"), "cs_1"), "pi_1");
        assert_eq!(checkout_key(None, "cs_1"), "session_cs_1");
        assert_eq!(checkout_key(Some(""), "cs_1"), "session_cs_1");
    }

    #[test]
    fn invoice_key_falls_back_to_invoice_id() {
        assert_eq!(invoice_key(None, "in_9"), "invoice_in_9");
        assert_eq!(invoice_key(Some("pi_9"), "in_9"), "pi_9");
    }

    fn entry(key: &str, status: LedgerStatus, amount: i64, created_at: Timestamp) -> LedgerEntry {
        LedgerEntry {
            key: key.to_string(),
            user_id: UserId::new(),
            stripe_subscription_id: None,
            charge_id: None,
            amount,
            currency: "jpy".to_string(),
            status,
            kind: LedgerKind::Invoice,
            paid_at: None,
            metadata: serde_json::Value::Null,
            created_at,
        }
    }

    #[test]
    fn revenue_sums_succeeded_entries_per_month() {
        let jan = Timestamp::from_unix_secs(1_705_312_800).unwrap(); // 2024-01-15
        let feb = Timestamp::from_unix_secs(1_707_991_200).unwrap(); // 2024-02-15
        let entries = vec![
            entry("pi_1", LedgerStatus::Succeeded, 980, jan),
            entry("pi_2", LedgerStatus::Succeeded, 1980, jan),
            entry("pi_3", LedgerStatus::Failed, 980, jan),
            entry("pi_4", LedgerStatus::Succeeded, 980, feb),
            entry("pi_5", LedgerStatus::Succeeded, 500, jan.add_days(-60)),
        ];

        let report = monthly_revenue(&entries, jan.add_days(-14));

        assert_eq!(
            report,
            vec![
                MonthlyRevenue {
                    month: "2024-01".to_string(),
                    currency: "jpy".to_string(),
                    amount: 2960,
                },
                MonthlyRevenue {
                    month: "2024-02".to_string(),
                    currency: "jpy".to_string(),
                    amount: 980,
                },
            ]
        );
    }

    #[test]
    fn currency_defaults_to_jpy() {
        assert_eq!(normalize_currency(None), "jpy");
        assert_eq!(normalize_currency(Some("USD")), "usd");
    }

    #[test]
    fn status_and_kind_parse_their_own_output() {
        for status in [
            LedgerStatus::Succeeded,
            LedgerStatus::RequiresAction,
            LedgerStatus::Failed,
        ] {
            assert_eq!(LedgerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LedgerKind::parse("invoice"), Some(LedgerKind::Invoice));
        assert_eq!(LedgerKind::parse("refund"), None);
    }
}
