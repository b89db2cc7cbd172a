//! Typed views over the `data.object` of the events we reconcile.
//!
//! Fields are optional wherever Stripe may omit them so that a sparse
//! payload becomes a benign no-op instead of a processing failure.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::status::BillingStatus;

/// Reference to another Stripe object, either as an id or expanded inline.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ObjectRef {
    Id(String),
    Expanded(Map<String, Value>),
}

impl ObjectRef {
    pub fn id(&self) -> Option<&str> {
        match self {
            ObjectRef::Id(id) => Some(id.as_str()),
            ObjectRef::Expanded(obj) => obj.get("id").and_then(Value::as_str),
        }
    }

    /// `status` of an expanded object.
    pub fn status(&self) -> Option<&str> {
        match self {
            ObjectRef::Id(_) => None,
            ObjectRef::Expanded(obj) => obj.get("status").and_then(Value::as_str),
        }
    }

    /// Charge id of an expanded payment intent.
    ///
    /// Reads `latest_charge`, falling back to `charges.data[0].id`.
    pub fn charge_id(&self) -> Option<&str> {
        let ObjectRef::Expanded(obj) = self else {
            return None;
        };
        match obj.get("latest_charge") {
            Some(Value::String(id)) => return Some(id.as_str()),
            Some(Value::Object(charge)) => return charge.get("id").and_then(Value::as_str),
            _ => {}
        }
        obj.get("charges")
            .and_then(|c| c.get("data"))
            .and_then(|d| d.get(0))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
    }
}

/// Stripe list wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

/// `checkout.session` object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub customer: Option<ObjectRef>,
    pub customer_details: Option<CustomerDetails>,
    pub customer_email: Option<String>,
    pub subscription: Option<ObjectRef>,
    pub payment_intent: Option<ObjectRef>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    /// Email the customer completed checkout with.
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
            .filter(|e| !e.is_empty())
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().and_then(ObjectRef::id)
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().and_then(ObjectRef::id)
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().and_then(ObjectRef::id)
    }

    pub fn charge_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().and_then(ObjectRef::charge_id)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceObject {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItemObject {
    pub price: Option<PriceObject>,
    pub current_period_end: Option<i64>,
}

/// `subscription` object.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: Option<ObjectRef>,
    #[serde(default)]
    pub status: String,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub items: List<SubscriptionItemObject>,
}

impl SubscriptionObject {
    /// Price of the first subscription item.
    pub fn first_price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|p| p.id.as_str())
    }

    /// Period end from the subscription, or from its first item on API
    /// versions that moved it there.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().and_then(ObjectRef::id)
    }
}

/// `invoice` object.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: Option<ObjectRef>,
    pub subscription: Option<ObjectRef>,
    pub payment_intent: Option<ObjectRef>,
    pub charge: Option<ObjectRef>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: Option<String>,
    pub billing_reason: Option<String>,
}

impl InvoiceObject {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().and_then(ObjectRef::id)
    }

    /// Status of the subscription when the invoice embeds it expanded.
    pub fn subscription_status(&self) -> Option<BillingStatus> {
        self.subscription
            .as_ref()
            .and_then(ObjectRef::status)
            .map(BillingStatus::from_provider)
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent.as_ref().and_then(ObjectRef::id)
    }

    pub fn charge_id(&self) -> Option<&str> {
        self.charge
            .as_ref()
            .and_then(ObjectRef::id)
            .or_else(|| self.payment_intent.as_ref().and_then(ObjectRef::charge_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_ref_accepts_id_or_object() {
        let id: ObjectRef = serde_json::from_value(json!("pi_1")).unwrap();
        assert_eq!(id.id(), Some("pi_1"));

        let expanded: ObjectRef =
            serde_json::from_value(json!({"id": "pi_2", "latest_charge": "ch_2"})).unwrap();
        assert_eq!(expanded.id(), Some("pi_2"));
        assert_eq!(expanded.charge_id(), Some("ch_2"));
    }

    #[test]
    fn charge_id_falls_back_to_charge_list() {
        let expanded: ObjectRef = serde_json::from_value(json!({
            "id": "pi_3",
            "charges": { "data": [ { "id": "ch_3" } ] }
        }))
        .unwrap();
        assert_eq!(expanded.charge_id(), Some("ch_3"));
    }

    #[test]
    fn checkout_session_reads_email_and_metadata() {
        let session: CheckoutSessionObject = serde_json::from_value(json!({
            "id": "cs_1",
            "customer": "cus_1",
            "customer_details": { "email": "a@example.com" },
            "subscription": "sub_1",
            "amount_total": 1980,
            "metadata": { "plan": "premium", "upgrade_from": "" }
        }))
        .unwrap();
        assert_eq!(session.email(), Some("a@example.com"));
        assert_eq!(session.subscription_id(), Some("sub_1"));
        assert_eq!(session.metadata_value("plan"), Some("premium"));
        assert_eq!(session.metadata_value("upgrade_from"), None);
        assert!(session.payment_intent_id().is_none());
    }

    #[test]
    fn sparse_checkout_session_still_parses() {
        let session: CheckoutSessionObject =
            serde_json::from_value(json!({ "id": "cs_2" })).unwrap();
        assert!(session.email().is_none());
        assert!(session.subscription_id().is_none());
    }

    #[test]
    fn subscription_period_end_falls_back_to_item() {
        let sub: SubscriptionObject = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "items": { "data": [ { "price": { "id": "price_p" }, "current_period_end": 1700000000 } ] }
        }))
        .unwrap();
        assert_eq!(sub.period_end(), Some(1_700_000_000));
        assert_eq!(sub.first_price_id(), Some("price_p"));
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn invoice_defaults_amounts() {
        let invoice: InvoiceObject =
            serde_json::from_value(json!({ "id": "in_1", "subscription": "sub_1" })).unwrap();
        assert_eq!(invoice.amount_paid, 0);
        assert_eq!(invoice.subscription_id(), Some("sub_1"));
        assert!(invoice.subscription_status().is_none());
    }

    #[test]
    fn invoice_reads_expanded_subscription_status() {
        let invoice: InvoiceObject = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": { "id": "sub_1", "status": "past_due" }
        }))
        .unwrap();
        assert_eq!(invoice.subscription_id(), Some("sub_1"));
        assert_eq!(invoice.subscription_status(), Some(BillingStatus::PastDue));
    }
}
