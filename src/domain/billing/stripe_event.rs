//! Stripe webhook event envelope.
//!
//! Only `id`, `type` and `data.object` are required. The raw JSON is kept
//! alongside the parsed envelope so unknown keys reach the event log intact.

use serde::{Deserialize, Serialize};

use super::webhook_errors::WebhookError;

/// Envelope of a Stripe event. `data.object` stays untyped until a
/// processor asks for it with [`StripeEvent::object`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// `evt_...`; the idempotency key of the event log.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds; 0 when absent.
    #[serde(default)]
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,

    /// Present on `*.updated` events only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Parses an envelope out of an already decoded JSON document.
    pub fn from_value(payload: &serde_json::Value) -> Result<Self, WebhookError> {
        let event: StripeEvent = serde_json::from_value(payload.clone())
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        if event.id.is_empty() {
            return Err(WebhookError::MissingField("id"));
        }
        Ok(event)
    }

    /// Deserializes `data.object` as the given type.
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::InvalidPayload(format!("{} object: {}", self.event_type, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_envelope() {
        let payload = json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "data": { "object": { "id": "sub_1" } }
        });
        let event = StripeEvent::from_value(&payload).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.created, 0);
        assert!(!event.livemode);
        assert!(event.api_version.is_none());
    }

    #[test]
    fn missing_data_is_a_parse_error() {
        let payload = json!({ "id": "evt_1", "type": "x" });
        assert!(matches!(
            StripeEvent::from_value(&payload),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn empty_id_is_rejected() {
        let payload = json!({ "id": "", "type": "x", "data": { "object": {} } });
        assert!(matches!(
            StripeEvent::from_value(&payload),
            Err(WebhookError::MissingField("id"))
        ));
    }

    #[test]
    fn previous_attributes_are_optional() {
        let payload = json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "created": 1704067200,
            "livemode": true,
            "api_version": "2023-10-16",
            "data": {
                "object": {"status": "active"},
                "previous_attributes": {"status": "past_due"}
            }
        });
        let event = StripeEvent::from_value(&payload).unwrap();
        assert!(event.livemode);
        assert_eq!(
            event.data.previous_attributes.unwrap()["status"],
            json!("past_due")
        );
    }
}
