//! Request and response bodies for the billing API.
//!
//! Success bodies are `{status: "success", message, ...data}` and error bodies
//! `{status: "error", error_type, message, ...detail}`.

use serde::{Deserialize, Serialize};

use crate::application::billing::{
    CancelSubscriptionResult, ChangePlanResult, CreateCheckoutResult, GetSubscriptionResult,
    ResumeSubscriptionResult, SubscriptionDetails,
};
use crate::domain::billing::{
    BillingStatus, EventLogRecord, EventLogStatus, HistoryAction, MonthlyRevenue, Plan,
};
use crate::domain::foundation::Timestamp;
use crate::ports::RemoteSubscription;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /billing/checkout` and `POST /billing/change-plan`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub plan: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Query string of `GET /admin/webhooks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookListParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevenueParams {
    #[serde(default)]
    pub months: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminCancelRequest {
    /// End the subscription now instead of at period end.
    #[serde(default)]
    pub immediately: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub status: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub plan: Plan,
    pub subscription: Option<SubscriptionDetails>,
}

impl From<GetSubscriptionResult> for SubscriptionResponse {
    fn from(result: GetSubscriptionResult) -> Self {
        Self {
            plan: result.plan,
            subscription: result.subscription,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanChangeResponse {
    pub stripe_subscription_id: String,
    pub from: Plan,
    pub to: Plan,
    pub action: HistoryAction,
}

impl From<ChangePlanResult> for PlanChangeResponse {
    fn from(result: ChangePlanResult) -> Self {
        Self {
            stripe_subscription_id: result.stripe_subscription_id,
            from: result.from,
            to: result.to,
            action: result.action,
        }
    }
}

/// Either a hosted checkout to redirect to, or the plan change it was routed to.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_change: Option<PlanChangeResponse>,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        match result {
            CreateCheckoutResult::Checkout { session_id, url } => Self {
                outcome: "checkout",
                session_id: Some(session_id),
                url: Some(url),
                plan_change: None,
            },
            CreateCheckoutResult::PlanChanged(changed) => Self {
                outcome: "plan_changed",
                session_id: None,
                url: None,
                plan_change: Some(changed.into()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub stripe_subscription_id: String,
    pub cancel_at: Option<Timestamp>,
    pub provider_synced: bool,
}

impl From<CancelSubscriptionResult> for CancelResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            stripe_subscription_id: result.stripe_subscription_id,
            cancel_at: result.cancel_at,
            provider_synced: result.provider_synced,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeResponse {
    pub stripe_subscription_id: String,
    pub current_period_end: Option<Timestamp>,
}

impl From<ResumeSubscriptionResult> for ResumeResponse {
    fn from(result: ResumeSubscriptionResult) -> Self {
        Self {
            stripe_subscription_id: result.stripe_subscription_id,
            current_period_end: result.current_period_end,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteSubscriptionResponse {
    pub stripe_subscription_id: String,
    pub subscription_status: BillingStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<Timestamp>,
}

impl From<RemoteSubscription> for RemoteSubscriptionResponse {
    fn from(remote: RemoteSubscription) -> Self {
        Self {
            current_period_end: remote.current_period_end.and_then(Timestamp::from_unix_secs),
            stripe_subscription_id: remote.id,
            subscription_status: remote.status,
            cancel_at_period_end: remote.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventResponse {
    pub event_id: String,
    pub event_type: String,
    pub status: EventLogStatus,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    /// Present on single-event lookups only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl WebhookEventResponse {
    pub fn summary(record: EventLogRecord) -> Self {
        let mut response = Self::detail(record);
        response.payload = None;
        response
    }

    pub fn detail(record: EventLogRecord) -> Self {
        Self {
            event_id: record.event_id,
            event_type: record.event_type,
            status: record.status,
            error_message: record.error_message,
            attempts: record.attempts,
            processed_at: record.processed_at,
            created_at: record.created_at,
            payload: Some(record.payload),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookDetailResponse {
    pub event: WebhookEventResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookListResponse {
    pub events: Vec<WebhookEventResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueResponse {
    pub months: Vec<MonthlyRevenue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Error body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error_type: String,
    pub message: String,
    /// Groups blocking a downgrade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            error_type: error_type.into(),
            message: message.into(),
            groups: None,
            link: None,
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>, link: impl Into<String>) -> Self {
        self.groups = Some(groups);
        self.link = Some(link.into());
        self
    }
}
