//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command/query handlers
//! and to the webhook queue.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::billing::{
    AdminSubscriptionCommand, AdminSubscriptionHandler, CancelSubscriptionCommand,
    CancelSubscriptionHandler, ChangePlanCommand, ChangePlanHandler, CheckoutUrls,
    CreateCheckoutCommand, CreateCheckoutHandler, CreatePortalSessionCommand,
    CreatePortalSessionHandler, GetSubscriptionHandler, GetSubscriptionQuery,
    GetWebhookEventHandler, HistoryRecorder, ListWebhookEventsHandler, ListWebhookEventsQuery,
    ResumeSubscriptionCommand, ResumeSubscriptionHandler, RevenueReportHandler,
    RevenueReportQuery, SubscriptionLocks,
};
use crate::domain::billing::{
    BillingError, EventLogStatus, Plan, PriceCatalog, StripeEvent, WebhookError, WebhookVerifier,
};
use crate::domain::foundation::UserId;
use crate::ports::{
    AccountRepository, EventLogStore, HistoryRepository, LedgerRepository, PaymentProvider,
    SubscriptionRepository, WebhookJob, WebhookQueue,
};

use super::dto::{
    AdminCancelRequest, CancelRequest, CancelResponse, CheckoutResponse, ErrorResponse,
    PlanChangeResponse, PlanRequest, PortalResponse, RemoteSubscriptionResponse, ResumeResponse,
    RevenueParams, RevenueResponse, SubscriptionResponse, SuccessResponse, WebhookAck,
    WebhookDetailResponse, WebhookEventResponse, WebhookListParams, WebhookListResponse,
};

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const USER_ID_HEADER: &str = "X-User-Id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Dependencies shared by every billing request.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub events: Arc<dyn EventLogStore>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub provider: Arc<dyn PaymentProvider>,
    pub queue: Arc<dyn WebhookQueue>,
    pub verifier: Arc<WebhookVerifier>,
    pub catalog: Arc<PriceCatalog>,
    pub locks: SubscriptionLocks,
    pub checkout_urls: CheckoutUrls,
    pub portal_return_url: String,
}

impl BillingAppState {
    fn recorder(&self) -> HistoryRecorder {
        HistoryRecorder::new(self.history.clone())
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.accounts.clone(),
            self.provider.clone(),
            self.catalog.clone(),
            self.locks.clone(),
        )
    }

    pub fn change_plan_handler(&self) -> ChangePlanHandler {
        ChangePlanHandler::new(
            self.subscriptions.clone(),
            self.accounts.clone(),
            self.provider.clone(),
            self.catalog.clone(),
            self.recorder(),
            self.locks.clone(),
        )
    }

    pub fn create_checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.subscriptions.clone(),
            self.accounts.clone(),
            self.provider.clone(),
            self.catalog.clone(),
            Arc::new(self.change_plan_handler()),
            self.checkout_urls.clone(),
        )
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.accounts.clone(),
            self.provider.clone(),
            self.recorder(),
            self.locks.clone(),
        )
    }

    pub fn resume_subscription_handler(&self) -> ResumeSubscriptionHandler {
        ResumeSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.accounts.clone(),
            self.provider.clone(),
            self.recorder(),
            self.locks.clone(),
        )
    }

    pub fn portal_handler(&self) -> CreatePortalSessionHandler {
        CreatePortalSessionHandler::new(
            self.subscriptions.clone(),
            self.provider.clone(),
            self.portal_return_url.clone(),
        )
    }

    pub fn admin_handler(&self) -> AdminSubscriptionHandler {
        AdminSubscriptionHandler::new(self.provider.clone())
    }

    pub fn list_webhooks_handler(&self) -> ListWebhookEventsHandler {
        ListWebhookEventsHandler::new(self.events.clone())
    }

    pub fn get_webhook_handler(&self) -> GetWebhookEventHandler {
        GetWebhookEventHandler::new(self.events.clone())
    }

    pub fn revenue_handler(&self) -> RevenueReportHandler {
        RevenueReportHandler::new(self.ledger.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity, taken from the `X-User-Id` header set by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<UserId>().ok())
            .map(CallerId)
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("authentication_required", "Authentication is required"),
                )
            })
    }
}

fn parse_plan(raw: &str) -> Result<Plan, BillingError> {
    raw.parse().map_err(|_| BillingError::invalid_plan(raw))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /billing/subscription
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    CallerId(user_id): CallerId,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .get_subscription_handler()
        .handle(GetSubscriptionQuery { user_id })
        .await?;

    Ok(Json(SuccessResponse::new(
        "Subscription retrieved",
        SubscriptionResponse::from(result),
    )))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/checkout
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<PlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = parse_plan(&request.plan)?;
    let result = state
        .create_checkout_handler()
        .handle(CreateCheckoutCommand { user_id, plan })
        .await?;

    let response = CheckoutResponse::from(result);
    let (status, message) = match response.outcome {
        "checkout" => (StatusCode::CREATED, "Checkout session created"),
        _ => (StatusCode::OK, "Plan changed"),
    };
    Ok((status, Json(SuccessResponse::new(message, response))))
}

/// POST /billing/change-plan
pub async fn change_plan(
    State(state): State<BillingAppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<PlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = parse_plan(&request.plan)?;
    let result = state
        .change_plan_handler()
        .handle(ChangePlanCommand { user_id, plan })
        .await?;

    Ok(Json(SuccessResponse::new(
        "Plan changed",
        PlanChangeResponse::from(result),
    )))
}

/// POST /billing/cancel
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    CallerId(user_id): CallerId,
    request: Option<Json<CancelRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut cmd = CancelSubscriptionCommand::by_user(user_id);
    if let Some(reason) = request.and_then(|Json(body)| body.reason) {
        cmd = cmd.with_reason(reason);
    }

    let result = state.cancel_subscription_handler().handle(cmd).await?;

    Ok(Json(SuccessResponse::new(
        "Subscription will be canceled at the end of the billing period",
        CancelResponse::from(result),
    )))
}

/// POST /billing/resume
pub async fn resume_subscription(
    State(state): State<BillingAppState>,
    CallerId(user_id): CallerId,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .resume_subscription_handler()
        .handle(ResumeSubscriptionCommand { user_id })
        .await?;

    Ok(Json(SuccessResponse::new(
        "Subscription resumed",
        ResumeResponse::from(result),
    )))
}

/// POST /billing/portal
pub async fn create_portal_session(
    State(state): State<BillingAppState>,
    CallerId(user_id): CallerId,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .portal_handler()
        .handle(CreatePortalSessionCommand { user_id })
        .await?;

    Ok(Json(SuccessResponse::new(
        "Billing portal session created",
        PortalResponse { url: result.url },
    )))
}

// ════════════════════════════════════════════════════════════════════════════════
// Admin Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /admin/subscriptions/:stripe_id/cancel
pub async fn admin_cancel_subscription(
    State(state): State<BillingAppState>,
    Path(stripe_subscription_id): Path<String>,
    request: Option<Json<AdminCancelRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let immediately = request.map(|Json(body)| body.immediately).unwrap_or(false);
    let remote = state
        .admin_handler()
        .handle(AdminSubscriptionCommand::Cancel {
            stripe_subscription_id,
            immediately,
        })
        .await?;

    Ok(Json(SuccessResponse::new(
        "Subscription cancel requested",
        RemoteSubscriptionResponse::from(remote),
    )))
}

/// POST /admin/subscriptions/:stripe_id/resume
pub async fn admin_resume_subscription(
    State(state): State<BillingAppState>,
    Path(stripe_subscription_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let remote = state
        .admin_handler()
        .handle(AdminSubscriptionCommand::Resume {
            stripe_subscription_id,
        })
        .await?;

    Ok(Json(SuccessResponse::new(
        "Subscription resumed",
        RemoteSubscriptionResponse::from(remote),
    )))
}

/// POST /admin/users/:user_id/cancel-subscription
///
/// Called by the account deletion flow before the user row is soft-deleted.
pub async fn admin_cancel_for_deletion(
    State(state): State<BillingAppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id.parse::<UserId>().map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("invalid_user_id", format!("Invalid user id: {}", user_id)),
        )
    })?;

    let result = state
        .cancel_subscription_handler()
        .handle(CancelSubscriptionCommand::for_account_deletion(user_id))
        .await?;

    Ok(Json(SuccessResponse::new(
        "Subscription canceled for account deletion",
        CancelResponse::from(result),
    )))
}

/// GET /admin/webhooks?status=failed&event_type=...&limit=...
pub async fn admin_list_webhooks(
    State(state): State<BillingAppState>,
    Query(params): Query<WebhookListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(|s| {
            EventLogStatus::parse(s).ok_or_else(|| {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("invalid_status", format!("Invalid status: {}", s)),
                )
            })
        })
        .transpose()?;

    let records = state
        .list_webhooks_handler()
        .handle(ListWebhookEventsQuery {
            status,
            event_type: params.event_type,
            limit: params.limit,
        })
        .await?;

    Ok(Json(SuccessResponse::new(
        format!("{} webhook event(s)", records.len()),
        WebhookListResponse {
            events: records.into_iter().map(WebhookEventResponse::summary).collect(),
        },
    )))
}

/// GET /admin/webhooks/:event_id
pub async fn admin_get_webhook(
    State(state): State<BillingAppState>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.get_webhook_handler().handle(&event_id).await?;
    Ok(Json(SuccessResponse::new(
        "Webhook event",
        WebhookDetailResponse {
            event: WebhookEventResponse::detail(record),
        },
    )))
}

/// GET /admin/revenue?months=6
pub async fn admin_revenue(
    State(state): State<BillingAppState>,
    Query(params): Query<RevenueParams>,
) -> Result<impl IntoResponse, ApiError> {
    let months = state
        .revenue_handler()
        .handle(RevenueReportQuery {
            months: params.months,
        })
        .await?;
    Ok(Json(SuccessResponse::new(
        "Monthly revenue",
        RevenueResponse { months },
    )))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Ingress
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/stripe
///
/// Verifies the signature and queues the event. Every well-formed, signed
/// event is acknowledged, including types no processor handles.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::InvalidSignature)?;

    state.verifier.verify(&body, signature)?;

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| WebhookError::ParseError(e.to_string()))?;
    let event = StripeEvent::from_value(&payload)?;

    state
        .queue
        .enqueue(WebhookJob::new(event.id.clone(), payload))
        .await?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Webhook event queued"
    );

    Ok(Json(WebhookAck { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error carrying its status and body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, body: ErrorResponse) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let status = match &err {
            BillingError::NoSubscription
            | BillingError::UserNotFound(_)
            | BillingError::EventNotFound(_) => StatusCode::NOT_FOUND,
            BillingError::SubscriptionExists(_)
            | BillingError::SamePlan(_)
            | BillingError::InvalidPlanChange { .. }
            | BillingError::PlanUnchanged(_)
            | BillingError::CannotCancel { .. }
            | BillingError::NotCancelable
            | BillingError::PeriodEnded => StatusCode::CONFLICT,
            BillingError::DowngradeBlocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::InvalidPlan(_) | BillingError::NoCustomer => StatusCode::BAD_REQUEST,
            BillingError::Provider(_) => StatusCode::BAD_GATEWAY,
            BillingError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, error_type = err.kind(), "Billing request failed");
        }

        let mut body = ErrorResponse::new(err.kind(), err.message());
        if let BillingError::DowngradeBlocked { groups, link, .. } = err {
            body = body.with_groups(groups, link);
        }
        Self::new(status, body)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        let error_type = match &err {
            WebhookError::InvalidSignature => "invalid_signature",
            WebhookError::TimestampOutOfRange => "timestamp_out_of_range",
            WebhookError::InvalidTimestamp => "invalid_timestamp",
            WebhookError::ParseError(_) => "parse_error",
            WebhookError::MissingField(_) => "missing_field",
            WebhookError::InvalidPayload(_) => "invalid_payload",
            WebhookError::Database(_) => "database_error",
            WebhookError::Provider(_) => "stripe_error",
            WebhookError::QueueUnavailable(_) => "queue_unavailable",
        };
        tracing::warn!(error = %err, error_type, "Webhook delivery rejected");
        Self::new(err.status_code(), ErrorResponse::new(error_type, err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
