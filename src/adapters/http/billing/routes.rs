//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    admin_cancel_for_deletion, admin_cancel_subscription, admin_resume_subscription,
    admin_get_webhook, admin_list_webhooks, admin_revenue, cancel_subscription, change_plan,
    create_checkout, create_portal_session, get_subscription, handle_stripe_webhook,
    resume_subscription, BillingAppState,
};

/// User endpoints, identified by `X-User-Id`.
///
/// - `GET /subscription` - Current plan and subscription, synced from Stripe
/// - `POST /checkout` - Start checkout, or change plan when already subscribed
/// - `POST /change-plan` - Move between paid plans
/// - `POST /cancel` - Cancel at period end
/// - `POST /resume` - Withdraw a scheduled cancellation
/// - `POST /portal` - Open the Stripe billing portal
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/subscription", get(get_subscription))
        .route("/checkout", post(create_checkout))
        .route("/change-plan", post(change_plan))
        .route("/cancel", post(cancel_subscription))
        .route("/resume", post(resume_subscription))
        .route("/portal", post(create_portal_session))
}

/// Operator endpoints. Expected behind an admin-only gateway.
///
/// - `GET /webhooks` - Recent webhook log, filtered by `status` and `event_type`
/// - `GET /webhooks/:event_id` - One webhook log entry with its payload
/// - `GET /revenue` - Succeeded payments per month
pub fn admin_routes() -> Router<BillingAppState> {
    Router::new()
        .route(
            "/subscriptions/:stripe_id/cancel",
            post(admin_cancel_subscription),
        )
        .route(
            "/subscriptions/:stripe_id/resume",
            post(admin_resume_subscription),
        )
        .route(
            "/users/:user_id/cancel-subscription",
            post(admin_cancel_for_deletion),
        )
        .route("/webhooks", get(admin_list_webhooks))
        .route("/webhooks/:event_id", get(admin_get_webhook))
        .route("/revenue", get(admin_revenue))
}

/// Provider callbacks, authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Mounts `/billing`, `/admin` and `/webhooks`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/admin", admin_routes())
        .nest("/webhooks", webhook_routes())
}
