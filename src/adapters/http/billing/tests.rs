use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use super::*;
use crate::adapters::http::app_router;
use crate::adapters::memory::InMemoryBillingStore;
use crate::adapters::queue::InProcessWebhookQueue;
use crate::adapters::stripe::MockPaymentProvider;
use crate::application::billing::{CheckoutUrls, SubscriptionLocks};
use crate::domain::billing::{
    sign_payload, BillingAccount, BillingStatus, CheckoutActivation, OwnedGroup, Plan,
    PriceCatalog, Subscription, WebhookVerifier,
};
use crate::domain::foundation::{GroupId, Timestamp, UserId};
use crate::ports::{EventLogStore, WebhookJob};

const SECRET: &str = "whsec_test_secret";

struct TestApp {
    router: Router,
    store: InMemoryBillingStore,
    provider: MockPaymentProvider,
    jobs: mpsc::Receiver<WebhookJob>,
}

fn test_app() -> TestApp {
    let store = InMemoryBillingStore::new();
    let provider = MockPaymentProvider::new();
    let (queue, jobs) = InProcessWebhookQueue::channel(8);

    let state = BillingAppState {
        subscriptions: Arc::new(store.clone()),
        accounts: Arc::new(store.clone()),
        history: Arc::new(store.clone()),
        events: Arc::new(store.clone()),
        ledger: Arc::new(store.clone()),
        provider: Arc::new(provider.clone()),
        queue: Arc::new(queue),
        verifier: Arc::new(WebhookVerifier::new(SecretString::new(SECRET.to_string()))),
        catalog: Arc::new(PriceCatalog::new("price_std", "price_prem")),
        locks: SubscriptionLocks::new(),
        checkout_urls: CheckoutUrls {
            success_url: "https://app.example.com/billing/success".to_string(),
            cancel_url: "https://app.example.com/billing/cancelled".to_string(),
        },
        portal_return_url: "https://app.example.com/billing".to_string(),
    };

    TestApp {
        router: app_router(state, Duration::from_secs(5)),
        store,
        provider,
        jobs,
    }
}

async fn subscribed_user(app: &TestApp, plan: Plan) -> UserId {
    let user = UserId::new();
    let mut account = BillingAccount::new(user, "owner@example.com");
    account.plan = plan;
    account.subscription_status = Some(BillingStatus::Active);
    app.store.insert_account(account).await;
    app.store
        .insert_subscription(Subscription::from_checkout(CheckoutActivation {
            user_id: user,
            stripe_subscription_id: "sub_1".to_string(),
            stripe_customer_id: Some("cus_1".to_string()),
            plan,
            current_period_end: Timestamp::now().add_days(20),
        }))
        .await;
    let price = if plan == Plan::Premium { "price_prem" } else { "price_std" };
    app.provider
        .add_subscription(MockPaymentProvider::active_subscription("sub_1", price));
    user
}

fn user_request(method: &str, uri: &str, user: UserId, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string());
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn webhook_request(payload: &Value, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(STRIPE_SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Ingress
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn signed_webhook_is_queued() {
    let mut app = test_app();
    let payload = json!({
        "id": "evt_1",
        "type": "customer.subscription.updated",
        "created": 1_700_000_000,
        "data": { "object": { "id": "sub_1" } }
    });
    let signature = sign_payload(
        SECRET,
        chrono::Utc::now().timestamp(),
        payload.to_string().as_bytes(),
    );

    let (status, body) = send(&app.router, webhook_request(&payload, Some(signature))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    let job = app.jobs.try_recv().unwrap();
    assert_eq!(job.event_id, "evt_1");
}

#[tokio::test]
async fn unknown_event_type_is_still_acknowledged() {
    let mut app = test_app();
    let payload = json!({
        "id": "evt_2",
        "type": "customer.created",
        "created": 1_700_000_000,
        "data": { "object": {} }
    });
    let signature = sign_payload(
        SECRET,
        chrono::Utc::now().timestamp(),
        payload.to_string().as_bytes(),
    );

    let (status, _) = send(&app.router, webhook_request(&payload, Some(signature))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.jobs.try_recv().is_ok());
}

#[tokio::test]
async fn forged_signature_is_rejected() {
    let mut app = test_app();
    let payload = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } });
    let signature = sign_payload(
        "whsec_other",
        chrono::Utc::now().timestamp(),
        payload.to_string().as_bytes(),
    );

    let (status, body) = send(&app.router, webhook_request(&payload, Some(signature))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_type"], "invalid_signature");
    assert!(app.jobs.try_recv().is_err());
}

#[tokio::test]
async fn stale_signature_is_rejected() {
    let app = test_app();
    let payload = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } });
    let signature = sign_payload(
        SECRET,
        chrono::Utc::now().timestamp() - 600,
        payload.to_string().as_bytes(),
    );

    let (status, body) = send(&app.router, webhook_request(&payload, Some(signature))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_type"], "timestamp_out_of_range");
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = test_app();
    let payload = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } });

    let (status, _) = send(&app.router, webhook_request(&payload, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ════════════════════════════════════════════════════════════════════════════════
// User Endpoints
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn requests_without_user_header_are_unauthorized() {
    let app = test_app();
    let request = Request::builder()
        .uri("/billing/subscription")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_type"], "authentication_required");
}

#[tokio::test]
async fn subscription_details_are_returned() {
    let app = test_app();
    let user = subscribed_user(&app, Plan::Standard).await;

    let (status, body) = send(
        &app.router,
        user_request("GET", "/billing/subscription", user, None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["plan"], "standard");
    assert_eq!(body["subscription"]["stripe_subscription_id"], "sub_1");
    assert_eq!(body["subscription"]["can_cancel"], true);
}

#[tokio::test]
async fn checkout_for_free_user_returns_session() {
    let app = test_app();
    let user = UserId::new();
    app.store
        .insert_account(BillingAccount::new(user, "new@example.com"))
        .await;

    let (status, body) = send(
        &app.router,
        user_request("POST", "/billing/checkout", user, Some(json!({ "plan": "premium" }))),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "checkout");
    assert!(body["url"].as_str().unwrap().starts_with("https://checkout.stripe.com/"));
    let request = app.provider.last_checkout_request().unwrap();
    assert_eq!(request.price_id, "price_prem");
}

#[tokio::test]
async fn unknown_plan_is_bad_request() {
    let app = test_app();
    let user = subscribed_user(&app, Plan::Standard).await;

    let (status, body) = send(
        &app.router,
        user_request("POST", "/billing/checkout", user, Some(json!({ "plan": "gold" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "invalid_plan");
}

#[tokio::test]
async fn cancel_without_subscription_is_not_found() {
    let app = test_app();
    let user = UserId::new();
    app.store
        .insert_account(BillingAccount::new(user, "free@example.com"))
        .await;

    let (status, body) = send(&app.router, user_request("POST", "/billing/cancel", user, None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_type"], "no_subscription");
}

#[tokio::test]
async fn cancel_then_resume_round_trip() {
    let app = test_app();
    let user = subscribed_user(&app, Plan::Standard).await;

    let (status, body) = send(
        &app.router,
        user_request(
            "POST",
            "/billing/cancel",
            user,
            Some(json!({ "reason": "too expensive" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider_synced"], true);

    let (status, body) = send(&app.router, user_request("POST", "/billing/resume", user, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stripe_subscription_id"], "sub_1");
}

#[tokio::test]
async fn blocked_downgrade_lists_groups() {
    let app = test_app();
    let user = subscribed_user(&app, Plan::Premium).await;
    app.store
        .insert_group(OwnedGroup {
            id: GroupId::new(),
            owner_id: user,
            name: "Big Choir".to_string(),
            max_members: 200,
            active_member_count: 80,
        })
        .await;

    let (status, body) = send(
        &app.router,
        user_request(
            "POST",
            "/billing/change-plan",
            user,
            Some(json!({ "plan": "standard" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_type"], "downgrade_blocked");
    assert_eq!(body["groups"], json!(["Big Choir"]));
    assert_eq!(body["link"], "/user/groups");
    assert!(!app.provider.was_called("update_subscription"));
}

#[tokio::test]
async fn portal_session_is_opened() {
    let app = test_app();
    let user = subscribed_user(&app, Plan::Standard).await;

    let (status, body) = send(&app.router, user_request("POST", "/billing/portal", user, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().is_some());
}

// ════════════════════════════════════════════════════════════════════════════════
// Admin Endpoints
// ════════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn admin_cancel_defaults_to_period_end() {
    let app = test_app();
    app.provider
        .add_subscription(MockPaymentProvider::active_subscription("sub_9", "price_std"));
    let request = Request::builder()
        .method("POST")
        .uri("/admin/subscriptions/sub_9/cancel")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancel_at_period_end"], true);
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn admin_deletion_cancel_rejects_bad_user_id() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/admin/users/not-a-uuid/cancel-subscription")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "invalid_user_id");
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn admin_lists_failed_webhooks_without_payloads() {
    let app = test_app();
    app.store
        .ingest("evt_ok", "invoice.payment_succeeded", json!({ "id": "evt_ok" }))
        .await
        .unwrap();
    app.store.mark_processed("evt_ok").await.unwrap();
    app.store
        .ingest("evt_bad", "invoice.payment_failed", json!({ "id": "evt_bad" }))
        .await
        .unwrap();
    app.store.mark_failed("evt_bad", "db down").await.unwrap();

    let (status, body) = send(&app.router, admin_get("/admin/webhooks?status=failed&limit=10")).await;

    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_id"], "evt_bad");
    assert_eq!(events[0]["status"], "failed");
    assert_eq!(events[0]["error_message"], "db down");
    assert!(events[0].get("payload").is_none());
}

#[tokio::test]
async fn admin_webhook_list_rejects_unknown_status() {
    let app = test_app();

    let (status, body) = send(&app.router, admin_get("/admin/webhooks?status=lost")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "invalid_status");
}

#[tokio::test]
async fn admin_webhook_detail_includes_payload() {
    let app = test_app();
    app.store
        .ingest("evt_1", "checkout.session.completed", json!({ "id": "evt_1", "n": 7 }))
        .await
        .unwrap();

    let (status, body) = send(&app.router, admin_get("/admin/webhooks/evt_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["event"]["event_type"], "checkout.session.completed");
    assert_eq!(body["event"]["payload"]["n"], 7);

    let (status, body) = send(&app.router, admin_get("/admin/webhooks/evt_none")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_type"], "event_not_found");
}

#[tokio::test]
async fn admin_revenue_is_empty_without_payments() {
    let app = test_app();

    let (status, body) = send(&app.router, admin_get("/admin/revenue?months=6")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["months"], json!([]));
}
