//! In-memory `PaymentProvider` for handler and pipeline tests.
//!
//! Remote subscriptions are seeded with [`MockPaymentProvider::add_subscription`]
//! and mutated by update/cancel calls the way Stripe would. Failures can be
//! injected per method or for the next call only, and every call is logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::billing::BillingStatus;
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, PaymentError, PaymentProvider, PortalSession,
    RemoteSubscription, RemoteSubscriptionItem, SubscriptionUpdate,
};

const THIRTY_DAYS_SECS: i64 = 30 * 24 * 60 * 60;

/// Cheap to clone; clones share state so a test can keep a handle after
/// passing one into a handler.
#[derive(Clone, Default)]
pub struct MockPaymentProvider {
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Default)]
struct ProviderState {
    remote: HashMap<String, RemoteSubscription>,
    failing_methods: HashMap<&'static str, PaymentError>,
    fail_next: Option<PaymentError>,
    checkouts: Vec<CreateCheckoutRequest>,
    log: Vec<ProviderCall>,
}

/// One logged provider call. `args` holds the ids and urls passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub method: &'static str,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active subscription with a single item on `price_id`, renewing in 30 days.
    pub fn active_subscription(id: &str, price_id: &str) -> RemoteSubscription {
        let suffix = id.trim_start_matches("sub_");
        RemoteSubscription {
            id: id.to_string(),
            customer_id: Some(format!("cus_{}", suffix)),
            status: BillingStatus::Active,
            current_period_end: Some(chrono::Utc::now().timestamp() + THIRTY_DAYS_SECS),
            cancel_at_period_end: false,
            items: vec![RemoteSubscriptionItem {
                id: format!("si_{}", suffix),
                price_id: Some(price_id.to_string()),
            }],
        }
    }

    // A test that panicked while holding the lock should not cascade.
    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Seeding and Failure Injection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn add_subscription(&self, subscription: RemoteSubscription) {
        self.state()
            .remote
            .insert(subscription.id.clone(), subscription);
    }

    pub fn subscription(&self, id: &str) -> Option<RemoteSubscription> {
        self.state().remote.get(id).cloned()
    }

    /// Fails only the next call, whichever method it is.
    pub fn set_error(&self, error: PaymentError) {
        self.state().fail_next = Some(error);
    }

    /// Fails every call to `method` until [`clear_errors`](Self::clear_errors).
    pub fn set_method_error(&self, method: &'static str, error: PaymentError) {
        self.state().failing_methods.insert(method, error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.fail_next = None;
        state.failing_methods.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state().log.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().log.iter().filter(|c| c.method == method).count()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn last_checkout_request(&self) -> Option<CreateCheckoutRequest> {
        self.state().checkouts.last().cloned()
    }

    /// Logs the call, then returns the injected failure for it if any.
    fn enter(&self, method: &'static str, args: &[&str]) -> Result<(), PaymentError> {
        let mut state = self.state();
        state.log.push(ProviderCall {
            method,
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        if let Some(error) = state.failing_methods.get(method) {
            return Err(error.clone());
        }
        match state.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_remote<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut RemoteSubscription) -> Result<T, PaymentError>,
    ) -> Result<T, PaymentError> {
        let mut state = self.state();
        let remote = state
            .remote
            .get_mut(id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;
        f(remote)
    }
}

fn session_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.enter(
            "create_checkout_session",
            &[&request.customer_email, &request.price_id],
        )?;
        self.state().checkouts.push(request);

        let id = format!("cs_test_{}", session_suffix());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            id,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, PaymentError> {
        self.enter("retrieve_subscription", &[subscription_id])?;
        self.with_remote(subscription_id, |remote| Ok(remote.clone()))
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<RemoteSubscription, PaymentError> {
        self.enter(
            "update_subscription",
            &[
                subscription_id,
                update.price_id.as_deref().unwrap_or("-"),
            ],
        )?;
        self.with_remote(subscription_id, |remote| {
            if let Some(price_id) = update.price_id {
                let item = match update.item_id.as_deref() {
                    Some(item_id) => remote.items.iter_mut().find(|i| i.id == item_id),
                    None => remote.items.first_mut(),
                }
                .ok_or_else(|| PaymentError::invalid_request("No such subscription item"))?;
                item.price_id = Some(price_id);
            }
            if let Some(cancel) = update.cancel_at_period_end {
                remote.cancel_at_period_end = cancel;
            }
            Ok(remote.clone())
        })
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, PaymentError> {
        self.enter("cancel_subscription", &[subscription_id])?;
        self.with_remote(subscription_id, |remote| {
            remote.status = BillingStatus::Canceled;
            remote.cancel_at_period_end = false;
            Ok(remote.clone())
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        self.enter("create_portal_session", &[customer_id, return_url])?;
        Ok(PortalSession {
            url: format!("https://billing.stripe.com/p/session/test_{}", session_suffix()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PaymentErrorCode;

    fn seeded() -> MockPaymentProvider {
        let mock = MockPaymentProvider::new();
        mock.add_subscription(MockPaymentProvider::active_subscription("sub_1", "price_s"));
        mock
    }

    #[tokio::test]
    async fn price_change_updates_item_and_clears_cancel_flag() {
        let mock = seeded();
        mock.update_subscription("sub_1", SubscriptionUpdate::cancel_at_period_end(true))
            .await
            .unwrap();

        let updated = mock
            .update_subscription("sub_1", SubscriptionUpdate::change_price("si_1", "price_p"))
            .await
            .unwrap();

        assert_eq!(updated.items[0].price_id.as_deref(), Some("price_p"));
        assert!(!updated.cancel_at_period_end);
        assert_eq!(mock.call_count("update_subscription"), 2);
    }

    #[tokio::test]
    async fn unknown_item_is_invalid_request() {
        let mock = seeded();
        let err = mock
            .update_subscription("sub_1", SubscriptionUpdate::change_price("si_other", "price_p"))
            .await
            .unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn method_failure_sticks_until_cleared() {
        let mock = seeded();
        mock.set_method_error("retrieve_subscription", PaymentError::network("down"));

        assert!(mock.retrieve_subscription("sub_1").await.is_err());
        assert!(mock.retrieve_subscription("sub_1").await.is_err());

        mock.clear_errors();
        assert!(mock.retrieve_subscription("sub_1").await.is_ok());
    }

    #[tokio::test]
    async fn next_failure_is_consumed_once() {
        let mock = MockPaymentProvider::new();
        mock.set_error(PaymentError::provider("boom"));
        assert!(mock.create_portal_session("cus_1", "/billing").await.is_err());
        assert!(mock.create_portal_session("cus_1", "/billing").await.is_ok());
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn cancel_marks_remote_canceled() {
        let mock = seeded();
        let canceled = mock.cancel_subscription("sub_1").await.unwrap();
        assert_eq!(canceled.status, BillingStatus::Canceled);

        let err = mock.cancel_subscription("sub_missing").await.unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::NotFound);
    }
}
