//! Webhook queue boundary.
//!
//! Ingress hands each verified event to a [`WebhookQueue`]; a worker later
//! runs it through a [`WebhookJobHandler`] with bounded retries.

use async_trait::async_trait;

use crate::domain::billing::WebhookError;
use crate::domain::foundation::Timestamp;

/// One queued delivery.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub event_id: String,
    pub payload: serde_json::Value,
    pub enqueued_at: Timestamp,
}

impl WebhookJob {
    pub fn new(event_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: event_id.into(),
            payload,
            enqueued_at: Timestamp::now(),
        }
    }
}

#[async_trait]
pub trait WebhookQueue: Send + Sync {
    async fn enqueue(&self, job: WebhookJob) -> Result<(), WebhookError>;
}

/// The unit of work a queued job performs.
///
/// An `Err` tells the worker the attempt failed and may be retried.
#[async_trait]
pub trait WebhookJobHandler: Send + Sync {
    async fn handle(&self, payload: &serde_json::Value) -> Result<(), WebhookError>;
}
