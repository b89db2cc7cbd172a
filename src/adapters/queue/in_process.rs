//! In-process webhook queue backed by a bounded tokio channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::billing::WebhookError;
use crate::ports::{WebhookJob, WebhookQueue};

/// Sending half of the webhook channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InProcessWebhookQueue {
    sender: mpsc::Sender<WebhookJob>,
}

impl InProcessWebhookQueue {
    /// Creates the queue and the receiver a [`super::WebhookWorker`] drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WebhookJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WebhookQueue for InProcessWebhookQueue {
    async fn enqueue(&self, job: WebhookJob) -> Result<(), WebhookError> {
        let event_id = job.event_id.clone();
        self.sender.try_send(job).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "queue closed",
            };
            tracing::warn!(event_id = %event_id, reason, "Webhook job rejected by queue");
            WebhookError::QueueUnavailable(reason.to_string())
        })
    }
}
