//! Webhook queue adapters.
//!
//! - `in_process` - bounded tokio channel implementing `WebhookQueue`
//! - `worker` - retry executor draining the channel into the pipeline

mod in_process;
mod worker;

pub use in_process::InProcessWebhookQueue;
pub use worker::{JobOutcome, RetryPolicy, WebhookWorker};
