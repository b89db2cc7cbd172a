//! WebhookWorker - Background executor for queued webhook jobs.
//!
//! Each job runs through the [`WebhookJobHandler`] with a per-attempt
//! timeout. Failed attempts are retried with linear backoff until the
//! attempt budget is spent; the last failure is logged as permanent.
//! Errors the handler marks as non-retryable stop immediately.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_attempts` | 3 | Attempts per job, first one included |
//! | `attempt_timeout` | 120s | Wall-clock budget of one attempt |
//! | `backoff` | 1s | Delay before attempt `n + 1` is `backoff * n` |
//! | `concurrency` | 4 | Jobs in flight at once |
//!
//! ## Graceful Shutdown
//!
//! The worker stops taking jobs when the shutdown signal fires and waits
//! for in-flight jobs to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;

use crate::ports::{WebhookJob, WebhookJobHandler};

/// Retry parameters for one job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
    pub concurrency: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(120),
            backoff: Duration::from_secs(1),
            concurrency: 4,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Final result of running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { attempts: u32 },
    /// Failed with an error that retrying cannot fix.
    Rejected { attempts: u32, error: String },
    /// Every attempt failed or timed out.
    Exhausted { attempts: u32, error: String },
}

pub struct WebhookWorker {
    handler: Arc<dyn WebhookJobHandler>,
    policy: RetryPolicy,
}

impl WebhookWorker {
    pub fn new(handler: Arc<dyn WebhookJobHandler>, policy: RetryPolicy) -> Self {
        Self { handler, policy }
    }

    /// Drains `jobs` until the channel closes or shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::Receiver<WebhookJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let slots = Arc::new(Semaphore::new(self.policy.concurrency));
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(in_flight = in_flight.len(), "Webhook worker shutting down");
                        break;
                    }
                }

                job = jobs.recv() => {
                    let Some(job) = job else { break };
                    let Ok(permit) = slots.clone().acquire_owned().await else { break };
                    let worker = self.clone();
                    in_flight.spawn(async move {
                        worker.execute(job).await;
                        drop(permit);
                    });
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        while in_flight.join_next().await.is_some() {}
    }

    /// Runs one job to completion under the retry policy.
    pub async fn execute(&self, job: WebhookJob) -> JobOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result =
                tokio::time::timeout(self.policy.attempt_timeout, self.handler.handle(&job.payload))
                    .await;

            let error = match result {
                Ok(Ok(())) => {
                    if attempt > 1 {
                        tracing::info!(event_id = %job.event_id, attempt, "Webhook job succeeded after retry");
                    }
                    return JobOutcome::Completed { attempts: attempt };
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    tracing::error!(
                        event_id = %job.event_id,
                        attempt,
                        error = %e,
                        "Webhook job rejected, not retrying"
                    );
                    return JobOutcome::Rejected {
                        attempts: attempt,
                        error: e.to_string(),
                    };
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "attempt timed out after {}s",
                    self.policy.attempt_timeout.as_secs_f64()
                ),
            };

            if attempt >= self.policy.max_attempts {
                tracing::error!(
                    event_id = %job.event_id,
                    attempt,
                    error = %error,
                    "Webhook job permanently failed"
                );
                return JobOutcome::Exhausted {
                    attempts: attempt,
                    error,
                };
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                event_id = %job.event_id,
                attempt,
                max_attempts = self.policy.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "Webhook job attempt failed"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::WebhookError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// Fails the first `failures` calls with the given error, then succeeds.
    struct ScriptedHandler {
        failures: u32,
        error: WebhookError,
        delay: Duration,
        calls: AtomicU32,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedHandler {
        fn new(failures: u32, error: WebhookError) -> Self {
            Self {
                failures,
                error,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(0, WebhookError::Database("unused".into()))
            }
        }
    }

    #[async_trait]
    impl WebhookJobHandler for ScriptedHandler {
        async fn handle(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(id) = payload.get("id").and_then(|v| v.as_str()) {
                self.seen.lock().await.push(id.to_string());
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_backoff(Duration::ZERO)
            .with_attempt_timeout(Duration::from_secs(5))
    }

    fn job(id: &str) -> WebhookJob {
        WebhookJob::new(id, json!({ "id": id }))
    }

    // ══════════════════════════════════════════════════════════════
    // Retry Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let handler = Arc::new(ScriptedHandler::new(2, WebhookError::Database("down".into())));
        let worker = WebhookWorker::new(handler.clone(), fast_policy());

        let outcome = worker.execute(job("evt_1")).await;

        assert_eq!(outcome, JobOutcome::Completed { attempts: 3 });
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let handler = Arc::new(ScriptedHandler::new(10, WebhookError::Provider("503".into())));
        let worker = WebhookWorker::new(handler.clone(), fast_policy());

        let outcome = worker.execute(job("evt_1")).await;

        assert!(matches!(outcome, JobOutcome::Exhausted { attempts: 3, .. }));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_payload_is_not_retried() {
        let handler = Arc::new(ScriptedHandler::new(10, WebhookError::ParseError("bad".into())));
        let worker = WebhookWorker::new(handler.clone(), fast_policy());

        let outcome = worker.execute(job("evt_1")).await;

        assert!(matches!(outcome, JobOutcome::Rejected { attempts: 1, .. }));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let handler = Arc::new(ScriptedHandler::slow(Duration::from_secs(5)));
        let policy = fast_policy()
            .with_attempt_timeout(Duration::from_millis(20))
            .with_max_attempts(2);
        let worker = WebhookWorker::new(handler.clone(), policy);

        let outcome = worker.execute(job("evt_1")).await;

        match outcome {
            JobOutcome::Exhausted { attempts, error } => {
                assert_eq!(attempts, 2);
                assert!(error.contains("timed out"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn default_policy_matches_delivery_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(120));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    // ══════════════════════════════════════════════════════════════
    // Run Loop Tests
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn run_drains_queue_until_closed() {
        let handler = Arc::new(ScriptedHandler::new(0, WebhookError::Database("unused".into())));
        let worker = Arc::new(WebhookWorker::new(handler.clone(), fast_policy()));
        let (sender, receiver) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for id in ["evt_1", "evt_2", "evt_3"] {
            sender.send(job(id)).await.unwrap();
        }
        drop(sender);

        worker.run(receiver, shutdown_rx).await;

        let mut seen = handler.seen.lock().await.clone();
        seen.sort();
        assert_eq!(seen, vec!["evt_1", "evt_2", "evt_3"]);
    }

    #[tokio::test]
    async fn shutdown_stops_run_loop() {
        let handler = Arc::new(ScriptedHandler::new(0, WebhookError::Database("unused".into())));
        let worker = Arc::new(WebhookWorker::new(handler, fast_policy()));
        let (_sender, receiver) = mpsc::channel::<WebhookJob>(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let running = tokio::spawn(worker.run(receiver, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
