use std::error::Error;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_reconciler::adapters::http::{app_router, BillingAppState};
use billing_reconciler::adapters::memory::InMemoryBillingStore;
use billing_reconciler::adapters::postgres::{self, PostgresBillingStore};
use billing_reconciler::adapters::queue::{InProcessWebhookQueue, WebhookWorker};
use billing_reconciler::adapters::stripe::{StripeConfig, StripePaymentAdapter};
use billing_reconciler::application::billing::{CheckoutUrls, SubscriptionLocks, WebhookPipeline};
use billing_reconciler::config::{AppConfig, ServerConfig};
use billing_reconciler::domain::billing::WebhookVerifier;
use billing_reconciler::ports::{
    AccountRepository, EventLogStore, HistoryRepository, LedgerRepository, PaymentProvider,
    SubscriptionRepository,
};

type BoxError = Box<dyn Error + Send + Sync>;

/// The store ports, all served by one backend.
struct Stores {
    events: Arc<dyn EventLogStore>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    accounts: Arc<dyn AccountRepository>,
    ledger: Arc<dyn LedgerRepository>,
    history: Arc<dyn HistoryRepository>,
}

impl Stores {
    fn from_backend<S>(store: S) -> Self
    where
        S: EventLogStore
            + SubscriptionRepository
            + AccountRepository
            + LedgerRepository
            + HistoryRepository
            + Clone
            + 'static,
    {
        Self {
            events: Arc::new(store.clone()),
            subscriptions: Arc::new(store.clone()),
            accounts: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            history: Arc::new(store),
        }
    }
}

fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if server.json_logs {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}

async fn open_stores(config: &AppConfig) -> Result<Stores, BoxError> {
    match &config.database {
        Some(database) => {
            tracing::info!(url = %database.redacted_url(), "Using PostgreSQL store");
            let pool = postgres::connect(database).await?;
            if database.run_migrations {
                postgres::run_migrations(&pool).await?;
            }
            Ok(Stores::from_backend(PostgresBillingStore::new(pool)))
        }
        None => {
            tracing::warn!("No database configured, state is kept in memory");
            Ok(Stores::from_backend(InMemoryBillingStore::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let stores = open_stores(&config).await?;

    let payment = &config.payment;
    let provider: Arc<dyn PaymentProvider> = Arc::new(StripePaymentAdapter::new(
        StripeConfig::new(payment.stripe_api_key.clone())
            .with_base_url(payment.api_base_url.clone())
            .with_timeout(std::time::Duration::from_secs(payment.provider_timeout_secs)),
    ));
    let catalog = Arc::new(payment.price_catalog());
    let locks = SubscriptionLocks::new();

    let pipeline = Arc::new(WebhookPipeline::new(
        stores.events.clone(),
        stores.subscriptions.clone(),
        stores.accounts.clone(),
        stores.ledger.clone(),
        stores.history.clone(),
        catalog.clone(),
        locks.clone(),
    ));

    let (queue, jobs) = InProcessWebhookQueue::channel(config.queue.channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Arc::new(WebhookWorker::new(pipeline, config.queue.retry_policy()));
    let mut worker_task = tokio::spawn(worker.run(jobs, shutdown_rx));

    let state = BillingAppState {
        subscriptions: stores.subscriptions,
        accounts: stores.accounts,
        history: stores.history,
        events: stores.events,
        ledger: stores.ledger,
        provider,
        queue: Arc::new(queue),
        verifier: Arc::new(
            WebhookVerifier::new(payment.webhook_secret())
                .with_tolerance_secs(payment.webhook_tolerance_secs),
        ),
        catalog,
        locks,
        checkout_urls: CheckoutUrls {
            success_url: payment.checkout_success_url(),
            cancel_url: payment.checkout_cancel_url(),
        },
        portal_return_url: payment.portal_return_url(),
    };
    let app = app_router(state, config.server.request_timeout());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        environment = ?config.server.environment,
        test_mode = payment.is_test_mode(),
        "Billing reconciler listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the queue sender, so the worker sees the channel close
    // once buffered jobs are drained.
    let drain_timeout = std::time::Duration::from_secs(config.queue.attempt_timeout_secs);
    if tokio::time::timeout(drain_timeout, &mut worker_task).await.is_err() {
        tracing::warn!("Webhook queue not drained in time, stopping worker");
        let _ = shutdown_tx.send(true);
        if let Err(e) = worker_task.await {
            tracing::error!(error = %e, "Webhook worker task failed");
        }
    }
    tracing::info!("Billing reconciler stopped");
    Ok(())
}
