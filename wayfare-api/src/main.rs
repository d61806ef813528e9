use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfare_api::middleware::ResiliencyState;
use wayfare_api::state::{AppState, AuthConfig, RateLimitConfig};
use wayfare_api::{app, worker};
use wayfare_core::{DocumentStore, EventPublisher, NoopPublisher, PaymentGateway};
use wayfare_reservation::memory::MemoryDocumentStore;
use wayfare_reservation::{
    DriverAssignmentService, LifecycleManager, MockPaymentGateway, PaymentOrchestrator, ReceiptIssuer,
    Reconciler, ReservationRepository,
};
use wayfare_store::app_config::{Config, PaymentProvider, ReceiptStoreKind};
use wayfare_store::{
    DbClient, EventProducer, PgDocumentStore, PgReservationRepository, RedisClient, StripeGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wayfare_api=debug,wayfare_reservation=debug,wayfare_store=info,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Wayfare API on port {}", config.server.port);

    // Postgres
    let db = DbClient::connect(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let repo: Arc<dyn ReservationRepository> = Arc::new(PgReservationRepository::new(db.pool.clone()));

    let documents: Arc<dyn DocumentStore> = match config.lifecycle.receipt_store {
        ReceiptStoreKind::Postgres => Arc::new(PgDocumentStore::new(db.pool.clone())),
        ReceiptStoreKind::Memory => {
            tracing::warn!("Receipt documents are kept in memory and lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    // Kafka
    let events: Arc<dyn EventPublisher> = if config.kafka.enabled {
        Arc::new(EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?)
    } else {
        Arc::new(NoopPublisher)
    };

    // Redis is optional: without it requests are not rate limited
    let redis = match RedisClient::new(&config.redis.url).await {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
            None
        }
    };

    let (gateway, mock_gateway): (Arc<dyn PaymentGateway>, Option<Arc<MockPaymentGateway>>) =
        match config.payments.provider {
            PaymentProvider::Mock => {
                let mock = Arc::new(MockPaymentGateway::new(&config.payments.mock_checkout_base));
                let gateway: Arc<dyn PaymentGateway> = mock.clone();
                (gateway, Some(mock))
            }
            PaymentProvider::Stripe => {
                let secret_key = config
                    .payments
                    .secret_key
                    .as_deref()
                    .context("payments.secret_key is required for the stripe provider")?;
                let stripe = StripeGateway::new(
                    &config.payments.api_base,
                    secret_key,
                    &config.payments.success_url,
                    &config.payments.cancel_url,
                    Duration::from_secs(config.payments.timeout_seconds),
                )?;
                let gateway: Arc<dyn PaymentGateway> = Arc::new(stripe);
                (gateway, None)
            }
        };

    let attempts = config.lifecycle.max_write_attempts;
    let receipts = Arc::new(
        ReceiptIssuer::new(repo.clone(), documents, events.clone()).with_max_write_attempts(attempts),
    );
    let lifecycle = Arc::new(
        LifecycleManager::new(repo.clone(), receipts.clone(), events.clone()).with_max_write_attempts(attempts),
    );
    let assignments = Arc::new(DriverAssignmentService::new(repo.clone(), events).with_max_write_attempts(attempts));
    let payments = Arc::new(PaymentOrchestrator::new(gateway, lifecycle.clone()));

    let reconciler = Arc::new(Reconciler::new(
        repo,
        payments.clone(),
        receipts.clone(),
        config.lifecycle.reconcile_batch_size,
    ));
    tokio::spawn(worker::start_reconciliation_worker(
        reconciler,
        Duration::from_secs(config.lifecycle.reconcile_interval_seconds),
    ));

    let app_state = AppState {
        lifecycle,
        assignments,
        payments,
        receipts,
        pricing: Arc::new(config.pricing.clone()),
        redis,
        rate_limit: RateLimitConfig {
            limit: config.redis.rate_limit,
            window_seconds: config.redis.rate_window_seconds,
        },
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        webhook_secret: config.payments.webhook_secret.clone(),
        resiliency: Arc::new(ResiliencyState::default()),
        mock_gateway,
    };

    let app = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
