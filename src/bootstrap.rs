use crate::config::{AppConfig, StorageBackend};
use crate::hashing::hash_api_key;
use crate::http::handlers::ops::{AlwaysReady, PgRedisReadiness, ReadinessCheck};
use crate::http::middleware::merchant_auth::MerchantAuth;
use crate::providers::mock::MockProvider;
use crate::providers::stripe::StripeProvider;
use crate::providers::{PaymentProvider, ProviderRegistry};
use crate::queue::pg_queue::PgJobQueue;
use crate::queue::{Backoff, JobQueue, RetryPolicy};
use crate::repo::audit_repo::AuditRepo;
use crate::repo::idempotency_repo::IdempotencyRepo;
use crate::repo::memory::MemoryStore;
use crate::repo::merchants_repo::MerchantsRepo;
use crate::repo::outbox_repo::OutboxRepo;
use crate::repo::payments_repo::PaymentsRepo;
use crate::repo::refunds_repo::RefundsRepo;
use crate::repo::webhook_repo::WebhookRepo;
use crate::repo::{
    AuditStore, IdempotencyStore, MerchantStore, OutboxStore, PaymentStore, RefundStore, WebhookEventStore,
};
use crate::service::event_publisher::{EventPublisher, LogPublisher, RedisStreamPublisher};
use crate::service::idempotency_service::IdempotencyService;
use crate::service::outbox_relay::OutboxRelay;
use crate::service::payment_service::PaymentService;
use crate::service::refund_service::RefundService;
use crate::service::webhook_service::WebhookService;
use crate::service::webhook_worker::WebhookRetryWorker;
use crate::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Backends {
    pub payments: Arc<dyn PaymentStore>,
    pub refunds: Arc<dyn RefundStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub webhooks: Arc<dyn WebhookEventStore>,
    pub audit: Arc<dyn AuditStore>,
    pub merchants: Arc<dyn MerchantStore>,
    pub queue: Arc<dyn JobQueue>,
    pub publisher: Arc<dyn EventPublisher>,
    pub readiness: Arc<dyn ReadinessCheck>,
}

impl Backends {
    pub fn memory(store: MemoryStore) -> Self {
        Self::memory_with_publisher(store, Arc::new(LogPublisher))
    }

    pub fn memory_with_publisher(store: MemoryStore, publisher: Arc<dyn EventPublisher>) -> Self {
        let store = Arc::new(store);
        Self {
            payments: store.clone(),
            refunds: store.clone(),
            idempotency: store.clone(),
            outbox: store.clone(),
            webhooks: store.clone(),
            audit: store.clone(),
            merchants: store.clone(),
            queue: store,
            publisher,
            readiness: Arc::new(AlwaysReady),
        }
    }

    pub async fn postgres(cfg: &AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&cfg.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let redis_client = redis::Client::open(cfg.redis_url.clone())?;
        Ok(Self {
            payments: Arc::new(PaymentsRepo { pool: pool.clone() }),
            refunds: Arc::new(RefundsRepo { pool: pool.clone() }),
            idempotency: Arc::new(IdempotencyRepo { pool: pool.clone() }),
            outbox: Arc::new(OutboxRepo { pool: pool.clone() }),
            webhooks: Arc::new(WebhookRepo { pool: pool.clone() }),
            audit: Arc::new(AuditRepo { pool: pool.clone() }),
            merchants: Arc::new(MerchantsRepo { pool: pool.clone() }),
            queue: Arc::new(PgJobQueue { pool: pool.clone() }),
            publisher: Arc::new(RedisStreamPublisher {
                redis_client: redis_client.clone(),
                stream_key: cfg.outbox.stream_key.clone(),
            }),
            readiness: Arc::new(PgRedisReadiness { pool, redis_client }),
        })
    }

    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        match cfg.storage {
            StorageBackend::Postgres => Self::postgres(cfg).await,
            StorageBackend::Memory => {
                let store = MemoryStore::new();
                let key_hash = hash_api_key(&cfg.api_key_hash_secret, &cfg.dev_api_key);
                store
                    .create_with_api_key("m_dev", "Development Merchant", &key_hash)
                    .await?;
                tracing::warn!("using in-memory storage; data is lost on exit");
                Ok(Self::memory(store))
            }
        }
    }
}

pub fn build_provider_registry(cfg: &AppConfig) -> ProviderRegistry {
    let mut providers: Vec<Arc<dyn PaymentProvider>> = vec![Arc::new(MockProvider::new())];
    if let Some(stripe) = &cfg.stripe {
        providers.push(Arc::new(StripeProvider::new(
            stripe.base_url.clone(),
            stripe.secret_key.clone(),
            cfg.provider_timeout_ms,
        )));
    }
    ProviderRegistry::new(providers, Duration::from_millis(cfg.provider_timeout_ms))
}

pub fn webhook_retry_policy(cfg: &AppConfig) -> RetryPolicy {
    RetryPolicy::exponential(cfg.webhook.job_attempts, cfg.webhook.job_backoff_ms)
}

pub fn build_state(cfg: &AppConfig, backends: &Backends, providers: ProviderRegistry) -> AppState {
    let payment_service = PaymentService {
        payments: backends.payments.clone(),
        audit: backends.audit.clone(),
        providers: providers.clone(),
        default_provider: cfg.default_provider.clone(),
    };
    let refund_service = RefundService {
        payments: backends.payments.clone(),
        refunds: backends.refunds.clone(),
        audit: backends.audit.clone(),
        providers: providers.clone(),
    };
    let webhook_service = WebhookService {
        providers,
        events: backends.webhooks.clone(),
        audit: backends.audit.clone(),
        default_secret: cfg.webhook.default_secret.clone(),
        provider_secrets: cfg.webhook.provider_secrets.clone(),
        retry_policy: webhook_retry_policy(cfg),
    };
    let idempotency_service = IdempotencyService {
        store: backends.idempotency.clone(),
        ttl_hours: cfg.idempotency_ttl_hours,
    };
    let merchant_auth = MerchantAuth {
        merchants: backends.merchants.clone(),
        audit: backends.audit.clone(),
        hash_secret: cfg.api_key_hash_secret.clone(),
    };

    AppState {
        payment_service,
        refund_service,
        webhook_service,
        idempotency_service,
        merchant_auth,
        readiness: backends.readiness.clone(),
    }
}

pub fn build_outbox_relay(cfg: &AppConfig, backends: &Backends) -> OutboxRelay {
    OutboxRelay {
        outbox: backends.outbox.clone(),
        publisher: backends.publisher.clone(),
        batch_size: cfg.outbox.batch_size,
        poll_interval: Duration::from_millis(cfg.outbox.poll_interval_ms),
        lease: Duration::from_secs(cfg.outbox.lease_secs),
        backoff: Backoff::Exponential {
            base_ms: cfg.outbox.backoff_base_ms,
            max_ms: cfg.outbox.backoff_max_ms,
        },
        max_attempts: cfg.outbox.max_attempts,
    }
}

pub fn build_webhook_worker(cfg: &AppConfig, backends: &Backends) -> WebhookRetryWorker {
    WebhookRetryWorker {
        queue: backends.queue.clone(),
        events: backends.webhooks.clone(),
        audit: backends.audit.clone(),
        batch_size: cfg.webhook.worker_batch_size,
        poll_interval: Duration::from_millis(cfg.webhook.worker_poll_interval_ms),
        lease: Duration::from_secs(cfg.webhook.job_lease_secs),
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to listen for SIGTERM: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
