#![allow(dead_code)]

use payments_core::bootstrap::{build_outbox_relay, build_provider_registry, build_state, build_webhook_worker, Backends};
use payments_core::config::{AppConfig, StorageBackend};
use payments_core::domain::payment::{
    ConfirmPaymentIntentRequest, ConfirmResponse, CreatePaymentIntentRequest, PaymentIntent,
};
use payments_core::hashing::hash_api_key;
use payments_core::repo::memory::MemoryStore;
use payments_core::repo::MerchantStore;
use payments_core::service::event_publisher::EventPublisher;
use payments_core::service::outbox_relay::OutboxRelay;
use payments_core::service::webhook_worker::WebhookRetryWorker;
use payments_core::AppState;
use std::sync::Arc;

pub const MERCHANT_1: &str = "m_1";
pub const MERCHANT_2: &str = "m_2";
pub const API_KEY_1: &str = "sk_test_m1";
pub const API_KEY_2: &str = "sk_test_m2";
pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct Harness {
    pub cfg: AppConfig,
    pub store: MemoryStore,
    pub backends: Backends,
    pub state: AppState,
}

impl Harness {
    pub fn outbox_relay(&self) -> OutboxRelay {
        build_outbox_relay(&self.cfg, &self.backends)
    }

    pub fn webhook_worker(&self) -> WebhookRetryWorker {
        build_webhook_worker(&self.cfg, &self.backends)
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::from_env();
    cfg.storage = StorageBackend::Memory;
    cfg.api_key_hash_secret = "test_hash_secret".to_string();
    cfg.default_provider = "mock".to_string();
    cfg.provider_timeout_ms = 2_000;
    cfg.stripe = None;
    cfg.idempotency_ttl_hours = 24;
    cfg.webhook.default_secret = WEBHOOK_SECRET.to_string();
    cfg.webhook.provider_secrets.clear();
    cfg.webhook.job_attempts = 5;
    cfg.webhook.job_backoff_ms = 5_000;
    cfg.outbox.batch_size = 50;
    cfg.outbox.max_attempts = 10;
    cfg
}

pub async fn harness() -> Harness {
    harness_with(test_config(), None).await
}

pub async fn harness_with(cfg: AppConfig, publisher: Option<Arc<dyn EventPublisher>>) -> Harness {
    let store = MemoryStore::new();
    for (merchant_id, key) in [(MERCHANT_1, API_KEY_1), (MERCHANT_2, API_KEY_2)] {
        store
            .create_with_api_key(merchant_id, merchant_id, &hash_api_key(&cfg.api_key_hash_secret, key))
            .await
            .unwrap();
    }

    let backends = match publisher {
        Some(publisher) => Backends::memory_with_publisher(store.clone(), publisher),
        None => Backends::memory(store.clone()),
    };
    let state = build_state(&cfg, &backends, build_provider_registry(&cfg));
    Harness {
        cfg,
        store,
        backends,
        state,
    }
}

pub fn intent_request(amount: i64) -> CreatePaymentIntentRequest {
    CreatePaymentIntentRequest {
        amount,
        currency: "USD".to_string(),
        customer_ref: Some("cus_1".to_string()),
        metadata: None,
    }
}

pub fn confirm_request(token: &str) -> ConfirmPaymentIntentRequest {
    ConfirmPaymentIntentRequest {
        payment_method_token: token.to_string(),
        provider: None,
    }
}

pub async fn create_intent(h: &Harness, merchant_id: &str, amount: i64) -> PaymentIntent {
    h.state
        .payment_service
        .create_payment_intent(merchant_id, intent_request(amount))
        .await
        .unwrap()
}

pub async fn authorized_intent(h: &Harness, merchant_id: &str, amount: i64) -> (PaymentIntent, ConfirmResponse) {
    let intent = create_intent(h, merchant_id, amount).await;
    let confirmed = h
        .state
        .payment_service
        .confirm_payment_intent(merchant_id, intent.id, confirm_request("tok_visa"))
        .await
        .unwrap();
    (intent, confirmed)
}
