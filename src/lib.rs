pub mod bootstrap;
pub mod config;
pub mod domain {
    pub mod audit;
    pub mod idempotency;
    pub mod merchant;
    pub mod outbox;
    pub mod payment;
    pub mod refund;
    pub mod state_machine;
    pub mod webhook;
}
pub mod error;
pub mod hashing;
pub mod http {
    pub mod handlers;
    pub mod idempotent;
    pub mod middleware {
        pub mod merchant_auth;
    }
    pub mod router;
}
pub mod providers;
pub mod queue;
pub mod repo;
pub mod service {
    pub mod event_publisher;
    pub mod idempotency_service;
    pub mod outbox_relay;
    pub mod payment_service;
    pub mod refund_service;
    pub mod webhook_service;
    pub mod webhook_worker;
}

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub refund_service: service::refund_service::RefundService,
    pub webhook_service: service::webhook_service::WebhookService,
    pub idempotency_service: service::idempotency_service::IdempotencyService,
    pub merchant_auth: http::middleware::merchant_auth::MerchantAuth,
    pub readiness: Arc<dyn http::handlers::ops::ReadinessCheck>,
}
