use crate::http::handlers::{merchants, ops, payment_intents, refunds, webhooks};
use crate::http::middleware::merchant_auth::require_merchant;
use crate::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/payment-intents", post(payment_intents::create_payment_intent))
        .route("/payment-intents/:id", get(payment_intents::get_payment_intent))
        .route(
            "/payment-intents/:id/confirm",
            post(payment_intents::confirm_payment_intent),
        )
        .route(
            "/payment-intents/:id/capture",
            post(payment_intents::capture_payment_intent),
        )
        .route("/payment-intents/:id/void", post(payment_intents::void_payment_intent))
        .route("/refunds", post(refunds::create_refund))
        .route("/refunds/:id", get(refunds::get_refund))
        .route("/merchants/me", get(merchants::me))
        .route_layer(from_fn_with_state(state.merchant_auth.clone(), require_merchant));

    Router::new()
        .route("/health", get(ops::health))
        .route("/ops/liveness", get(ops::liveness))
        .route("/ops/readiness", get(ops::readiness))
        .route("/webhooks/providers/:provider", post(webhooks::receive_provider_webhook))
        .merge(authenticated)
        .with_state(state)
}
