mod common;

use common::{authorized_intent, confirm_request, create_intent, harness, harness_with, intent_request, test_config};
use common::{MERCHANT_1, MERCHANT_2};
use payments_core::domain::outbox::{
    NewOutboxEvent, OutboxStatus, PAYMENT_AUTHORIZED, PAYMENT_CAPTURED, PAYMENT_VOIDED, REFUND_FAILED, REFUND_SUCCEEDED,
};
use payments_core::domain::payment::{
    CapturePaymentIntentRequest, Charge, ChargeStatus, ConfirmPaymentIntentRequest, NewCharge, NewPaymentIntent,
    PaymentIntent, PaymentIntentStatus,
};
use payments_core::domain::refund::{CreateRefundRequest, RefundStatus};
use payments_core::domain::state_machine::TransitionError;
use payments_core::error::AppError;
use payments_core::providers::{PaymentProvider, RefundRequest};
use payments_core::repo::memory::MemoryStore;
use payments_core::repo::{CaptureApplied, CaptureWrite, PaymentStore, VoidWrite};
use payments_core::service::payment_service::PaymentService;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Serves a fixed charge snapshot, as a reader that loaded the charge just
/// before another request captured it.
struct StaleCharge {
    inner: MemoryStore,
    snapshot: Charge,
}

#[async_trait::async_trait]
impl PaymentStore for StaleCharge {
    async fn create_intent(&self, intent: NewPaymentIntent) -> anyhow::Result<PaymentIntent> {
        self.inner.create_intent(intent).await
    }

    async fn find_intent(&self, merchant_id: &str, intent_id: Uuid) -> anyhow::Result<Option<PaymentIntent>> {
        self.inner.find_intent(merchant_id, intent_id).await
    }

    async fn list_charges(&self, intent_id: Uuid) -> anyhow::Result<Vec<Charge>> {
        self.inner.list_charges(intent_id).await
    }

    async fn latest_charge(&self, _intent_id: Uuid) -> anyhow::Result<Option<Charge>> {
        Ok(Some(self.snapshot.clone()))
    }

    async fn find_charge_for_merchant(&self, merchant_id: &str, charge_id: Uuid) -> anyhow::Result<Option<Charge>> {
        self.inner.find_charge_for_merchant(merchant_id, charge_id).await
    }

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> anyhow::Result<bool> {
        self.inner.transition_intent(intent_id, from, to).await
    }

    async fn record_authorization(
        &self,
        intent_id: Uuid,
        charge: NewCharge,
        event: NewOutboxEvent,
    ) -> anyhow::Result<Option<Charge>> {
        self.inner.record_authorization(intent_id, charge, event).await
    }

    async fn record_capture(&self, write: CaptureWrite) -> anyhow::Result<Option<CaptureApplied>> {
        self.inner.record_capture(write).await
    }

    async fn record_void(&self, write: VoidWrite) -> anyhow::Result<Option<Charge>> {
        self.inner.record_void(write).await
    }
}

fn capture_write(charge: &Charge, amount: i64) -> CaptureWrite {
    CaptureWrite {
        intent_id: charge.payment_intent_id,
        charge_id: charge.id,
        amount,
        provider_final: false,
        event: NewOutboxEvent::payment_intent(
            PAYMENT_CAPTURED,
            charge.payment_intent_id,
            json!({"capture_amount": amount}),
        ),
    }
}

fn capture(amount: Option<i64>) -> CapturePaymentIntentRequest {
    CapturePaymentIntentRequest { amount }
}

fn refund(charge_id: Uuid, amount: i64) -> CreateRefundRequest {
    CreateRefundRequest {
        charge_id,
        amount,
        reason: Some("requested_by_customer".to_string()),
    }
}

fn event_types(h: &common::Harness) -> Vec<String> {
    h.store.outbox_events().into_iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn authorize_capture_refund_end_to_end() {
    let h = harness().await;
    let intent = create_intent(&h, MERCHANT_1, 1000).await;
    assert_eq!(intent.status, PaymentIntentStatus::RequiresConfirmation);
    assert_eq!(intent.currency, "USD");

    let confirmed = h
        .state
        .payment_service
        .confirm_payment_intent(MERCHANT_1, intent.id, confirm_request("tok_visa"))
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentIntentStatus::RequiresCapture);
    let charge = confirmed.charge.unwrap();
    assert_eq!(charge.authorized_amount, 1000);
    assert_eq!(charge.captured_amount, 0);
    assert_eq!(charge.status, ChargeStatus::Authorized);
    assert_eq!(charge.provider, "mock");

    let captured = h
        .state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(1000)))
        .await
        .unwrap();
    assert_eq!(captured.status, PaymentIntentStatus::Succeeded);
    assert_eq!(captured.charge.status, ChargeStatus::Captured);
    assert_eq!(captured.charge.captured_amount, 1000);

    let refunded = h
        .state
        .refund_service
        .create_refund(MERCHANT_1, refund(charge.id, 1000))
        .await
        .unwrap();
    assert_eq!(refunded.status, RefundStatus::Succeeded);
    assert!(refunded.provider_refund_id.is_some());

    let details = h.state.payment_service.get_payment_intent(MERCHANT_1, intent.id).await.unwrap();
    assert_eq!(details.intent.status, PaymentIntentStatus::Succeeded);
    assert_eq!(details.charges.len(), 1);
    // Refunds are tracked separately from the captured amount.
    assert_eq!(details.charges[0].captured_amount, 1000);

    assert_eq!(
        event_types(&h),
        vec![PAYMENT_AUTHORIZED, PAYMENT_CAPTURED, REFUND_SUCCEEDED]
    );
    assert!(h.store.outbox_events().iter().all(|e| e.status == OutboxStatus::Pending));

    let fetched = h.state.refund_service.get_refund(MERCHANT_1, refunded.id).await.unwrap();
    assert_eq!(fetched, refunded);
}

#[tokio::test]
async fn declined_authorization_is_a_result_not_an_error() {
    let h = harness().await;
    let intent = create_intent(&h, MERCHANT_1, 500).await;

    let confirmed = h
        .state
        .payment_service
        .confirm_payment_intent(MERCHANT_1, intent.id, confirm_request("tok_fail_insufficient"))
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentIntentStatus::Failed);
    assert_eq!(confirmed.failure_code.as_deref(), Some("card_declined"));
    assert!(confirmed.charge.is_none());

    assert!(h.store.charges().is_empty());
    assert!(h.store.outbox_events().is_empty());
    assert!(h
        .store
        .audit_entries()
        .iter()
        .any(|a| a.action == "payment_intent.authorization_failed"));
}

#[tokio::test]
async fn partial_captures_accumulate_until_the_authorization_is_used_up() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let payments = &h.state.payment_service;

    let first = payments
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(250)))
        .await
        .unwrap();
    assert_eq!(first.status, PaymentIntentStatus::RequiresCapture);
    assert_eq!(first.charge.status, ChargeStatus::PartiallyCaptured);
    assert_eq!(first.charge.captured_amount, 250);

    // Omitting the amount captures whatever is left.
    let rest = payments
        .capture_payment_intent(MERCHANT_1, intent.id, capture(None))
        .await
        .unwrap();
    assert_eq!(rest.capture_amount, 750);
    assert_eq!(rest.status, PaymentIntentStatus::Succeeded);
    assert_eq!(rest.charge.status, ChargeStatus::Captured);
    assert_eq!(rest.charge.captured_amount, 1000);
}

#[tokio::test]
async fn capture_beyond_the_authorization_is_rejected() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;

    let err = h
        .state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(1100)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::ExceedsRemaining {
            requested: 1100,
            remaining: 1000
        })
    ));
    assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(h.store.charges()[0].captured_amount, 0);
}

#[tokio::test]
async fn capture_after_full_capture_is_rejected() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let payments = &h.state.payment_service;
    payments
        .capture_payment_intent(MERCHANT_1, intent.id, capture(None))
        .await
        .unwrap();

    let err = payments
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Transition(_)));
    assert_eq!(h.store.charges()[0].captured_amount, 1000);
}

#[tokio::test]
async fn concurrent_captures_never_exceed_the_authorization() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let payments = &h.state.payment_service;

    let (a, b) = tokio::join!(
        payments.capture_payment_intent(MERCHANT_1, intent.id, capture(Some(600))),
        payments.capture_payment_intent(MERCHANT_1, intent.id, capture(Some(600))),
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(
        matches!(err, AppError::Transition(_) | AppError::ConcurrentModification(_)),
        "{:?}",
        err
    );

    assert_eq!(h.store.charges()[0].captured_amount, 600);
    let captured = event_types(&h).into_iter().filter(|t| t == PAYMENT_CAPTURED).count();
    assert_eq!(captured, 1);
}

#[tokio::test]
async fn store_rejects_a_capture_past_the_authorization() {
    let h = harness().await;
    authorized_intent(&h, MERCHANT_1, 1000).await;
    let charge = h.store.charges().remove(0);

    let first = h.store.record_capture(capture_write(&charge, 600)).await.unwrap().unwrap();
    assert_eq!(first.charge.captured_amount, 600);
    assert_eq!(first.charge.status, ChargeStatus::PartiallyCaptured);
    assert_eq!(first.intent_status, PaymentIntentStatus::RequiresCapture);

    assert!(h.store.record_capture(capture_write(&charge, 600)).await.unwrap().is_none());
    assert_eq!(h.store.charges()[0].captured_amount, 600);
    let captured = event_types(&h).into_iter().filter(|t| t == PAYMENT_CAPTURED).count();
    assert_eq!(captured, 1);
}

#[tokio::test]
async fn capture_decided_on_a_stale_charge_is_a_concurrent_modification() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let snapshot = h.store.charges().remove(0);

    h.state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(600)))
        .await
        .unwrap();

    let stale = PaymentService {
        payments: Arc::new(StaleCharge {
            inner: h.store.clone(),
            snapshot,
        }),
        ..h.state.payment_service.clone()
    };
    let err = stale
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(600)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConcurrentModification(_)), "{:?}", err);
    assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    assert_eq!(h.store.charges()[0].captured_amount, 600);
}

#[tokio::test]
async fn capture_without_a_charge_is_not_found() {
    let h = harness().await;
    let intent = create_intent(&h, MERCHANT_1, 1000).await;
    let err = h
        .state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("charge")));
}

#[tokio::test]
async fn void_cancels_an_authorized_intent() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;

    let voided = h
        .state
        .payment_service
        .void_payment_intent(MERCHANT_1, intent.id)
        .await
        .unwrap();
    assert_eq!(voided.status, PaymentIntentStatus::Canceled);
    assert_eq!(voided.charge.status, ChargeStatus::Voided);
    assert_eq!(event_types(&h), vec![PAYMENT_AUTHORIZED, PAYMENT_VOIDED]);

    let err = h
        .state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Transition(_)));
}

#[tokio::test]
async fn void_after_capture_is_rejected() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;
    h.state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(None))
        .await
        .unwrap();

    let err = h
        .state
        .payment_service
        .void_payment_intent(MERCHANT_1, intent.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::NotVoidable(ChargeStatus::Captured))
    ));
}

#[tokio::test]
async fn refunds_never_sum_past_the_captured_amount() {
    let h = harness().await;
    let (intent, confirmed) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let charge_id = confirmed.charge.unwrap().id;
    h.state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(600)))
        .await
        .unwrap();
    let refunds = &h.state.refund_service;

    let err = refunds.create_refund(MERCHANT_1, refund(charge_id, 601)).await.unwrap_err();
    assert_eq!(err.to_string(), "refund amount exceeds captured amount");

    refunds.create_refund(MERCHANT_1, refund(charge_id, 400)).await.unwrap();
    let err = refunds.create_refund(MERCHANT_1, refund(charge_id, 201)).await.unwrap_err();
    assert_eq!(err.to_string(), "refund amount exceeds remaining refundable amount");

    let last = refunds.create_refund(MERCHANT_1, refund(charge_id, 200)).await.unwrap();
    assert_eq!(last.status, RefundStatus::Succeeded);

    let total: i64 = h
        .store
        .refunds()
        .iter()
        .filter(|r| r.status.holds_funds())
        .map(|r| r.amount)
        .sum();
    assert_eq!(total, 600);
}

#[tokio::test]
async fn concurrent_refunds_cannot_over_refund() {
    let h = harness().await;
    let (intent, confirmed) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let charge_id = confirmed.charge.unwrap().id;
    h.state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(None))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = h.state.refund_service.clone();
        tasks.push(tokio::spawn(async move {
            service.create_refund(MERCHANT_1, refund(charge_id, 300)).await
        }));
    }
    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 3);
}

#[tokio::test]
async fn refund_validation() {
    let h = harness().await;
    let (_, confirmed) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let charge_id = confirmed.charge.unwrap().id;
    let refunds = &h.state.refund_service;

    let err = refunds.create_refund(MERCHANT_1, refund(charge_id, 0)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Nothing captured yet.
    let err = refunds.create_refund(MERCHANT_1, refund(charge_id, 1)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = refunds
        .create_refund(MERCHANT_1, refund(Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("charge")));
}

#[tokio::test]
async fn other_merchants_cannot_see_or_touch_a_payment() {
    let h = harness().await;
    let (intent, confirmed) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let charge_id = confirmed.charge.unwrap().id;
    let payments = &h.state.payment_service;

    assert!(matches!(
        payments.get_payment_intent(MERCHANT_2, intent.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        payments
            .capture_payment_intent(MERCHANT_2, intent.id, capture(None))
            .await
            .unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        payments.void_payment_intent(MERCHANT_2, intent.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        h.state
            .refund_service
            .create_refund(MERCHANT_2, refund(charge_id, 1))
            .await
            .unwrap_err(),
        AppError::NotFound(_)
    ));

    let details = payments.get_payment_intent(MERCHANT_1, intent.id).await.unwrap();
    assert_eq!(details.intent.status, PaymentIntentStatus::RequiresCapture);
}

#[tokio::test]
async fn authorization_timeout_fails_the_intent_without_a_charge() {
    let mut cfg = test_config();
    cfg.provider_timeout_ms = 50;
    let h = harness_with(cfg, None).await;
    let intent = create_intent(&h, MERCHANT_1, 1000).await;

    let err = h
        .state
        .payment_service
        .confirm_payment_intent(MERCHANT_1, intent.id, confirm_request("tok_timeout"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProviderTimeout(_)));
    assert_eq!(err.status(), axum::http::StatusCode::GATEWAY_TIMEOUT);

    let details = h.state.payment_service.get_payment_intent(MERCHANT_1, intent.id).await.unwrap();
    assert_eq!(details.intent.status, PaymentIntentStatus::Failed);
    assert!(details.charges.is_empty());

    let actions: Vec<_> = h.store.audit_entries().into_iter().map(|a| a.action).collect();
    assert!(actions.contains(&"payment_intent.authorization_timeout".to_string()));
    assert!(!actions.contains(&"payment_intent.authorization_failed".to_string()));
}

#[tokio::test]
async fn confirm_twice_is_an_invalid_transition() {
    let h = harness().await;
    let (intent, _) = authorized_intent(&h, MERCHANT_1, 1000).await;

    let err = h
        .state
        .payment_service
        .confirm_payment_intent(MERCHANT_1, intent.id, confirm_request("tok_visa"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Transition(TransitionError::InvalidTransition {
            current: PaymentIntentStatus::RequiresCapture,
            ..
        })
    ));
    assert_eq!(h.store.charges().len(), 1);
}

#[tokio::test]
async fn confirm_with_an_unknown_provider_leaves_the_intent_untouched() {
    let h = harness().await;
    let intent = create_intent(&h, MERCHANT_1, 1000).await;

    let err = h
        .state
        .payment_service
        .confirm_payment_intent(
            MERCHANT_1,
            intent.id,
            ConfirmPaymentIntentRequest {
                payment_method_token: "tok_visa".to_string(),
                provider: Some("adyen".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnknownProvider(_)));

    let details = h.state.payment_service.get_payment_intent(MERCHANT_1, intent.id).await.unwrap();
    assert_eq!(details.intent.status, PaymentIntentStatus::RequiresConfirmation);
}

#[tokio::test]
async fn create_validates_amount_and_currency() {
    let h = harness().await;
    let payments = &h.state.payment_service;

    for amount in [0, -5] {
        let err = payments
            .create_payment_intent(MERCHANT_1, intent_request(amount))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    let mut req = intent_request(100);
    req.currency = "dollars".to_string();
    assert!(matches!(
        payments.create_payment_intent(MERCHANT_1, req).await.unwrap_err(),
        AppError::Validation(_)
    ));

    let mut req = intent_request(100);
    req.currency = "eur".to_string();
    let intent = payments.create_payment_intent(MERCHANT_1, req).await.unwrap();
    assert_eq!(intent.currency, "EUR");
}

#[tokio::test]
async fn blank_payment_token_is_rejected_before_any_state_change() {
    let h = harness().await;
    let intent = create_intent(&h, MERCHANT_1, 1000).await;
    let err = h
        .state
        .payment_service
        .confirm_payment_intent(MERCHANT_1, intent.id, confirm_request("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let details = h.state.payment_service.get_payment_intent(MERCHANT_1, intent.id).await.unwrap();
    assert_eq!(details.intent.status, PaymentIntentStatus::RequiresConfirmation);
}

#[tokio::test]
async fn declined_refund_is_recorded_as_failed() {
    let h = harness().await;
    let (intent, confirmed) = authorized_intent(&h, MERCHANT_1, 1000).await;
    let charge = confirmed.charge.unwrap();
    h.state
        .payment_service
        .capture_payment_intent(MERCHANT_1, intent.id, capture(Some(500)))
        .await
        .unwrap();

    // Refunds outside the platform shrink what the provider still holds.
    let provider = h.state.refund_service.providers.get("mock").unwrap();
    provider
        .refund(RefundRequest {
            provider_charge_id: charge.provider_charge_id.clone(),
            amount: 400,
            reason: None,
        })
        .await
        .unwrap();

    let refunded = h
        .state
        .refund_service
        .create_refund(MERCHANT_1, refund(charge.id, 300))
        .await
        .unwrap();
    assert_eq!(refunded.status, RefundStatus::Failed);
    assert_eq!(refunded.failure_code.as_deref(), Some("invalid_refund_amount"));
    assert_eq!(event_types(&h).last().map(String::as_str), Some(REFUND_FAILED));

    // A failed refund releases its reservation.
    let ok = h
        .state
        .refund_service
        .create_refund(MERCHANT_1, refund(charge.id, 100))
        .await
        .unwrap();
    assert_eq!(ok.status, RefundStatus::Succeeded);
}
