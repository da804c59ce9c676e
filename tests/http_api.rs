mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use common::{harness, Harness, API_KEY_1, API_KEY_2, MERCHANT_1, WEBHOOK_SECRET};
use http_body_util::BodyExt;
use payments_core::http::router::build_router;
use payments_core::providers::mock::sign_mock_webhook;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(h: &Harness, request: Request<Body>) -> Response {
    build_router(h.state.clone()).oneshot(request).await.unwrap()
}

fn post(path: &str, api_key: &str, idempotency_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-api-key", api_key);
    if let Some(key) = idempotency_key {
        builder = builder.header("idempotency-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(path: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header("x-api-key", api_key)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn created_intent_id(h: &Harness, key: &str) -> String {
    let response = send(
        h,
        post("/payment-intents", API_KEY_1, Some(key), json!({"amount": 1000, "currency": "USD"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_is_replayed_byte_for_byte_under_the_same_key() {
    let h = harness().await;
    let request = || post("/payment-intents", API_KEY_1, Some("idem-1"), json!({"amount": 1000, "currency": "USD"}));

    let first = send(&h, request()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert!(first.headers().get("idempotent-replay").is_none());
    let first_body = body_bytes(first).await;

    let second = send(&h, request()).await;
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(second.headers().get("idempotent-replay").unwrap(), "true");
    assert_eq!(body_bytes(second).await, first_body);

    let created: Value = serde_json::from_slice(&first_body).unwrap();
    assert_eq!(created["status"], "requires_confirmation");
    assert_eq!(created["merchant_id"], MERCHANT_1);

    let intents = h
        .store
        .audit_entries()
        .into_iter()
        .filter(|a| a.action == "payment_intent.created")
        .count();
    assert_eq!(intents, 1);
}

#[tokio::test]
async fn reusing_a_key_for_a_different_body_is_a_conflict() {
    let h = harness().await;
    send(&h, post("/payment-intents", API_KEY_1, Some("idem-2"), json!({"amount": 1000}))).await;

    let response = send(&h, post("/payment-intents", API_KEY_1, Some("idem-2"), json!({"amount": 2000}))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "idempotency_conflict");
}

#[tokio::test]
async fn mutating_routes_require_an_idempotency_key() {
    let h = harness().await;
    let response = send(&h, post("/payment-intents", API_KEY_1, None, json!({"amount": 1000}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "validation_error");
    assert!(h
        .store
        .audit_entries()
        .iter()
        .all(|a| a.action == "auth.succeeded"));
}

#[tokio::test]
async fn bad_or_missing_api_keys_are_rejected_and_audited() {
    let h = harness().await;

    let response = send(&h, get("/merchants/me", "sk_wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "unauthorized");

    let anonymous = Request::builder()
        .method("GET")
        .uri("/merchants/me")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&h, anonymous).await.status(), StatusCode::UNAUTHORIZED);

    let reasons: Vec<Value> = h
        .store
        .audit_entries()
        .into_iter()
        .filter(|a| a.action == "auth.failed")
        .map(|a| a.details["reason"].clone())
        .collect();
    assert_eq!(reasons, vec![json!("invalid_api_key"), json!("missing_api_key")]);

    let me = send(&h, get("/merchants/me", API_KEY_1)).await;
    assert_eq!(me.status(), StatusCode::OK);
    assert_eq!(body_json(me).await["merchant_id"], MERCHANT_1);
}

#[tokio::test]
async fn successful_authentication_is_audited() {
    let h = harness().await;
    let me = send(&h, get("/merchants/me", API_KEY_1)).await;
    assert_eq!(me.status(), StatusCode::OK);
    let api_key_id = body_json(me).await["api_key_id"].clone();

    let succeeded: Vec<_> = h
        .store
        .audit_entries()
        .into_iter()
        .filter(|a| a.action == "auth.succeeded")
        .collect();
    assert_eq!(succeeded.len(), 1);
    let entry = &succeeded[0];
    assert_eq!(entry.merchant_id.as_deref(), Some(MERCHANT_1));
    assert_eq!(entry.entity_type, "api_key");
    assert_eq!(json!(entry.entity_id), api_key_id);
    assert_eq!(json!(entry.actor_id), api_key_id);
    assert_eq!(entry.details, json!({"method": "GET", "path": "/merchants/me"}));
}

#[tokio::test]
async fn full_flow_over_http() {
    let h = harness().await;
    let id = created_intent_id(&h, "create-1").await;

    let confirm = send(
        &h,
        post(
            &format!("/payment-intents/{}/confirm", id),
            API_KEY_1,
            Some("confirm-1"),
            json!({"payment_method_token": "tok_visa"}),
        ),
    )
    .await;
    assert_eq!(confirm.status(), StatusCode::OK);
    let confirmed = body_json(confirm).await;
    assert_eq!(confirmed["status"], "requires_capture");
    let charge_id = confirmed["charge"]["id"].as_str().unwrap().to_string();

    // An empty body captures the full remaining amount.
    let capture = Request::builder()
        .method("POST")
        .uri(format!("/payment-intents/{}/capture", id))
        .header("x-api-key", API_KEY_1)
        .header("idempotency-key", "capture-1")
        .body(Body::empty())
        .unwrap();
    let capture = send(&h, capture).await;
    assert_eq!(capture.status(), StatusCode::OK);
    let captured = body_json(capture).await;
    assert_eq!(captured["status"], "succeeded");
    assert_eq!(captured["charge"]["captured_amount"], 1000);

    let refund = send(
        &h,
        post(
            "/refunds",
            API_KEY_1,
            Some("refund-1"),
            json!({"charge_id": charge_id, "amount": 1000}),
        ),
    )
    .await;
    assert_eq!(refund.status(), StatusCode::CREATED);
    let refund = body_json(refund).await;
    assert_eq!(refund["status"], "succeeded");

    let fetched = send(&h, get(&format!("/refunds/{}", refund["id"].as_str().unwrap()), API_KEY_1)).await;
    assert_eq!(fetched.status(), StatusCode::OK);

    let details = send(&h, get(&format!("/payment-intents/{}", id), API_KEY_1)).await;
    assert_eq!(details.status(), StatusCode::OK);
    let details = body_json(details).await;
    assert_eq!(details["status"], "succeeded");
    assert_eq!(details["charges"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn declined_confirm_returns_200_with_a_failure_code() {
    let h = harness().await;
    let id = created_intent_id(&h, "create-decline").await;

    let response = send(
        &h,
        post(
            &format!("/payment-intents/{}/confirm", id),
            API_KEY_1,
            Some("confirm-decline"),
            json!({"payment_method_token": "tok_fail"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failure_code"], "card_declined");
    assert!(body.get("charge").is_none());
}

#[tokio::test]
async fn early_void_is_not_found_and_double_confirm_is_rejected() {
    let h = harness().await;
    let id = created_intent_id(&h, "create-void").await;
    let void = || {
        post(
            &format!("/payment-intents/{}/void", id),
            API_KEY_1,
            Some("void-early"),
            json!({}),
        )
    };

    let response = send(&h, void()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");

    // Errors are not recorded, so the same key runs again.
    let again = send(&h, void()).await;
    assert!(again.headers().get("idempotent-replay").is_none());

    let confirm = send(
        &h,
        post(
            &format!("/payment-intents/{}/confirm", id),
            API_KEY_1,
            Some("confirm-twice-1"),
            json!({"payment_method_token": "tok_visa"}),
        ),
    )
    .await;
    assert_eq!(confirm.status(), StatusCode::OK);
    let twice = send(
        &h,
        post(
            &format!("/payment-intents/{}/confirm", id),
            API_KEY_1,
            Some("confirm-twice-2"),
            json!({"payment_method_token": "tok_visa"}),
        ),
    )
    .await;
    assert_eq!(twice.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(twice).await["error"]["code"], "invalid_transition");
}

#[tokio::test]
async fn another_merchants_intent_is_not_found() {
    let h = harness().await;
    let id = created_intent_id(&h, "create-private").await;

    let response = send(&h, get(&format!("/payment-intents/{}", id), API_KEY_2)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let malformed = send(&h, get("/payment-intents/not-a-uuid", API_KEY_1)).await;
    assert_eq!(malformed.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let h = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/payment-intents")
        .header("x-api-key", API_KEY_1)
        .header("idempotency-key", "bad-json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&h, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.store.idempotency_records().is_empty());
}

#[tokio::test]
async fn webhook_is_accepted_then_deduplicated() {
    let h = harness().await;
    let payload = json!({"id": "evt_http", "type": "charge.succeeded", "data": {}}).to_string();
    let request = || {
        Request::builder()
            .method("POST")
            .uri("/webhooks/providers/mock")
            .header("x-provider-signature", sign_mock_webhook(payload.as_bytes(), WEBHOOK_SECRET))
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let first = send(&h, request()).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(first).await, json!({"accepted": true, "duplicate": false}));

    let second = send(&h, request()).await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(second).await, json!({"accepted": true, "duplicate": true}));
    assert_eq!(h.store.jobs().len(), 1);
}

#[tokio::test]
async fn webhook_with_a_bad_signature_is_401() {
    let h = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/providers/mock")
        .header("x-provider-signature", "sha256=deadbeef")
        .body(Body::from(r#"{"id":"evt","type":"t"}"#))
        .unwrap();
    let response = send(&h, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(h.store.webhook_events().is_empty());
}

#[tokio::test]
async fn ops_endpoints_need_no_credentials() {
    let h = harness().await;
    for path in ["/health", "/ops/liveness", "/ops/readiness"] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        assert_eq!(send(&h, request).await.status(), StatusCode::OK, "{}", path);
    }

    let request = Request::builder().uri("/ops/readiness").body(Body::empty()).unwrap();
    let report = body_json(send(&h, request).await).await;
    assert_eq!(report["ready"], true);
}
