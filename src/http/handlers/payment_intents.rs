use crate::domain::merchant::MerchantContext;
use crate::domain::payment::{
    CapturePaymentIntentRequest, ConfirmPaymentIntentRequest, CreatePaymentIntentRequest, PaymentIntentDetails,
};
use crate::error::AppResult;
use crate::http::handlers::{parse_id, parse_json, parse_json_or_default};
use crate::http::idempotent::{execute_idempotent, IdempotentRequest};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::{Extension, Json};

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let request = IdempotentRequest {
        merchant: &merchant,
        method: &method,
        uri: &uri,
        headers: &headers,
        body: &body,
    };
    execute_idempotent(&state.idempotency_service, request, StatusCode::CREATED, || async {
        let req: CreatePaymentIntentRequest = parse_json(&body)?;
        state
            .payment_service
            .create_payment_intent(&merchant.merchant_id, req)
            .await
    })
    .await
}

pub async fn get_payment_intent(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<String>,
) -> AppResult<Json<PaymentIntentDetails>> {
    let id = parse_id(&id, "payment intent")?;
    let details = state
        .payment_service
        .get_payment_intent(&merchant.merchant_id, id)
        .await?;
    Ok(Json(details))
}

pub async fn confirm_payment_intent(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let request = IdempotentRequest {
        merchant: &merchant,
        method: &method,
        uri: &uri,
        headers: &headers,
        body: &body,
    };
    execute_idempotent(&state.idempotency_service, request, StatusCode::OK, || async {
        let id = parse_id(&id, "payment intent")?;
        let req: ConfirmPaymentIntentRequest = parse_json(&body)?;
        state
            .payment_service
            .confirm_payment_intent(&merchant.merchant_id, id, req)
            .await
    })
    .await
}

pub async fn capture_payment_intent(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let request = IdempotentRequest {
        merchant: &merchant,
        method: &method,
        uri: &uri,
        headers: &headers,
        body: &body,
    };
    execute_idempotent(&state.idempotency_service, request, StatusCode::OK, || async {
        let id = parse_id(&id, "payment intent")?;
        let req: CapturePaymentIntentRequest = parse_json_or_default(&body)?;
        state
            .payment_service
            .capture_payment_intent(&merchant.merchant_id, id, req)
            .await
    })
    .await
}

pub async fn void_payment_intent(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let request = IdempotentRequest {
        merchant: &merchant,
        method: &method,
        uri: &uri,
        headers: &headers,
        body: &body,
    };
    execute_idempotent(&state.idempotency_service, request, StatusCode::OK, || async {
        let id = parse_id(&id, "payment intent")?;
        state
            .payment_service
            .void_payment_intent(&merchant.merchant_id, id)
            .await
    })
    .await
}
