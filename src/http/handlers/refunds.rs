use crate::domain::merchant::MerchantContext;
use crate::domain::refund::{CreateRefundRequest, Refund};
use crate::error::AppResult;
use crate::http::handlers::{parse_id, parse_json};
use crate::http::idempotent::{execute_idempotent, IdempotentRequest};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::{Extension, Json};

pub async fn create_refund(
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
        let req: CreateRefundRequest = parse_json(&body)?;
        state.refund_service.create_refund(&merchant.merchant_id, req).await
    })
    .await
}

pub async fn get_refund(
    State(state): State<AppState>,
    Extension(merchant): Extension<MerchantContext>,
    Path(id): Path<String>,
) -> AppResult<Json<Refund>> {
    let id = parse_id(&id, "refund")?;
    let refund = state.refund_service.get_refund(&merchant.merchant_id, id).await?;
    Ok(Json(refund))
}
