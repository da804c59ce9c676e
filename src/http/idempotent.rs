use crate::domain::idempotency::ResponseSnapshot;
use crate::domain::merchant::MerchantContext;
use crate::error::{AppError, AppResult};
use crate::hashing::request_fingerprint;
use crate::service::idempotency_service::IdempotencyService;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::future::Future;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REPLAY_HEADER: &str = "idempotent-replay";

pub struct IdempotentRequest<'a> {
    pub merchant: &'a MerchantContext,
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

impl IdempotentRequest<'_> {
    fn key(&self) -> AppResult<String> {
        self.headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::validation("idempotency-key header is required"))
    }

    fn fingerprint(&self) -> String {
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path());
        request_fingerprint(&self.merchant.merchant_id, self.method.as_str(), path, self.body)
    }
}

fn snapshot_response(snapshot: ResponseSnapshot, replay: bool) -> Response {
    let status = StatusCode::from_u16(snapshot.status_code).unwrap_or(StatusCode::OK);
    let mut response = (status, Json(snapshot.body)).into_response();
    if replay {
        response
            .headers_mut()
            .insert(REPLAY_HEADER, HeaderValue::from_static("true"));
    }
    response
}

/// Runs `op` at most once per `(merchant, idempotency-key)`.
pub async fn execute_idempotent<T, F, Fut>(
    service: &IdempotencyService,
    request: IdempotentRequest<'_>,
    success_status: StatusCode,
    op: F,
) -> AppResult<Response>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let key = request.key()?;
    let request_hash = request.fingerprint();
    let merchant_id = request.merchant.merchant_id.as_str();

    if let Some(snapshot) = service.get_replay_if_exists(merchant_id, &key, &request_hash).await? {
        tracing::debug!(merchant_id, idempotency_key = %key, "replaying stored response");
        return Ok(snapshot_response(snapshot, true));
    }

    let value = op().await?;
    let snapshot = ResponseSnapshot::json(success_status.as_u16(), &value)?;
    service
        .store_result(merchant_id, &key, &request_hash, snapshot.clone())
        .await?;

    Ok(snapshot_response(snapshot, false))
}
