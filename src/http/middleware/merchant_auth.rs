use crate::domain::audit::AuditEntry;
use crate::error::AppError;
use crate::hashing::hash_api_key;
use crate::repo::{AuditStore, MerchantStore};
use crate::service::payment_service::audit_best_effort;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct MerchantAuth {
    pub merchants: Arc<dyn MerchantStore>,
    pub audit: Arc<dyn AuditStore>,
    pub hash_secret: String,
}

pub async fn require_merchant(
    State(auth): State<MerchantAuth>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Owned copies: the request body is not Sync, so no borrow of the
    // request may live across an await.
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    let Some(raw_key) = provided else {
        return reject(&auth, method, path, "missing_api_key").await;
    };

    let key_hash = hash_api_key(&auth.hash_secret, &raw_key);
    match auth.merchants.find_by_api_key_hash(&key_hash).await {
        Ok(Some(merchant)) => {
            audit_best_effort(
                auth.audit.as_ref(),
                AuditEntry::merchant(
                    &merchant.merchant_id,
                    "auth.succeeded",
                    "api_key",
                    &merchant.api_key_id,
                    json!({"method": method, "path": path}),
                )
                .with_actor(&merchant.api_key_id),
            )
            .await;
            request.extensions_mut().insert(merchant);
            next.run(request).await
        }
        Ok(None) => reject(&auth, method, path, "invalid_api_key").await,
        Err(e) => AppError::Internal(e).into_response(),
    }
}

async fn reject(auth: &MerchantAuth, method: String, path: String, reason: &str) -> Response {
    tracing::warn!(%path, reason, "authentication failed");
    audit_best_effort(
        auth.audit.as_ref(),
        AuditEntry::system(
            "auth.failed",
            "api_key",
            "unknown",
            json!({"reason": reason, "method": method, "path": path}),
        ),
    )
    .await;
    AppError::Unauthorized("invalid or missing api key".to_string()).into_response()
}
