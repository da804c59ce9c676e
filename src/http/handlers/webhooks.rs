use crate::domain::webhook::IngestOutcome;
use crate::error::AppResult;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

pub const SIGNATURE_HEADER: &str = "x-provider-signature";
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Unauthenticated: the provider signature over the raw body is the credential.
pub async fn receive_provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<IngestOutcome>)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(STRIPE_SIGNATURE_HEADER))
        .and_then(|h| h.to_str().ok());

    let outcome = state.webhook_service.ingest(&provider, &body, signature).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
