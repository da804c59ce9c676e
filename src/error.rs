use crate::domain::state_machine::TransitionError;
use crate::providers::ProviderError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("idempotency key was already used for a different request")]
    IdempotencyConflict,
    #[error("{0}")]
    ConcurrentModification(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("{0}")]
    ProviderTimeout(String),
    #[error("{0}")]
    Provider(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Transition(_) | AppError::UnknownProvider(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IdempotencyConflict | AppError::ConcurrentModification(_) => StatusCode::CONFLICT,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Transition(_) => "invalid_transition",
            AppError::NotFound(_) => "not_found",
            AppError::IdempotencyConflict => "idempotency_conflict",
            AppError::ConcurrentModification(_) => "concurrent_modification",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::UnknownProvider(_) => "unknown_provider",
            AppError::ProviderTimeout(_) => "provider_timeout",
            AppError::Provider(_) => "provider_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let message = match self {
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                message,
                details: None,
            },
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownProvider(name) => AppError::UnknownProvider(name),
            ProviderError::InvalidSignature => AppError::Unauthorized(e.to_string()),
            ProviderError::MalformedWebhook(_) => AppError::Validation(e.to_string()),
            ProviderError::Timeout { .. } => AppError::ProviderTimeout(e.to_string()),
            ProviderError::Upstream { .. } => AppError::Provider(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = ?err, "internal error");
        }
        (self.status(), Json(self.envelope())).into_response()
    }
}
