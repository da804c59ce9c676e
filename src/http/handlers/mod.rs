use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub mod merchants;
pub mod ops;
pub mod payment_intents;
pub mod refunds;
pub mod webhooks;

pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::validation(format!("invalid request body: {}", e)))
}

pub(crate) fn parse_json_or_default<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

pub(crate) fn parse_id(raw: &str, entity: &'static str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(entity))
}
