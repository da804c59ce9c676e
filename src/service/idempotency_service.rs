use crate::domain::idempotency::{IdempotencyRecord, ResponseSnapshot};
use crate::error::{AppError, AppResult};
use crate::repo::{CreateOutcome, IdempotencyStore};
use chrono::{Duration, Utc};
use std::sync::Arc;

pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Clone)]
pub struct IdempotencyService {
    pub store: Arc<dyn IdempotencyStore>,
    pub ttl_hours: i64,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            store,
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }

    pub async fn get_replay_if_exists(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
        request_hash: &str,
    ) -> AppResult<Option<ResponseSnapshot>> {
        let Some(record) = self.store.find(merchant_id, idempotency_key).await? else {
            return Ok(None);
        };

        if record.request_hash != request_hash {
            tracing::warn!(
                merchant_id,
                idempotency_key,
                "idempotency key reused with a different request"
            );
            return Err(AppError::IdempotencyConflict);
        }

        Ok(Some(record.response))
    }

    pub async fn store_result(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
        request_hash: &str,
        response: ResponseSnapshot,
    ) -> AppResult<()> {
        self.store_result_with_ttl(merchant_id, idempotency_key, request_hash, response, self.ttl_hours)
            .await
    }

    pub async fn store_result_with_ttl(
        &self,
        merchant_id: &str,
        idempotency_key: &str,
        request_hash: &str,
        response: ResponseSnapshot,
        ttl_hours: i64,
    ) -> AppResult<()> {
        let record = IdempotencyRecord {
            merchant_id: merchant_id.to_string(),
            idempotency_key: idempotency_key.to_string(),
            request_hash: request_hash.to_string(),
            response,
            expires_at: Utc::now() + Duration::hours(ttl_hours),
        };

        if let CreateOutcome::Duplicate = self.store.create(record).await? {
            tracing::debug!(merchant_id, idempotency_key, "idempotency record already stored");
        }
        Ok(())
    }
}
