use crate::domain::idempotency::{IdempotencyRecord, ResponseSnapshot};
use crate::repo::{CreateOutcome, IdempotencyStore};
use anyhow::Result;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct IdempotencyRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl IdempotencyStore for IdempotencyRepo {
    async fn find(&self, merchant_id: &str, idempotency_key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT merchant_id, idempotency_key, request_hash, status_code, response_body, expires_at
            FROM idempotency_keys
            WHERE merchant_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(merchant_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };
        let status_code: i32 = r.get("status_code");
        let body: String = r.get("response_body");
        Ok(Some(IdempotencyRecord {
            merchant_id: r.get("merchant_id"),
            idempotency_key: r.get("idempotency_key"),
            request_hash: r.get("request_hash"),
            response: ResponseSnapshot {
                status_code: u16::try_from(status_code)?,
                body: serde_json::from_str(&body)?,
            },
            expires_at: r.get("expires_at"),
        }))
    }

    async fn create(&self, record: IdempotencyRecord) -> Result<CreateOutcome<IdempotencyRecord>> {
        let body = serde_json::to_string(&record.response.body)?;
        let res = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (merchant_id, idempotency_key, request_hash, status_code, response_body, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (merchant_id, idempotency_key) DO NOTHING
            "#,
        )
        .bind(&record.merchant_id)
        .bind(&record.idempotency_key)
        .bind(&record.request_hash)
        .bind(i32::from(record.response.status_code))
        .bind(body)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(CreateOutcome::Duplicate);
        }
        Ok(CreateOutcome::Created(record))
    }
}
