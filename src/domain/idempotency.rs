use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl ResponseSnapshot {
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> anyhow::Result<Self> {
        Ok(Self {
            status_code,
            body: serde_json::to_value(body)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub merchant_id: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub response: ResponseSnapshot,
    pub expires_at: DateTime<Utc>,
}
