use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PAYMENT_AUTHORIZED: &str = "payment.authorized";
pub const PAYMENT_CAPTURED: &str = "payment.captured";
pub const PAYMENT_VOIDED: &str = "payment.voided";
pub const REFUND_SUCCEEDED: &str = "refund.succeeded";
pub const REFUND_FAILED: &str = "refund.failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processed => "processed",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "pending" => Ok(OutboxStatus::Pending),
            "processed" => Ok(OutboxStatus::Processed),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(anyhow::anyhow!("unknown outbox status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    pub fn payment_intent(event_type: &str, payment_intent_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            aggregate_type: "payment_intent".to_string(),
            aggregate_id: payment_intent_id.to_string(),
            payload,
        }
    }

    pub fn refund(event_type: &str, refund_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            aggregate_type: "refund".to_string(),
            aggregate_id: refund_id.to_string(),
            payload,
        }
    }

    pub fn into_pending(self, now: DateTime<Utc>) -> OutboxEvent {
        OutboxEvent {
            id: Uuid::new_v4(),
            event_type: self.event_type,
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            payload: self.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_run_at: now,
            last_error: None,
            created_at: now,
        }
    }
}
