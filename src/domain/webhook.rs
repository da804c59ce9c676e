use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Valid,
    Invalid,
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStatus::Valid => "valid",
            SignatureStatus::Invalid => "invalid",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "valid" => Ok(SignatureStatus::Valid),
            "invalid" => Ok(SignatureStatus::Invalid),
            other => Err(anyhow::anyhow!("unknown signature status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookProcessingStatus {
    Pending,
    Processed,
}

impl WebhookProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookProcessingStatus::Pending => "pending",
            WebhookProcessingStatus::Processed => "processed",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "pending" => Ok(WebhookProcessingStatus::Pending),
            "processed" => Ok(WebhookProcessingStatus::Processed),
            other => Err(anyhow::anyhow!("unknown webhook processing status: {}", other)),
        }
    }
}

/// Uniqueness on `(provider, event_id)` is the dedup boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderWebhookEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub signature_status: SignatureStatus,
    pub payload_hash: String,
    pub payload: serde_json::Value,
    pub processing_status: WebhookProcessingStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub signature_status: SignatureStatus,
    pub payload_hash: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub duplicate: bool,
}
