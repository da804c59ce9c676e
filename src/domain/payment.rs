use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresConfirmation,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
    Failed,
}

impl PaymentIntentStatus {
    pub const ALL: [PaymentIntentStatus; 6] = [
        PaymentIntentStatus::RequiresConfirmation,
        PaymentIntentStatus::Processing,
        PaymentIntentStatus::RequiresCapture,
        PaymentIntentStatus::Succeeded,
        PaymentIntentStatus::Canceled,
        PaymentIntentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::RequiresCapture => "requires_capture",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Canceled => "canceled",
            PaymentIntentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("unknown payment intent status: {}", value))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentIntentStatus::Succeeded | PaymentIntentStatus::Canceled | PaymentIntentStatus::Failed
        )
    }
}

impl std::fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Authorized,
    PartiallyCaptured,
    Captured,
    Voided,
    Failed,
}

impl ChargeStatus {
    pub const ALL: [ChargeStatus; 5] = [
        ChargeStatus::Authorized,
        ChargeStatus::PartiallyCaptured,
        ChargeStatus::Captured,
        ChargeStatus::Voided,
        ChargeStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Authorized => "authorized",
            ChargeStatus::PartiallyCaptured => "partially_captured",
            ChargeStatus::Captured => "captured",
            ChargeStatus::Voided => "voided",
            ChargeStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("unknown charge status: {}", value))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ChargeStatus::Authorized | ChargeStatus::PartiallyCaptured)
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub merchant_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub customer_ref: Option<String>,
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Charge {
    pub id: Uuid,
    pub payment_intent_id: Uuid,
    pub provider: String,
    pub provider_charge_id: String,
    pub authorized_amount: i64,
    pub captured_amount: i64,
    pub status: ChargeStatus,
    pub created_at: DateTime<Utc>,
}

impl Charge {
    pub fn remaining_capturable(&self) -> i64 {
        self.authorized_amount - self.captured_amount
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub merchant_id: String,
    pub amount: i64,
    pub currency: String,
    pub customer_ref: Option<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone)]
pub struct NewCharge {
    pub payment_intent_id: Uuid,
    pub provider: String,
    pub provider_charge_id: String,
    pub authorized_amount: i64,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreatePaymentIntentRequest {
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub customer_ref: Option<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmPaymentIntentRequest {
    pub payment_method_token: String,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CapturePaymentIntentRequest {
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentDetails {
    #[serde(flatten)]
    pub intent: PaymentIntent,
    pub charges: Vec<Charge>,
}

/// Confirm never reports a decline as an error: `failure_code` is set and
/// `charge` is absent when the provider rejected the authorization.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmResponse {
    pub payment_intent_id: Uuid,
    pub status: PaymentIntentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<Charge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureResponse {
    pub payment_intent_id: Uuid,
    pub status: PaymentIntentStatus,
    pub capture_amount: i64,
    pub charge: Charge,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidResponse {
    pub payment_intent_id: Uuid,
    pub status: PaymentIntentStatus,
    pub charge: Charge,
}
