use crate::hashing::{hmac_sha256_hex, verify_hmac_sha256};
use crate::providers::{
    AuthorizeRequest, AuthorizeResult, CaptureRequest, CaptureResult, ParseWebhookInput, ParsedWebhookEvent,
    PaymentProvider, ProviderError, ProviderResult, RefundRequest, RefundResult, VoidRequest, VoidResult,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone)]
struct MockCharge {
    authorized_amount: i64,
    captured_amount: i64,
    voided: bool,
}

#[derive(Deserialize)]
struct MockWebhookBody {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Token conventions: `tok_fail*` declines with `card_declined`,
/// `tok_timeout*` never answers within any sane timeout, everything else
/// is approved.
pub struct MockProvider {
    charges: Mutex<HashMap<String, MockCharge>>,
    hang_for: Duration,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            charges: Mutex::new(HashMap::new()),
            hang_for: Duration::from_secs(3600),
        }
    }

    fn charges(&self) -> ProviderResult<MutexGuard<'_, HashMap<String, MockCharge>>> {
        self.charges
            .lock()
            .map_err(|_| ProviderError::upstream("mock", "charge book poisoned"))
    }
}

pub fn sign_mock_webhook(payload: &[u8], secret: &str) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hmac_sha256_hex(secret, payload))
}

#[async_trait::async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn authorize(&self, request: AuthorizeRequest) -> ProviderResult<AuthorizeResult> {
        if request.payment_method_token.starts_with("tok_timeout") {
            tokio::time::sleep(self.hang_for).await;
        }

        let provider_charge_id = format!("mock_ch_{}", uuid::Uuid::new_v4());
        if request.payment_method_token.starts_with("tok_fail") {
            return Ok(AuthorizeResult {
                approved: false,
                provider_charge_id,
                failure_code: Some("card_declined".to_string()),
            });
        }

        self.charges()?.insert(
            provider_charge_id.clone(),
            MockCharge {
                authorized_amount: request.amount,
                captured_amount: 0,
                voided: false,
            },
        );

        Ok(AuthorizeResult {
            approved: true,
            provider_charge_id,
            failure_code: None,
        })
    }

    async fn capture(&self, request: CaptureRequest) -> ProviderResult<CaptureResult> {
        let mut charges = self.charges()?;
        let charge = charges
            .get_mut(&request.provider_charge_id)
            .filter(|c| !c.voided)
            .ok_or_else(|| ProviderError::upstream("mock", "charge not capturable"))?;

        charge.captured_amount += request.amount;
        Ok(CaptureResult {
            captured_amount: request.amount,
            is_final: charge.captured_amount >= charge.authorized_amount,
        })
    }

    async fn void(&self, request: VoidRequest) -> ProviderResult<VoidResult> {
        let mut charges = self.charges()?;
        let charge = charges
            .get_mut(&request.provider_charge_id)
            .ok_or_else(|| ProviderError::upstream("mock", "charge not found"))?;
        charge.voided = true;
        Ok(VoidResult { voided: true })
    }

    async fn refund(&self, request: RefundRequest) -> ProviderResult<RefundResult> {
        let mut charges = self.charges()?;
        let charge = charges
            .get_mut(&request.provider_charge_id)
            .ok_or_else(|| ProviderError::upstream("mock", "charge not found"))?;

        let provider_refund_id = Some(format!("mock_rf_{}", uuid::Uuid::new_v4()));
        if request.amount <= 0 || request.amount > charge.captured_amount {
            return Ok(RefundResult {
                succeeded: false,
                provider_refund_id,
                failure_code: Some("invalid_refund_amount".to_string()),
            });
        }

        charge.captured_amount -= request.amount;
        Ok(RefundResult {
            succeeded: true,
            provider_refund_id,
            failure_code: None,
        })
    }

    fn parse_webhook(&self, input: ParseWebhookInput<'_>) -> ProviderResult<ParsedWebhookEvent> {
        let signature = input
            .signature
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(ProviderError::InvalidSignature)?;
        if !verify_hmac_sha256(input.secret, input.body, signature) {
            return Err(ProviderError::InvalidSignature);
        }

        let body: MockWebhookBody =
            serde_json::from_slice(input.body).map_err(|e| ProviderError::MalformedWebhook(e.to_string()))?;

        Ok(ParsedWebhookEvent {
            event_id: body.id,
            event_type: body.event_type,
            payload: body.data,
        })
    }
}
