use crate::hashing::verify_hmac_sha256;
use crate::providers::{
    AuthorizeRequest, AuthorizeResult, CaptureRequest, CaptureResult, ParseWebhookInput, ParsedWebhookEvent,
    PaymentProvider, ProviderError, ProviderResult, RefundRequest, RefundResult, VoidRequest, VoidResult,
};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

const SIGNATURE_TOLERANCE_SECS: i64 = 300;
const REFUND_REASONS: [&str; 3] = ["duplicate", "fraudulent", "requested_by_customer"];

pub struct StripeProvider {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl StripeProvider {
    pub fn new(base_url: String, secret_key: String, timeout_ms: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    async fn post_form(
        &self,
        operation: &'static str,
        path: &str,
        form: &[(String, String)],
    ) -> ProviderResult<(StatusCode, Value)> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(form)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| transport_error(operation, e))?;
        Ok((status, body))
    }
}

fn transport_error(operation: &'static str, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout("stripe", operation)
    } else {
        ProviderError::upstream("stripe", e.to_string())
    }
}

fn api_error(status: StatusCode, body: &Value) -> ProviderError {
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("request failed");
    ProviderError::upstream("stripe", format!("HTTP {}: {}", status.as_u16(), message))
}

fn decline_code(body: &Value) -> String {
    body.pointer("/error/decline_code")
        .or_else(|| body.pointer("/error/code"))
        .and_then(Value::as_str)
        .unwrap_or("card_declined")
        .to_string()
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(ToString::to_string)
}

/// Parses `t=<ts>,v1=<sig>[,v1=<sig>...]`.
fn parse_signature_header(header: &str) -> Option<(i64, Vec<&str>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    match timestamp {
        Some(ts) if !signatures.is_empty() => Some((ts, signatures)),
        _ => None,
    }
}

pub fn verify_stripe_signature(body: &[u8], header: &str, secret: &str, now_unix: i64) -> bool {
    let Some((timestamp, signatures)) = parse_signature_header(header) else {
        return false;
    };
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    let mut signed = format!("{}.", timestamp).into_bytes();
    signed.extend_from_slice(body);
    signatures.iter().any(|sig| verify_hmac_sha256(secret, &signed, sig))
}

#[async_trait::async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn authorize(&self, request: AuthorizeRequest) -> ProviderResult<AuthorizeResult> {
        let mut form = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.to_ascii_lowercase()),
            ("payment_method".to_string(), request.payment_method_token.clone()),
            ("capture_method".to_string(), "manual".to_string()),
            ("confirm".to_string(), "true".to_string()),
        ];
        if let Some(metadata) = &request.metadata {
            for (key, value) in metadata {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form.push((format!("metadata[{}]", key), value));
            }
        }

        let (status, body) = self.post_form("authorize", "/v1/payment_intents", &form).await?;
        if status == StatusCode::PAYMENT_REQUIRED {
            let provider_charge_id = body
                .pointer("/error/payment_intent/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(AuthorizeResult {
                approved: false,
                provider_charge_id,
                failure_code: Some(decline_code(&body)),
            });
        }
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let provider_charge_id =
            str_field(&body, "id").ok_or_else(|| ProviderError::upstream("stripe", "payment intent id missing"))?;
        let approved = str_field(&body, "status").as_deref() == Some("requires_capture");
        Ok(AuthorizeResult {
            approved,
            provider_charge_id,
            failure_code: if approved {
                None
            } else {
                Some("authorization_incomplete".to_string())
            },
        })
    }

    async fn capture(&self, request: CaptureRequest) -> ProviderResult<CaptureResult> {
        let path = format!("/v1/payment_intents/{}/capture", request.provider_charge_id);
        let form = vec![("amount_to_capture".to_string(), request.amount.to_string())];
        let (status, body) = self.post_form("capture", &path, &form).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let captured_amount = body
            .get("amount_received")
            .and_then(Value::as_i64)
            .unwrap_or(request.amount);
        // A PaymentIntent can only be captured once; the remainder is released.
        Ok(CaptureResult {
            captured_amount,
            is_final: true,
        })
    }

    async fn void(&self, request: VoidRequest) -> ProviderResult<VoidResult> {
        let path = format!("/v1/payment_intents/{}/cancel", request.provider_charge_id);
        let (status, body) = self.post_form("void", &path, &[]).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        Ok(VoidResult {
            voided: str_field(&body, "status").as_deref() == Some("canceled"),
        })
    }

    async fn refund(&self, request: RefundRequest) -> ProviderResult<RefundResult> {
        let mut form = vec![
            ("payment_intent".to_string(), request.provider_charge_id.clone()),
            ("amount".to_string(), request.amount.to_string()),
        ];
        if let Some(reason) = request.reason.as_deref().filter(|r| REFUND_REASONS.contains(r)) {
            form.push(("reason".to_string(), reason.to_string()));
        }

        let (status, body) = self.post_form("refund", "/v1/refunds", &form).await?;
        if status.is_client_error() {
            return Ok(RefundResult {
                succeeded: false,
                provider_refund_id: None,
                failure_code: Some(decline_code(&body)),
            });
        }
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let refund_status = str_field(&body, "status");
        let succeeded = matches!(refund_status.as_deref(), Some("succeeded") | Some("pending"));
        Ok(RefundResult {
            succeeded,
            provider_refund_id: str_field(&body, "id"),
            failure_code: if succeeded { None } else { str_field(&body, "failure_reason") },
        })
    }

    fn parse_webhook(&self, input: ParseWebhookInput<'_>) -> ProviderResult<ParsedWebhookEvent> {
        let now = chrono::Utc::now().timestamp();
        if !verify_stripe_signature(input.body, input.signature, input.secret, now) {
            return Err(ProviderError::InvalidSignature);
        }

        let body: Value =
            serde_json::from_slice(input.body).map_err(|e| ProviderError::MalformedWebhook(e.to_string()))?;
        let event_id = str_field(&body, "id").ok_or_else(|| ProviderError::MalformedWebhook("missing id".into()))?;
        let event_type =
            str_field(&body, "type").ok_or_else(|| ProviderError::MalformedWebhook("missing type".into()))?;
        let payload = body.pointer("/data/object").cloned().unwrap_or(Value::Null);

        Ok(ParsedWebhookEvent {
            event_id,
            event_type,
            payload,
        })
    }
}
