use crate::domain::audit::AuditEntry;
use crate::domain::outbox::{self, NewOutboxEvent};
use crate::domain::payment::{
    CapturePaymentIntentRequest, CaptureResponse, Charge, ConfirmPaymentIntentRequest, ConfirmResponse,
    CreatePaymentIntentRequest, NewCharge, NewPaymentIntent, PaymentIntent, PaymentIntentDetails,
    PaymentIntentStatus, VoidResponse,
};
use crate::domain::state_machine::{decide_capture, decide_void, transition_payment_intent, PaymentIntentEvent};
use crate::error::{AppError, AppResult};
use crate::providers::{AuthorizeRequest, CaptureRequest, ProviderError, ProviderRegistry, VoidRequest};
use crate::repo::{AuditStore, CaptureWrite, PaymentStore, VoidWrite};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentService {
    pub payments: Arc<dyn PaymentStore>,
    pub audit: Arc<dyn AuditStore>,
    pub providers: ProviderRegistry,
    pub default_provider: String,
}

pub fn validate_amount(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::validation("amount must be a positive integer"));
    }
    Ok(())
}

pub fn normalize_currency(currency: &str) -> AppResult<String> {
    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("currency must be a three-letter code"));
    }
    Ok(currency.to_ascii_uppercase())
}

impl PaymentService {
    pub async fn create_payment_intent(
        &self,
        merchant_id: &str,
        req: CreatePaymentIntentRequest,
    ) -> AppResult<PaymentIntent> {
        validate_amount(req.amount)?;
        let currency = normalize_currency(&req.currency)?;

        let intent = self
            .payments
            .create_intent(NewPaymentIntent {
                merchant_id: merchant_id.to_string(),
                amount: req.amount,
                currency,
                customer_ref: req.customer_ref,
                metadata: req.metadata,
            })
            .await?;

        self.audit(AuditEntry::merchant(
            merchant_id,
            "payment_intent.created",
            "payment_intent",
            intent.id,
            json!({"amount": intent.amount, "currency": intent.currency}),
        ))
        .await;

        tracing::info!(payment_intent_id = %intent.id, merchant_id, "payment intent created");
        Ok(intent)
    }

    pub async fn get_payment_intent(&self, merchant_id: &str, intent_id: Uuid) -> AppResult<PaymentIntentDetails> {
        let intent = self.load_intent(merchant_id, intent_id).await?;
        let charges = self.payments.list_charges(intent.id).await?;
        Ok(PaymentIntentDetails { intent, charges })
    }

    pub async fn confirm_payment_intent(
        &self,
        merchant_id: &str,
        intent_id: Uuid,
        req: ConfirmPaymentIntentRequest,
    ) -> AppResult<ConfirmResponse> {
        if req.payment_method_token.trim().is_empty() {
            return Err(AppError::validation("payment_method_token is required"));
        }

        let intent = self.load_intent(merchant_id, intent_id).await?;
        let provider_name = req.provider.as_deref().unwrap_or(&self.default_provider);
        let provider = self.providers.get(provider_name)?;

        let processing = transition_payment_intent(intent.status, PaymentIntentEvent::ConfirmStarted)?;
        self.compare_and_set(&intent, processing).await?;

        let result = self
            .providers
            .authorize(
                provider.as_ref(),
                AuthorizeRequest {
                    amount: intent.amount,
                    currency: intent.currency.clone(),
                    payment_method_token: req.payment_method_token.clone(),
                    metadata: intent.metadata.clone(),
                },
            )
            .await;

        let result = match result {
            Ok(result) => result,
            Err(err) => return Err(self.fail_authorization_on_error(merchant_id, &intent, err).await),
        };

        if !result.approved {
            let failed = transition_payment_intent(processing, PaymentIntentEvent::AuthorizationFailed)?;
            self.compare_and_set_from(intent.id, processing, failed).await?;
            let failure_code = result.failure_code.unwrap_or_else(|| "authorization_declined".to_string());

            self.audit(AuditEntry::merchant(
                merchant_id,
                "payment_intent.authorization_failed",
                "payment_intent",
                intent.id,
                json!({"provider": provider.name(), "failure_code": failure_code}),
            ))
            .await;

            tracing::info!(payment_intent_id = %intent.id, failure_code, "authorization declined");
            return Ok(ConfirmResponse {
                payment_intent_id: intent.id,
                status: failed,
                charge: None,
                failure_code: Some(failure_code),
            });
        }

        let authorized = transition_payment_intent(processing, PaymentIntentEvent::Authorized)?;
        let event = NewOutboxEvent::payment_intent(
            outbox::PAYMENT_AUTHORIZED,
            intent.id,
            json!({
                "payment_intent_id": intent.id,
                "merchant_id": merchant_id,
                "provider": provider.name(),
                "provider_charge_id": result.provider_charge_id,
                "amount": intent.amount,
                "currency": intent.currency,
            }),
        );
        let charge = self
            .payments
            .record_authorization(
                intent.id,
                NewCharge {
                    payment_intent_id: intent.id,
                    provider: provider.name().to_string(),
                    provider_charge_id: result.provider_charge_id.clone(),
                    authorized_amount: intent.amount,
                },
                event,
            )
            .await?
            .ok_or_else(|| lost_race(intent.id))?;

        self.audit(AuditEntry::merchant(
            merchant_id,
            "payment_intent.authorized",
            "payment_intent",
            intent.id,
            json!({"charge_id": charge.id, "provider": charge.provider}),
        ))
        .await;

        tracing::info!(payment_intent_id = %intent.id, charge_id = %charge.id, "payment intent authorized");
        Ok(ConfirmResponse {
            payment_intent_id: intent.id,
            status: authorized,
            charge: Some(charge),
            failure_code: None,
        })
    }

    pub async fn capture_payment_intent(
        &self,
        merchant_id: &str,
        intent_id: Uuid,
        req: CapturePaymentIntentRequest,
    ) -> AppResult<CaptureResponse> {
        let intent = self.load_intent(merchant_id, intent_id).await?;
        let charge = self.load_latest_charge(intent.id).await?;

        let capture_amount = req.amount.unwrap_or_else(|| charge.remaining_capturable());
        decide_capture(&charge, capture_amount)?;
        transition_payment_intent(intent.status, PaymentIntentEvent::Captured)?;

        let provider = self.providers.get(&charge.provider)?;
        let result = self
            .providers
            .capture(
                provider.as_ref(),
                CaptureRequest {
                    provider_charge_id: charge.provider_charge_id.clone(),
                    amount: capture_amount,
                },
            )
            .await
            .map_err(|e| provider_failure(intent.id, "capture", e))?;

        let event = NewOutboxEvent::payment_intent(
            outbox::PAYMENT_CAPTURED,
            intent.id,
            json!({
                "payment_intent_id": intent.id,
                "merchant_id": merchant_id,
                "charge_id": charge.id,
                "capture_amount": capture_amount,
                "is_final": result.is_final,
            }),
        );
        let applied = self
            .payments
            .record_capture(CaptureWrite {
                intent_id: intent.id,
                charge_id: charge.id,
                amount: capture_amount,
                provider_final: result.is_final,
                event,
            })
            .await?
            .ok_or_else(|| lost_race(intent.id))?;

        self.audit(AuditEntry::merchant(
            merchant_id,
            "payment_intent.captured",
            "payment_intent",
            intent.id,
            json!({
                "charge_id": applied.charge.id,
                "capture_amount": capture_amount,
                "captured_amount": applied.charge.captured_amount,
            }),
        ))
        .await;

        Ok(CaptureResponse {
            payment_intent_id: intent.id,
            status: applied.intent_status,
            capture_amount,
            charge: applied.charge,
        })
    }

    pub async fn void_payment_intent(&self, merchant_id: &str, intent_id: Uuid) -> AppResult<VoidResponse> {
        let intent = self.load_intent(merchant_id, intent_id).await?;
        let charge = self.load_latest_charge(intent.id).await?;

        decide_void(&charge)?;
        let canceled = transition_payment_intent(intent.status, PaymentIntentEvent::Voided)?;

        let provider = self.providers.get(&charge.provider)?;
        let result = self
            .providers
            .void(
                provider.as_ref(),
                VoidRequest {
                    provider_charge_id: charge.provider_charge_id.clone(),
                },
            )
            .await
            .map_err(|e| provider_failure(intent.id, "void", e))?;
        if !result.voided {
            return Err(AppError::Provider(format!(
                "provider {} refused to void charge {}",
                provider.name(),
                charge.id
            )));
        }

        let event = NewOutboxEvent::payment_intent(
            outbox::PAYMENT_VOIDED,
            intent.id,
            json!({
                "payment_intent_id": intent.id,
                "merchant_id": merchant_id,
                "charge_id": charge.id,
            }),
        );
        let charge = self
            .payments
            .record_void(VoidWrite {
                intent_id: intent.id,
                charge_id: charge.id,
                event,
            })
            .await?
            .ok_or_else(|| lost_race(intent.id))?;

        self.audit(AuditEntry::merchant(
            merchant_id,
            "payment_intent.voided",
            "payment_intent",
            intent.id,
            json!({"charge_id": charge.id}),
        ))
        .await;

        Ok(VoidResponse {
            payment_intent_id: intent.id,
            status: canceled,
            charge,
        })
    }

    async fn load_intent(&self, merchant_id: &str, intent_id: Uuid) -> AppResult<PaymentIntent> {
        self.payments
            .find_intent(merchant_id, intent_id)
            .await?
            .ok_or(AppError::NotFound("payment intent"))
    }

    async fn load_latest_charge(&self, intent_id: Uuid) -> AppResult<Charge> {
        self.payments
            .latest_charge(intent_id)
            .await?
            .ok_or(AppError::NotFound("charge"))
    }

    async fn compare_and_set(&self, intent: &PaymentIntent, to: PaymentIntentStatus) -> AppResult<()> {
        self.compare_and_set_from(intent.id, intent.status, to).await
    }

    async fn compare_and_set_from(
        &self,
        intent_id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> AppResult<()> {
        if !self.payments.transition_intent(intent_id, from, to).await? {
            return Err(lost_race(intent_id));
        }
        Ok(())
    }

    /// A transport failure is not a decline: the intent is failed, audited
    /// distinctly and the provider error is returned to the caller.
    async fn fail_authorization_on_error(
        &self,
        merchant_id: &str,
        intent: &PaymentIntent,
        err: ProviderError,
    ) -> AppError {
        let action = if err.is_timeout() {
            "payment_intent.authorization_timeout"
        } else {
            "payment_intent.authorization_error"
        };
        tracing::warn!(payment_intent_id = %intent.id, error = %err, "authorization did not complete");

        let moved = self
            .payments
            .transition_intent(intent.id, PaymentIntentStatus::Processing, PaymentIntentStatus::Failed)
            .await;
        if let Err(e) = moved {
            tracing::error!(payment_intent_id = %intent.id, error = ?e, "failed to mark intent failed");
            return AppError::Internal(e);
        }

        self.audit(AuditEntry::merchant(
            merchant_id,
            action,
            "payment_intent",
            intent.id,
            json!({"error": err.to_string()}),
        ))
        .await;

        AppError::from(err)
    }

    async fn audit(&self, entry: AuditEntry) {
        audit_best_effort(self.audit.as_ref(), entry).await;
    }
}

pub async fn audit_best_effort(audit: &dyn AuditStore, entry: AuditEntry) {
    let action = entry.action.clone();
    if let Err(e) = audit.write(entry).await {
        tracing::warn!(action, error = ?e, "audit write failed");
    }
}

fn lost_race(intent_id: Uuid) -> AppError {
    tracing::error!(payment_intent_id = %intent_id, "payment intent changed concurrently");
    AppError::ConcurrentModification(format!("payment intent {} was modified concurrently", intent_id))
}

fn provider_failure(intent_id: Uuid, operation: &str, err: ProviderError) -> AppError {
    tracing::warn!(payment_intent_id = %intent_id, operation, error = %err, "provider call failed");
    AppError::from(err)
}
