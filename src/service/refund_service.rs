use crate::domain::audit::AuditEntry;
use crate::domain::outbox::{self, NewOutboxEvent};
use crate::domain::refund::{CreateRefundRequest, NewRefund, Refund, RefundCompletion, RefundStatus};
use crate::error::{AppError, AppResult};
use crate::providers::{ProviderRegistry, RefundRequest};
use crate::repo::{AuditStore, PaymentStore, RefundStore, ReserveOutcome};
use crate::service::payment_service::{audit_best_effort, validate_amount};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct RefundService {
    pub payments: Arc<dyn PaymentStore>,
    pub refunds: Arc<dyn RefundStore>,
    pub audit: Arc<dyn AuditStore>,
    pub providers: ProviderRegistry,
}

impl RefundService {
    /// Reserves the amount against the charge before calling the provider,
    /// so concurrent refunds can never sum past the captured amount.
    pub async fn create_refund(&self, merchant_id: &str, req: CreateRefundRequest) -> AppResult<Refund> {
        validate_amount(req.amount)?;

        let charge = self
            .payments
            .find_charge_for_merchant(merchant_id, req.charge_id)
            .await?
            .ok_or(AppError::NotFound("charge"))?;
        if req.amount > charge.captured_amount {
            return Err(AppError::validation("refund amount exceeds captured amount"));
        }

        let provider = self.providers.get(&charge.provider)?;

        let reserved = self
            .refunds
            .reserve_refund(NewRefund {
                charge_id: charge.id,
                amount: req.amount,
                reason: req.reason.clone(),
            })
            .await?;
        let pending = match reserved {
            ReserveOutcome::Reserved(refund) => refund,
            ReserveOutcome::ExceedsRefundable { refundable } => {
                tracing::info!(charge_id = %charge.id, refundable, requested = req.amount, "refund rejected");
                return Err(AppError::validation("refund amount exceeds remaining refundable amount"));
            }
        };

        let result = self
            .providers
            .refund(
                provider.as_ref(),
                RefundRequest {
                    provider_charge_id: charge.provider_charge_id.clone(),
                    amount: req.amount,
                    reason: req.reason.clone(),
                },
            )
            .await;

        let completion = match result {
            Ok(result) if result.succeeded => RefundCompletion {
                status: RefundStatus::Succeeded,
                provider_refund_id: result.provider_refund_id,
                failure_code: None,
            },
            Ok(result) => RefundCompletion {
                status: RefundStatus::Failed,
                provider_refund_id: result.provider_refund_id,
                failure_code: Some(result.failure_code.unwrap_or_else(|| "refund_failed".to_string())),
            },
            Err(err) if err.is_timeout() => {
                // Outcome unknown at the provider: the pending reservation stays held.
                tracing::warn!(refund_id = %pending.id, error = %err, "refund left pending after provider timeout");
                return Err(AppError::from(err));
            }
            Err(err) => {
                tracing::warn!(refund_id = %pending.id, error = %err, "refund provider call failed");
                let failed = RefundCompletion {
                    status: RefundStatus::Failed,
                    provider_refund_id: None,
                    failure_code: Some("provider_error".to_string()),
                };
                self.complete(merchant_id, pending.id, failed).await?;
                return Err(AppError::from(err));
            }
        };

        let refund = self.complete(merchant_id, pending.id, completion).await?;

        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::merchant(
                merchant_id,
                "refund.created",
                "refund",
                refund.id,
                json!({
                    "charge_id": refund.charge_id,
                    "amount": refund.amount,
                    "status": refund.status,
                    "failure_code": refund.failure_code,
                }),
            ),
        )
        .await;

        Ok(refund)
    }

    pub async fn get_refund(&self, merchant_id: &str, refund_id: Uuid) -> AppResult<Refund> {
        self.refunds
            .find_refund_for_merchant(merchant_id, refund_id)
            .await?
            .ok_or(AppError::NotFound("refund"))
    }

    async fn complete(&self, merchant_id: &str, refund_id: Uuid, completion: RefundCompletion) -> AppResult<Refund> {
        let event_type = match completion.status {
            RefundStatus::Succeeded => outbox::REFUND_SUCCEEDED,
            _ => outbox::REFUND_FAILED,
        };
        let event = NewOutboxEvent::refund(
            event_type,
            refund_id,
            json!({
                "refund_id": refund_id,
                "merchant_id": merchant_id,
                "status": completion.status,
                "provider_refund_id": completion.provider_refund_id,
                "failure_code": completion.failure_code,
            }),
        );
        Ok(self.refunds.complete_refund(refund_id, completion, event).await?)
    }
}
