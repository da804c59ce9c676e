use crate::domain::audit::AuditEntry;
use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::merchant::MerchantContext;
use crate::domain::outbox::{NewOutboxEvent, OutboxEvent};
use crate::domain::payment::{Charge, NewCharge, NewPaymentIntent, PaymentIntent, PaymentIntentStatus};
use crate::domain::refund::{NewRefund, Refund, RefundCompletion};
use crate::domain::webhook::{NewWebhookEvent, ProviderWebhookEvent};
use crate::queue::NewJob;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

pub mod audit_repo;
pub mod idempotency_repo;
pub mod memory;
pub mod merchants_repo;
pub mod outbox_repo;
pub mod payments_repo;
pub mod refunds_repo;
pub mod webhook_repo;

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome<T> {
    Created(T),
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct CaptureWrite {
    pub intent_id: Uuid,
    pub charge_id: Uuid,
    pub amount: i64,
    pub provider_final: bool,
    pub event: NewOutboxEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureApplied {
    pub charge: Charge,
    pub intent_status: PaymentIntentStatus,
}

#[derive(Debug, Clone)]
pub struct VoidWrite {
    pub intent_id: Uuid,
    pub charge_id: Uuid,
    pub event: NewOutboxEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookAccepted {
    pub event: ProviderWebhookEvent,
    pub job_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(Refund),
    ExceedsRefundable { refundable: i64 },
}

#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent>;

    async fn find_intent(&self, merchant_id: &str, intent_id: Uuid) -> Result<Option<PaymentIntent>>;

    async fn list_charges(&self, intent_id: Uuid) -> Result<Vec<Charge>>;

    async fn latest_charge(&self, intent_id: Uuid) -> Result<Option<Charge>>;

    async fn find_charge_for_merchant(&self, merchant_id: &str, charge_id: Uuid) -> Result<Option<Charge>>;

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> Result<bool>;

    async fn record_authorization(
        &self,
        intent_id: Uuid,
        charge: NewCharge,
        event: NewOutboxEvent,
    ) -> Result<Option<Charge>>;

    /// Applies the capture only if the charge is still open and the new total
    /// stays within the authorization.
    async fn record_capture(&self, write: CaptureWrite) -> Result<Option<CaptureApplied>>;

    async fn record_void(&self, write: VoidWrite) -> Result<Option<Charge>>;
}

#[async_trait::async_trait]
pub trait RefundStore: Send + Sync {
    /// Inserts a pending refund if pending plus succeeded refunds plus this
    /// one stay within the charge's captured amount.
    async fn reserve_refund(&self, refund: NewRefund) -> Result<ReserveOutcome>;

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        completion: RefundCompletion,
        event: NewOutboxEvent,
    ) -> Result<Refund>;

    async fn find_refund_for_merchant(&self, merchant_id: &str, refund_id: Uuid) -> Result<Option<Refund>>;
}

#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find(&self, merchant_id: &str, idempotency_key: &str) -> Result<Option<IdempotencyRecord>>;

    async fn create(&self, record: IdempotencyRecord) -> Result<CreateOutcome<IdempotencyRecord>>;
}

#[async_trait::async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<OutboxEvent>;

    async fn claim_due(&self, limit: usize, lease: Duration, max_attempts: i32) -> Result<Vec<OutboxEvent>>;

    async fn mark_processed(&self, event_id: Uuid) -> Result<()>;

    async fn mark_failed(&self, event_id: Uuid, next_run_at: DateTime<Utc>, error: &str) -> Result<()>;

    async fn find(&self, event_id: Uuid) -> Result<Option<OutboxEvent>>;
}

#[async_trait::async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Records the event and queues its processing job together. Nothing is
    /// written for a duplicate `(provider, event_id)`.
    async fn create_with_job(&self, event: NewWebhookEvent, job: NewJob) -> Result<CreateOutcome<WebhookAccepted>>;

    async fn find(&self, event_id: Uuid) -> Result<Option<ProviderWebhookEvent>>;

    async fn mark_processed(&self, event_id: Uuid) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    async fn write(&self, entry: AuditEntry) -> Result<()>;
}

#[async_trait::async_trait]
pub trait MerchantStore: Send + Sync {
    async fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<MerchantContext>>;

    async fn create_with_api_key(&self, merchant_id: &str, name: &str, key_hash: &str) -> Result<MerchantContext>;
}
