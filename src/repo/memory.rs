use crate::domain::audit::AuditEntry;
use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::merchant::MerchantContext;
use crate::domain::outbox::{NewOutboxEvent, OutboxEvent, OutboxStatus};
use crate::domain::payment::{Charge, ChargeStatus, NewCharge, NewPaymentIntent, PaymentIntent, PaymentIntentStatus};
use crate::domain::refund::{NewRefund, Refund, RefundCompletion, RefundStatus};
use crate::domain::webhook::{NewWebhookEvent, ProviderWebhookEvent, WebhookProcessingStatus};
use crate::queue::{next_failure_outcome, FailOutcome, Job, JobQueue, JobStatus, NewJob, LEASE_EXPIRED};
use crate::repo::{
    AuditStore, CaptureApplied, CaptureWrite, CreateOutcome, IdempotencyStore, MerchantStore, OutboxStore,
    PaymentStore, RefundStore, ReserveOutcome, VoidWrite, WebhookAccepted, WebhookEventStore,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct State {
    merchants: HashMap<String, String>,
    api_keys: HashMap<String, MerchantContext>,
    intents: HashMap<Uuid, PaymentIntent>,
    charges: Vec<Charge>,
    refunds: Vec<Refund>,
    idempotency: HashMap<(String, String), IdempotencyRecord>,
    outbox: Vec<OutboxEvent>,
    webhooks: Vec<ProviderWebhookEvent>,
    audit: Vec<AuditEntry>,
    jobs: Vec<Job>,
}

impl State {
    fn charge_mut(&mut self, charge_id: Uuid) -> Option<&mut Charge> {
        self.charges.iter_mut().find(|c| c.id == charge_id)
    }

    fn charge_owned_by(&self, merchant_id: &str, charge_id: Uuid) -> Option<&Charge> {
        self.charges.iter().find(|c| {
            c.id == charge_id
                && self
                    .intents
                    .get(&c.payment_intent_id)
                    .is_some_and(|pi| pi.merchant_id == merchant_id)
        })
    }

    fn held_refunds(&self, charge_id: Uuid) -> i64 {
        self.refunds
            .iter()
            .filter(|r| r.charge_id == charge_id && r.status.holds_funds())
            .map(|r| r.amount)
            .sum()
    }

    fn intent_status(&self, intent_id: Uuid) -> Option<PaymentIntentStatus> {
        self.intents.get(&intent_id).map(|pi| pi.status)
    }

    fn set_intent_status(&mut self, intent_id: Uuid, status: PaymentIntentStatus) {
        if let Some(intent) = self.intents.get_mut(&intent_id) {
            intent.status = status;
        }
    }

    fn push_job(&mut self, job: NewJob, now: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.push(Job {
            id,
            queue: job.queue,
            name: job.name,
            payload: job.payload,
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts: job.policy.max_attempts,
            backoff: job.policy.backoff,
            run_at: now,
            last_error: None,
        });
        id
    }

    fn push_event(&mut self, event: NewOutboxEvent, now: DateTime<Utc>) -> OutboxEvent {
        let stored = event.into_pending(now);
        self.outbox.push(stored.clone());
        stored
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.inner.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn snapshot<T>(&self, f: impl FnOnce(&State) -> T) -> T
    where
        T: Default,
    {
        self.inner.lock().map(|s| f(&*s)).unwrap_or_default()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.snapshot(|s| s.audit.clone())
    }

    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.snapshot(|s| s.outbox.clone())
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.snapshot(|s| s.jobs.clone())
    }

    pub fn webhook_events(&self) -> Vec<ProviderWebhookEvent> {
        self.snapshot(|s| s.webhooks.clone())
    }

    pub fn charges(&self) -> Vec<Charge> {
        self.snapshot(|s| s.charges.clone())
    }

    pub fn refunds(&self) -> Vec<Refund> {
        self.snapshot(|s| s.refunds.clone())
    }

    pub fn idempotency_records(&self) -> Vec<IdempotencyRecord> {
        self.snapshot(|s| s.idempotency.values().cloned().collect())
    }

    pub fn expire_job_lease(&self, job_id: Uuid) {
        if let Ok(mut s) = self.inner.lock() {
            if let Some(job) = s.jobs.iter_mut().find(|j| j.id == job_id) {
                job.run_at = Utc::now();
            }
        }
    }

    pub fn make_outbox_due(&self) {
        if let Ok(mut s) = self.inner.lock() {
            let now = Utc::now();
            for event in s.outbox.iter_mut().filter(|e| e.status != OutboxStatus::Processed) {
                event.next_run_at = now;
            }
        }
    }

    pub fn make_jobs_due(&self) {
        if let Ok(mut s) = self.inner.lock() {
            let now = Utc::now();
            for job in s.jobs.iter_mut().filter(|j| j.status == JobStatus::Waiting) {
                job.run_at = now;
            }
        }
    }
}

fn reclaim_expired(job: &mut Job) {
    job.attempts += 1;
    job.last_error = Some(LEASE_EXPIRED.to_string());
    job.status = if job.attempts >= job.max_attempts {
        JobStatus::Dead
    } else {
        JobStatus::Waiting
    };
}

fn lease_end(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

#[async_trait::async_trait]
impl PaymentStore for MemoryStore {
    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent> {
        let stored = PaymentIntent {
            id: Uuid::new_v4(),
            merchant_id: intent.merchant_id,
            amount: intent.amount,
            currency: intent.currency,
            status: PaymentIntentStatus::RequiresConfirmation,
            customer_ref: intent.customer_ref,
            metadata: intent.metadata,
            created_at: Utc::now(),
        };
        self.state()?.intents.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_intent(&self, merchant_id: &str, intent_id: Uuid) -> Result<Option<PaymentIntent>> {
        Ok(self
            .state()?
            .intents
            .get(&intent_id)
            .filter(|pi| pi.merchant_id == merchant_id)
            .cloned())
    }

    async fn list_charges(&self, intent_id: Uuid) -> Result<Vec<Charge>> {
        Ok(self
            .state()?
            .charges
            .iter()
            .rev()
            .filter(|c| c.payment_intent_id == intent_id)
            .cloned()
            .collect())
    }

    async fn latest_charge(&self, intent_id: Uuid) -> Result<Option<Charge>> {
        Ok(self
            .state()?
            .charges
            .iter()
            .rev()
            .find(|c| c.payment_intent_id == intent_id)
            .cloned())
    }

    async fn find_charge_for_merchant(&self, merchant_id: &str, charge_id: Uuid) -> Result<Option<Charge>> {
        Ok(self.state()?.charge_owned_by(merchant_id, charge_id).cloned())
    }

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> Result<bool> {
        let mut s = self.state()?;
        if s.intent_status(intent_id) != Some(from) {
            return Ok(false);
        }
        s.set_intent_status(intent_id, to);
        Ok(true)
    }

    async fn record_authorization(
        &self,
        intent_id: Uuid,
        charge: NewCharge,
        event: NewOutboxEvent,
    ) -> Result<Option<Charge>> {
        let mut s = self.state()?;
        if s.intent_status(intent_id) != Some(PaymentIntentStatus::Processing) {
            return Ok(None);
        }

        let now = Utc::now();
        let stored = Charge {
            id: Uuid::new_v4(),
            payment_intent_id: charge.payment_intent_id,
            provider: charge.provider,
            provider_charge_id: charge.provider_charge_id,
            authorized_amount: charge.authorized_amount,
            captured_amount: 0,
            status: ChargeStatus::Authorized,
            created_at: now,
        };
        s.set_intent_status(intent_id, PaymentIntentStatus::RequiresCapture);
        s.charges.push(stored.clone());
        s.push_event(event, now);
        Ok(Some(stored))
    }

    async fn record_capture(&self, write: CaptureWrite) -> Result<Option<CaptureApplied>> {
        let mut s = self.state()?;
        if s.intent_status(write.intent_id) != Some(PaymentIntentStatus::RequiresCapture) {
            return Ok(None);
        }

        let Some(charge) = s
            .charge_mut(write.charge_id)
            .filter(|c| c.payment_intent_id == write.intent_id)
        else {
            return Ok(None);
        };
        if !charge.status.is_open() || charge.captured_amount + write.amount > charge.authorized_amount {
            return Ok(None);
        }

        charge.captured_amount += write.amount;
        charge.status = if charge.captured_amount >= charge.authorized_amount {
            ChargeStatus::Captured
        } else {
            ChargeStatus::PartiallyCaptured
        };
        let charge = charge.clone();

        let mut intent_status = PaymentIntentStatus::RequiresCapture;
        if write.provider_final || charge.status == ChargeStatus::Captured {
            intent_status = PaymentIntentStatus::Succeeded;
            s.set_intent_status(write.intent_id, intent_status);
        }
        s.push_event(write.event, Utc::now());
        Ok(Some(CaptureApplied { charge, intent_status }))
    }

    async fn record_void(&self, write: VoidWrite) -> Result<Option<Charge>> {
        let mut s = self.state()?;
        if s.intent_status(write.intent_id) != Some(PaymentIntentStatus::RequiresCapture) {
            return Ok(None);
        }

        let Some(charge) = s
            .charge_mut(write.charge_id)
            .filter(|c| c.payment_intent_id == write.intent_id && c.status.is_open())
        else {
            return Ok(None);
        };
        charge.status = ChargeStatus::Voided;
        let charge = charge.clone();

        s.set_intent_status(write.intent_id, PaymentIntentStatus::Canceled);
        s.push_event(write.event, Utc::now());
        Ok(Some(charge))
    }
}

#[async_trait::async_trait]
impl RefundStore for MemoryStore {
    async fn reserve_refund(&self, refund: NewRefund) -> Result<ReserveOutcome> {
        let mut s = self.state()?;
        let captured = s
            .charges
            .iter()
            .find(|c| c.id == refund.charge_id)
            .map(|c| c.captured_amount)
            .ok_or_else(|| anyhow!("charge {} not found", refund.charge_id))?;

        let held = s.held_refunds(refund.charge_id);
        if held + refund.amount > captured {
            return Ok(ReserveOutcome::ExceedsRefundable {
                refundable: (captured - held).max(0),
            });
        }

        let stored = Refund {
            id: Uuid::new_v4(),
            charge_id: refund.charge_id,
            amount: refund.amount,
            reason: refund.reason,
            status: RefundStatus::Pending,
            provider_refund_id: None,
            failure_code: None,
            created_at: Utc::now(),
        };
        s.refunds.push(stored.clone());
        Ok(ReserveOutcome::Reserved(stored))
    }

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        completion: RefundCompletion,
        event: NewOutboxEvent,
    ) -> Result<Refund> {
        let mut s = self.state()?;
        let refund = s
            .refunds
            .iter_mut()
            .find(|r| r.id == refund_id && r.status == RefundStatus::Pending)
            .ok_or_else(|| anyhow!("refund {} is not pending", refund_id))?;

        refund.status = completion.status;
        refund.provider_refund_id = completion.provider_refund_id;
        refund.failure_code = completion.failure_code;
        let refund = refund.clone();

        s.push_event(event, Utc::now());
        Ok(refund)
    }

    async fn find_refund_for_merchant(&self, merchant_id: &str, refund_id: Uuid) -> Result<Option<Refund>> {
        let s = self.state()?;
        Ok(s.refunds
            .iter()
            .find(|r| r.id == refund_id && s.charge_owned_by(merchant_id, r.charge_id).is_some())
            .cloned())
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for MemoryStore {
    async fn find(&self, merchant_id: &str, idempotency_key: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self
            .state()?
            .idempotency
            .get(&(merchant_id.to_string(), idempotency_key.to_string()))
            .cloned())
    }

    async fn create(&self, record: IdempotencyRecord) -> Result<CreateOutcome<IdempotencyRecord>> {
        let mut s = self.state()?;
        let key = (record.merchant_id.clone(), record.idempotency_key.clone());
        if s.idempotency.contains_key(&key) {
            return Ok(CreateOutcome::Duplicate);
        }
        s.idempotency.insert(key, record.clone());
        Ok(CreateOutcome::Created(record))
    }
}

#[async_trait::async_trait]
impl OutboxStore for MemoryStore {
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        Ok(self.state()?.push_event(event, Utc::now()))
    }

    async fn claim_due(&self, limit: usize, lease: Duration, max_attempts: i32) -> Result<Vec<OutboxEvent>> {
        let mut s = self.state()?;
        let now = Utc::now();
        let until = lease_end(now, lease);

        let mut claimed = Vec::new();
        for event in s.outbox.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            let due = event.status != OutboxStatus::Processed && event.next_run_at <= now;
            if due && event.attempts < max_attempts {
                event.next_run_at = until;
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_processed(&self, event_id: Uuid) -> Result<()> {
        let mut s = self.state()?;
        let event = s
            .outbox
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| anyhow!("outbox event {} not found", event_id))?;
        event.status = OutboxStatus::Processed;
        event.last_error = None;
        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, next_run_at: DateTime<Utc>, error: &str) -> Result<()> {
        let mut s = self.state()?;
        let event = s
            .outbox
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| anyhow!("outbox event {} not found", event_id))?;
        event.status = OutboxStatus::Failed;
        event.attempts += 1;
        event.next_run_at = next_run_at;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn find(&self, event_id: Uuid) -> Result<Option<OutboxEvent>> {
        Ok(self.state()?.outbox.iter().find(|e| e.id == event_id).cloned())
    }
}

#[async_trait::async_trait]
impl WebhookEventStore for MemoryStore {
    async fn create_with_job(&self, event: NewWebhookEvent, job: NewJob) -> Result<CreateOutcome<WebhookAccepted>> {
        let mut s = self.state()?;
        let exists = s
            .webhooks
            .iter()
            .any(|w| w.provider == event.provider && w.event_id == event.event_id);
        if exists {
            return Ok(CreateOutcome::Duplicate);
        }

        let now = Utc::now();
        let stored = ProviderWebhookEvent {
            id: event.id,
            provider: event.provider,
            event_id: event.event_id,
            event_type: event.event_type,
            signature_status: event.signature_status,
            payload_hash: event.payload_hash,
            payload: event.payload,
            processing_status: WebhookProcessingStatus::Pending,
            received_at: now,
            processed_at: None,
        };
        s.webhooks.push(stored.clone());
        let job_id = s.push_job(job, now);
        Ok(CreateOutcome::Created(WebhookAccepted { event: stored, job_id }))
    }

    async fn find(&self, event_id: Uuid) -> Result<Option<ProviderWebhookEvent>> {
        Ok(self.state()?.webhooks.iter().find(|w| w.id == event_id).cloned())
    }

    async fn mark_processed(&self, event_id: Uuid) -> Result<bool> {
        let mut s = self.state()?;
        let Some(event) = s
            .webhooks
            .iter_mut()
            .find(|w| w.id == event_id && w.processing_status == WebhookProcessingStatus::Pending)
        else {
            return Ok(false);
        };
        event.processing_status = WebhookProcessingStatus::Processed;
        event.processed_at = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait::async_trait]
impl AuditStore for MemoryStore {
    async fn write(&self, entry: AuditEntry) -> Result<()> {
        self.state()?.audit.push(entry);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MerchantStore for MemoryStore {
    async fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<MerchantContext>> {
        Ok(self.state()?.api_keys.get(key_hash).cloned())
    }

    async fn create_with_api_key(&self, merchant_id: &str, name: &str, key_hash: &str) -> Result<MerchantContext> {
        let mut s = self.state()?;
        s.merchants.insert(merchant_id.to_string(), name.to_string());
        let context = MerchantContext {
            merchant_id: merchant_id.to_string(),
            merchant_name: name.to_string(),
            api_key_id: format!("key_{}", Uuid::new_v4().simple()),
        };
        s.api_keys.insert(key_hash.to_string(), context.clone());
        Ok(context)
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryStore {
    async fn enqueue(&self, job: NewJob) -> Result<Uuid> {
        Ok(self.state()?.push_job(job, Utc::now()))
    }

    async fn reserve(&self, queue: &str, limit: usize, lease: Duration) -> Result<Vec<Job>> {
        let mut s = self.state()?;
        let now = Utc::now();
        let until = lease_end(now, lease);

        for job in s.jobs.iter_mut() {
            if job.queue == queue && job.status == JobStatus::Active && job.run_at <= now {
                reclaim_expired(job);
            }
        }

        let mut reserved = Vec::new();
        for job in s.jobs.iter_mut() {
            if reserved.len() >= limit {
                break;
            }
            if job.queue == queue && job.status == JobStatus::Waiting && job.run_at <= now {
                job.status = JobStatus::Active;
                job.run_at = until;
                reserved.push(job.clone());
            }
        }
        Ok(reserved)
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        let mut s = self.state()?;
        let job = s
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;
        job.status = JobStatus::Completed;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome> {
        let mut s = self.state()?;
        let job = s
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;

        job.attempts += 1;
        job.last_error = Some(error.to_string());
        let outcome = next_failure_outcome(job.attempts, job.max_attempts, &job.backoff, Utc::now());
        match outcome {
            FailOutcome::Retrying { next_run_at } => {
                job.status = JobStatus::Waiting;
                job.run_at = next_run_at;
            }
            FailOutcome::Dead => job.status = JobStatus::Dead,
        }
        Ok(outcome)
    }

    async fn list_dead(&self, queue: &str, limit: usize) -> Result<Vec<Job>> {
        Ok(self
            .state()?
            .jobs
            .iter()
            .filter(|j| j.queue == queue && j.status == JobStatus::Dead)
            .take(limit)
            .cloned()
            .collect())
    }
}
