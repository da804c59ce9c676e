use crate::domain::audit::AuditEntry;
use crate::queue::{names, FailOutcome, Job, JobQueue};
use crate::repo::{AuditStore, WebhookEventStore};
use crate::service::payment_service::audit_best_effort;
use anyhow::{anyhow, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookRetryWorker {
    pub queue: Arc<dyn JobQueue>,
    pub events: Arc<dyn WebhookEventStore>,
    pub audit: Arc<dyn AuditStore>,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub lease: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub completed: usize,
    pub retrying: usize,
    pub dead: usize,
}

fn webhook_event_id(job: &Job) -> Result<Uuid> {
    let raw = job
        .payload
        .get("webhook_event_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("job {} has no webhook_event_id", job.id))?;
    Ok(Uuid::parse_str(raw)?)
}

impl WebhookRetryWorker {
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("webhook retry worker started");
        loop {
            match self.tick().await {
                Ok(summary) if summary == TickSummary::default() => {}
                Ok(summary) => tracing::debug!(?summary, "webhook batch done"),
                Err(err) => tracing::error!("webhook worker error: {}", err),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("webhook retry worker stopped");
    }

    pub async fn tick(&self) -> Result<TickSummary> {
        let jobs = self
            .queue
            .reserve(names::WEBHOOK_RETRY, self.batch_size, self.lease)
            .await?;

        let mut summary = TickSummary::default();
        for job in jobs {
            match self.process(&job).await {
                Ok(()) => match self.queue.complete(job.id).await {
                    Ok(()) => summary.completed += 1,
                    // The lease expires and the job is delivered again.
                    Err(e) => tracing::warn!(job_id = %job.id, "could not complete webhook job: {}", e),
                },
                Err(e) => {
                    tracing::warn!(job_id = %job.id, attempts = job.attempts + 1, "webhook job failed: {}", e);
                    match self.queue.fail(job.id, &e.to_string()).await {
                        Ok(FailOutcome::Retrying { next_run_at }) => {
                            tracing::debug!(job_id = %job.id, %next_run_at, "webhook job rescheduled");
                            summary.retrying += 1;
                        }
                        Ok(FailOutcome::Dead) => {
                            self.dead_letter(&job, &e.to_string()).await;
                            summary.dead += 1;
                        }
                        Err(fail_err) => {
                            tracing::error!(job_id = %job.id, "could not record webhook job failure: {}", fail_err)
                        }
                    }
                }
            }
        }
        Ok(summary)
    }

    async fn process(&self, job: &Job) -> Result<()> {
        let event_id = webhook_event_id(job)?;
        let event = self
            .events
            .find(event_id)
            .await?
            .ok_or_else(|| anyhow!("webhook event {} not found", event_id))?;

        if !self.events.mark_processed(event.id).await? {
            tracing::debug!(webhook_event_id = %event.id, "webhook event already processed");
        }
        Ok(())
    }

    async fn dead_letter(&self, job: &Job, error: &str) {
        tracing::error!(job_id = %job.id, error, "webhook job exhausted its retries");
        let entity_id = webhook_event_id(job)
            .map(|id| id.to_string())
            .unwrap_or_else(|_| job.id.to_string());
        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::system(
                "webhook.dead_lettered",
                "provider_webhook_event",
                entity_id,
                json!({"job_id": job.id, "attempts": job.attempts + 1, "error": error}),
            ),
        )
        .await;
    }
}
