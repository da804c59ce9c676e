use crate::domain::audit::AuditEntry;
use crate::domain::webhook::{IngestOutcome, NewWebhookEvent, SignatureStatus};
use crate::error::{AppError, AppResult};
use crate::hashing::sha256_hex;
use crate::providers::{ParseWebhookInput, ProviderRegistry};
use crate::queue::{names, NewJob, RetryPolicy};
use crate::repo::{AuditStore, CreateOutcome, WebhookAccepted, WebhookEventStore};
use crate::service::payment_service::audit_best_effort;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookService {
    pub providers: ProviderRegistry,
    pub events: Arc<dyn WebhookEventStore>,
    pub audit: Arc<dyn AuditStore>,
    pub default_secret: String,
    pub provider_secrets: HashMap<String, String>,
    pub retry_policy: RetryPolicy,
}

impl WebhookService {
    fn secret_for(&self, provider: &str) -> &str {
        self.provider_secrets
            .get(provider)
            .map(String::as_str)
            .unwrap_or(&self.default_secret)
    }

    pub async fn ingest(
        &self,
        provider_name: &str,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> AppResult<IngestOutcome> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation("missing webhook signature"))?;

        let provider = self.providers.get(provider_name)?;
        let parsed = provider
            .parse_webhook(ParseWebhookInput {
                body: raw_payload,
                signature,
                secret: self.secret_for(provider_name),
            })
            .map_err(|e| {
                tracing::warn!(provider = provider_name, error = %e, "webhook rejected");
                AppError::from(e)
            })?;

        let id = Uuid::new_v4();
        let created = self
            .events
            .create_with_job(
                NewWebhookEvent {
                    id,
                    provider: provider.name().to_string(),
                    event_id: parsed.event_id.clone(),
                    event_type: parsed.event_type.clone(),
                    signature_status: SignatureStatus::Valid,
                    payload_hash: sha256_hex(raw_payload),
                    payload: parsed.payload,
                },
                NewJob {
                    queue: names::WEBHOOK_RETRY.to_string(),
                    name: names::PROCESS_WEBHOOK_EVENT.to_string(),
                    payload: json!({"webhook_event_id": id}),
                    policy: self.retry_policy,
                },
            )
            .await?;

        let WebhookAccepted { event, job_id } = match created {
            CreateOutcome::Created(accepted) => accepted,
            CreateOutcome::Duplicate => {
                tracing::info!(provider = provider_name, event_id = %parsed.event_id, "duplicate webhook delivery");
                return Ok(IngestOutcome {
                    accepted: true,
                    duplicate: true,
                });
            }
        };

        audit_best_effort(
            self.audit.as_ref(),
            AuditEntry::system(
                "webhook.received",
                "provider_webhook_event",
                event.id,
                json!({
                    "provider": event.provider,
                    "event_id": event.event_id,
                    "event_type": event.event_type,
                    "job_id": job_id,
                }),
            ),
        )
        .await;

        tracing::info!(webhook_event_id = %event.id, %job_id, "webhook accepted");
        Ok(IngestOutcome {
            accepted: true,
            duplicate: false,
        })
    }
}
