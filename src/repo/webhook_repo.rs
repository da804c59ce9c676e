use crate::domain::webhook::{NewWebhookEvent, ProviderWebhookEvent, SignatureStatus, WebhookProcessingStatus};
use crate::queue::pg_queue::PgJobQueue;
use crate::queue::NewJob;
use crate::repo::{CreateOutcome, WebhookAccepted, WebhookEventStore};
use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, provider, event_id, event_type, signature_status, payload_hash, payload, processing_status, received_at, processed_at";

#[derive(Clone)]
pub struct WebhookRepo {
    pub pool: PgPool,
}

fn event_from_row(r: &PgRow) -> Result<ProviderWebhookEvent> {
    Ok(ProviderWebhookEvent {
        id: r.get("id"),
        provider: r.get("provider"),
        event_id: r.get("event_id"),
        event_type: r.get("event_type"),
        signature_status: SignatureStatus::parse(r.get::<String, _>("signature_status").as_str())?,
        payload_hash: r.get("payload_hash"),
        payload: r.get("payload"),
        processing_status: WebhookProcessingStatus::parse(r.get::<String, _>("processing_status").as_str())?,
        received_at: r.get("received_at"),
        processed_at: r.get("processed_at"),
    })
}

#[async_trait::async_trait]
impl WebhookEventStore for WebhookRepo {
    async fn create_with_job(&self, event: NewWebhookEvent, job: NewJob) -> Result<CreateOutcome<WebhookAccepted>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO provider_webhook_events
                (id, provider, event_id, event_type, signature_status, payload_hash, payload, processing_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            ON CONFLICT (provider, event_id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(event.id)
        .bind(&event.provider)
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(event.signature_status.as_str())
        .bind(&event.payload_hash)
        .bind(&event.payload)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(CreateOutcome::Duplicate);
        };
        let stored = event_from_row(&row)?;
        let job_id = PgJobQueue::insert_tx(&mut tx, &job).await?;
        tx.commit().await?;

        Ok(CreateOutcome::Created(WebhookAccepted { event: stored, job_id }))
    }

    async fn find(&self, event_id: Uuid) -> Result<Option<ProviderWebhookEvent>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM provider_webhook_events WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn mark_processed(&self, event_id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE provider_webhook_events
            SET processing_status = 'processed', processed_at = now()
            WHERE id = $1 AND processing_status = 'pending'
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}
