use crate::domain::outbox::{NewOutboxEvent, OutboxEvent, OutboxStatus};
use crate::repo::OutboxStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

const COLUMNS: &str =
    "id, event_type, aggregate_type, aggregate_id, payload, status, attempts, next_run_at, last_error, created_at";

#[derive(Clone)]
pub struct OutboxRepo {
    pub pool: PgPool,
}

pub(crate) fn event_from_row(r: &PgRow) -> Result<OutboxEvent> {
    Ok(OutboxEvent {
        id: r.get("id"),
        event_type: r.get("event_type"),
        aggregate_type: r.get("aggregate_type"),
        aggregate_id: r.get("aggregate_id"),
        payload: r.get("payload"),
        status: OutboxStatus::parse(r.get::<String, _>("status").as_str())?,
        attempts: r.get("attempts"),
        next_run_at: r.get("next_run_at"),
        last_error: r.get("last_error"),
        created_at: r.get("created_at"),
    })
}

impl OutboxRepo {
    pub async fn insert_tx(tx: &mut Transaction<'_, Postgres>, event: &NewOutboxEvent) -> Result<OutboxEvent> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO outbox_events (id, event_type, aggregate_type, aggregate_id, payload, status, attempts, next_run_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, now())
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.payload)
        .fetch_one(tx.as_mut())
        .await?;

        event_from_row(&row)
    }
}

#[async_trait::async_trait]
impl OutboxStore for OutboxRepo {
    async fn enqueue(&self, event: NewOutboxEvent) -> Result<OutboxEvent> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::insert_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn claim_due(&self, limit: usize, lease: Duration, max_attempts: i32) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            WITH due AS (
                SELECT id
                FROM outbox_events
                WHERE status IN ('pending', 'failed') AND next_run_at <= now() AND attempts < $2
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_events o
            SET next_run_at = now() + make_interval(secs => $3), updated_at = now()
            FROM due
            WHERE o.id = due.id
            RETURNING {}
            "#,
            prefixed("o", COLUMNS)
        ))
        .bind(limit as i64)
        .bind(max_attempts)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut events = rows.iter().map(event_from_row).collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn mark_processed(&self, event_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET status = 'processed', last_error = NULL, updated_at = now() WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, next_run_at: DateTime<Utc>, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'failed', attempts = attempts + 1, next_run_at = $2, last_error = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(next_run_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, event_id: Uuid) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM outbox_events WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }
}

/// `"a, b"` -> `"o.a, o.b"` for RETURNING clauses over aliased tables.
pub(crate) fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
