use crate::queue::{next_failure_outcome, Backoff, FailOutcome, Job, JobQueue, JobStatus, NewJob, LEASE_EXPIRED};
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

const COLUMNS: &str = "id, queue, name, payload, status, attempts, max_attempts, backoff, run_at, last_error";

#[derive(Clone)]
pub struct PgJobQueue {
    pub pool: PgPool,
}

fn job_from_row(r: &PgRow) -> Result<Job> {
    let backoff: serde_json::Value = r.get("backoff");
    Ok(Job {
        id: r.get("id"),
        queue: r.get("queue"),
        name: r.get("name"),
        payload: r.get("payload"),
        status: JobStatus::parse(r.get::<String, _>("status").as_str())?,
        attempts: r.get("attempts"),
        max_attempts: r.get("max_attempts"),
        backoff: serde_json::from_value::<Backoff>(backoff)?,
        run_at: r.get("run_at"),
        last_error: r.get("last_error"),
    })
}

impl PgJobQueue {
    pub async fn insert_tx(tx: &mut Transaction<'_, Postgres>, job: &NewJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, name, payload, status, attempts, max_attempts, backoff, run_at)
            VALUES ($1, $2, $3, $4, 'waiting', 0, $5, $6, now())
            "#,
        )
        .bind(id)
        .bind(&job.queue)
        .bind(&job.name)
        .bind(&job.payload)
        .bind(job.policy.max_attempts)
        .bind(serde_json::to_value(job.policy.backoff)?)
        .execute(tx.as_mut())
        .await?;
        Ok(id)
    }
}

#[async_trait::async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let id = Self::insert_tx(&mut tx, &job).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn reserve(&self, queue: &str, limit: usize, lease: Duration) -> Result<Vec<Job>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'dead' ELSE 'waiting' END,
                updated_at = now()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE queue = $1 AND status = 'active' AND run_at <= now()
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(queue)
        .bind(LEASE_EXPIRED)
        .execute(tx.as_mut())
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            WITH ready AS (
                SELECT id
                FROM jobs
                WHERE queue = $1 AND status = 'waiting' AND run_at <= now()
                ORDER BY run_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs j
            SET status = 'active', run_at = now() + make_interval(secs => $3), updated_at = now()
            FROM ready
            WHERE j.id = ready.id
            RETURNING {}
            "#,
            crate::repo::outbox_repo::prefixed("j", COLUMNS)
        ))
        .bind(queue)
        .bind(limit as i64)
        .bind(lease.as_secs_f64())
        .fetch_all(tx.as_mut())
        .await?;
        tx.commit().await?;

        rows.iter().map(job_from_row).collect()
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'completed', updated_at = now() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<FailOutcome> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE"))
            .bind(job_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;
        let job = job_from_row(&row)?;

        let attempts = job.attempts + 1;
        let outcome = next_failure_outcome(attempts, job.max_attempts, &job.backoff, Utc::now());
        match outcome {
            FailOutcome::Retrying { next_run_at } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'waiting', attempts = $2, run_at = $3, last_error = $4, updated_at = now() WHERE id = $1",
                )
                .bind(job_id)
                .bind(attempts)
                .bind(next_run_at)
                .bind(error)
                .execute(tx.as_mut())
                .await?;
            }
            FailOutcome::Dead => {
                sqlx::query(
                    "UPDATE jobs SET status = 'dead', attempts = $2, last_error = $3, updated_at = now() WHERE id = $1",
                )
                .bind(job_id)
                .bind(attempts)
                .bind(error)
                .execute(tx.as_mut())
                .await?;
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_dead(&self, queue: &str, limit: usize) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM jobs WHERE queue = $1 AND status = 'dead' ORDER BY updated_at DESC LIMIT $2"
        ))
        .bind(queue)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }
}
