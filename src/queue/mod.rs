//! Durable job queue. An expired lease counts as a failed attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub mod pg_queue;

pub const LEASE_EXPIRED: &str = "lease expired";

pub mod names {
    pub const WEBHOOK_RETRY: &str = "webhook-retry";
    pub const PROCESS_WEBHOOK_EVENT: &str = "process-webhook-event";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Delay before the next try after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: i32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let exp = attempt.saturating_sub(1).clamp(0, 32) as u32;
                let delay = base_ms.saturating_mul(2_u64.saturating_pow(exp));
                Duration::from_millis(delay.min(max_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn webhook_default() -> Self {
        Self::exponential(5, 5000)
    }

    pub fn exponential(max_attempts: i32, base_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base_ms,
                max_ms: base_ms.saturating_mul(64),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "waiting" => Ok(JobStatus::Waiting),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "dead" => Ok(JobStatus::Dead),
            other => Err(anyhow::anyhow!("unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff: Backoff,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { next_run_at: DateTime<Utc> },
    Dead,
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: NewJob) -> anyhow::Result<Uuid>;

    async fn reserve(&self, queue: &str, limit: usize, lease: Duration) -> anyhow::Result<Vec<Job>>;

    async fn complete(&self, job_id: Uuid) -> anyhow::Result<()>;

    async fn fail(&self, job_id: Uuid, error: &str) -> anyhow::Result<FailOutcome>;

    async fn list_dead(&self, queue: &str, limit: usize) -> anyhow::Result<Vec<Job>>;
}

pub fn next_failure_outcome(
    attempts_after_failure: i32,
    max_attempts: i32,
    backoff: &Backoff,
    now: DateTime<Utc>,
) -> FailOutcome {
    if attempts_after_failure >= max_attempts {
        return FailOutcome::Dead;
    }
    let delay = backoff.delay_for(attempts_after_failure);
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(3600));
    FailOutcome::Retrying {
        next_run_at: now + delay,
    }
}
