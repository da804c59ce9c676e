use crate::queue::Backoff;
use crate::repo::OutboxStore;
use crate::service::event_publisher::EventPublisher;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct OutboxRelay {
    pub outbox: Arc<dyn OutboxStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub lease: Duration,
    pub backoff: Backoff,
    pub max_attempts: i32,
}

impl OutboxRelay {
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("outbox relay started");
        loop {
            match self.tick().await {
                Ok(0) => {}
                Ok(processed) => tracing::debug!(processed, "outbox batch done"),
                Err(err) => tracing::error!("outbox relay error: {}", err),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("outbox relay stopped");
    }

    pub async fn tick(&self) -> Result<usize> {
        let batch = self
            .outbox
            .claim_due(self.batch_size, self.lease, self.max_attempts)
            .await?;

        let mut processed = 0;
        for event in batch {
            let delivered = match self.publisher.publish(&event).await {
                Ok(()) => self.outbox.mark_processed(event.id).await,
                Err(e) => Err(e),
            };

            match delivered {
                Ok(()) => processed += 1,
                Err(e) => {
                    let attempts = event.attempts + 1;
                    let delay = chrono::Duration::from_std(self.backoff.delay_for(attempts))
                        .unwrap_or_else(|_| chrono::Duration::seconds(300));
                    let next_run_at = Utc::now() + delay;
                    tracing::warn!(
                        outbox_event_id = %event.id,
                        attempts,
                        "outbox delivery failed: {}",
                        e
                    );
                    if let Err(mark_err) = self.outbox.mark_failed(event.id, next_run_at, &e.to_string()).await {
                        tracing::error!(outbox_event_id = %event.id, "could not reschedule outbox event: {}", mark_err);
                    }
                }
            }
        }

        Ok(processed)
    }
}
