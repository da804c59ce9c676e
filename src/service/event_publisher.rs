use crate::domain::outbox::OutboxEvent;
use anyhow::Result;

#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OutboxEvent) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisStreamPublisher {
    pub redis_client: redis::Client,
    pub stream_key: String,
}

#[async_trait::async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&event.payload)?;
        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(1_000_000)
            .arg("*")
            .arg("event_id")
            .arg(event.id.to_string())
            .arg("event_type")
            .arg(&event.event_type)
            .arg("aggregate_type")
            .arg(&event.aggregate_type)
            .arg("aggregate_id")
            .arg(&event.aggregate_id)
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct LogPublisher;

#[async_trait::async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        tracing::info!(
            outbox_event_id = %event.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "outbox event published"
        );
        Ok(())
    }
}
