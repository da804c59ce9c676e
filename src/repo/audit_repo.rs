use crate::domain::audit::AuditEntry;
use crate::repo::AuditStore;
use anyhow::Result;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuditRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl AuditStore for AuditRepo {
    async fn write(&self, entry: AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (merchant_id, actor_type, actor_id, action, entity_type, entity_id, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.merchant_id)
        .bind(entry.actor_type.as_str())
        .bind(&entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
