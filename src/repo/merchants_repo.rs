use crate::domain::merchant::MerchantContext;
use crate::repo::MerchantStore;
use anyhow::Result;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct MerchantsRepo {
    pub pool: PgPool,
}

#[async_trait::async_trait]
impl MerchantStore for MerchantsRepo {
    async fn find_by_api_key_hash(&self, key_hash: &str) -> Result<Option<MerchantContext>> {
        let row = sqlx::query(
            r#"
            SELECT k.id AS api_key_id, m.id AS merchant_id, m.name AS merchant_name
            FROM api_keys k
            JOIN merchants m ON m.id = k.merchant_id
            WHERE k.key_hash = $1 AND k.active
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| MerchantContext {
            merchant_id: r.get("merchant_id"),
            merchant_name: r.get("merchant_name"),
            api_key_id: r.get("api_key_id"),
        }))
    }

    async fn create_with_api_key(&self, merchant_id: &str, name: &str, key_hash: &str) -> Result<MerchantContext> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO merchants (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name")
            .bind(merchant_id)
            .bind(name)
            .execute(tx.as_mut())
            .await?;

        let api_key_id = format!("key_{}", uuid::Uuid::new_v4().simple());
        sqlx::query("INSERT INTO api_keys (id, merchant_id, key_hash, active) VALUES ($1, $2, $3, true)")
            .bind(&api_key_id)
            .bind(merchant_id)
            .bind(key_hash)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;

        Ok(MerchantContext {
            merchant_id: merchant_id.to_string(),
            merchant_name: name.to_string(),
            api_key_id,
        })
    }
}
