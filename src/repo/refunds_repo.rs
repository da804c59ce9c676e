use crate::domain::outbox::NewOutboxEvent;
use crate::domain::refund::{NewRefund, Refund, RefundCompletion, RefundStatus};
use crate::repo::outbox_repo::{prefixed, OutboxRepo};
use crate::repo::{RefundStore, ReserveOutcome};
use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const COLUMNS: &str = "id, charge_id, amount, reason, status, provider_refund_id, failure_code, created_at";

#[derive(Clone)]
pub struct RefundsRepo {
    pub pool: PgPool,
}

fn refund_from_row(r: &PgRow) -> Result<Refund> {
    Ok(Refund {
        id: r.get("id"),
        charge_id: r.get("charge_id"),
        amount: r.get("amount"),
        reason: r.get("reason"),
        status: RefundStatus::parse(r.get::<String, _>("status").as_str())?,
        provider_refund_id: r.get("provider_refund_id"),
        failure_code: r.get("failure_code"),
        created_at: r.get("created_at"),
    })
}

impl RefundsRepo {
    async fn held_total_tx(tx: &mut Transaction<'_, Postgres>, charge_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT AS total
            FROM refunds
            WHERE charge_id = $1 AND status IN ('pending', 'succeeded')
            "#,
        )
        .bind(charge_id)
        .fetch_one(tx.as_mut())
        .await?;
        Ok(row.get("total"))
    }
}

#[async_trait::async_trait]
impl RefundStore for RefundsRepo {
    async fn reserve_refund(&self, refund: NewRefund) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        // The charge row lock serialises concurrent reservations.
        let charge = sqlx::query("SELECT captured_amount FROM charges WHERE id = $1 FOR UPDATE")
            .bind(refund.charge_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or_else(|| anyhow!("charge {} not found", refund.charge_id))?;
        let captured: i64 = charge.get("captured_amount");

        let held = Self::held_total_tx(&mut tx, refund.charge_id).await?;
        if held + refund.amount > captured {
            tx.rollback().await?;
            return Ok(ReserveOutcome::ExceedsRefundable {
                refundable: (captured - held).max(0),
            });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO refunds (id, charge_id, amount, reason, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(refund.charge_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .fetch_one(tx.as_mut())
        .await?;
        let stored = refund_from_row(&row)?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(stored))
    }

    async fn complete_refund(
        &self,
        refund_id: Uuid,
        completion: RefundCompletion,
        event: NewOutboxEvent,
    ) -> Result<Refund> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE refunds
            SET status = $2, provider_refund_id = $3, failure_code = $4, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(refund_id)
        .bind(completion.status.as_str())
        .bind(&completion.provider_refund_id)
        .bind(&completion.failure_code)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(anyhow!("refund {} is not pending", refund_id));
        };
        let refund = refund_from_row(&row)?;

        OutboxRepo::insert_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(refund)
    }

    async fn find_refund_for_merchant(&self, merchant_id: &str, refund_id: Uuid) -> Result<Option<Refund>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM refunds r
            JOIN charges c ON c.id = r.charge_id
            JOIN payment_intents pi ON pi.id = c.payment_intent_id
            WHERE r.id = $1 AND pi.merchant_id = $2
            "#,
            prefixed("r", COLUMNS)
        ))
        .bind(refund_id)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(refund_from_row).transpose()
    }
}
