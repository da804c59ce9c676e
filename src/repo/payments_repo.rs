use crate::domain::outbox::NewOutboxEvent;
use crate::domain::payment::{Charge, ChargeStatus, NewCharge, NewPaymentIntent, PaymentIntent, PaymentIntentStatus};
use crate::repo::outbox_repo::{prefixed, OutboxRepo};
use crate::repo::{CaptureApplied, CaptureWrite, PaymentStore, VoidWrite};
use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const INTENT_COLUMNS: &str = "id, merchant_id, amount, currency, status, customer_ref, metadata, created_at";
const CHARGE_COLUMNS: &str =
    "id, payment_intent_id, provider, provider_charge_id, authorized_amount, captured_amount, status, created_at";

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

fn intent_from_row(r: &PgRow) -> Result<PaymentIntent> {
    let metadata: Option<serde_json::Value> = r.get("metadata");
    Ok(PaymentIntent {
        id: r.get("id"),
        merchant_id: r.get("merchant_id"),
        amount: r.get("amount"),
        currency: r.get("currency"),
        status: PaymentIntentStatus::parse(r.get::<String, _>("status").as_str())?,
        customer_ref: r.get("customer_ref"),
        metadata: metadata.and_then(|v| match v {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }),
        created_at: r.get("created_at"),
    })
}

pub(crate) fn charge_from_row(r: &PgRow) -> Result<Charge> {
    Ok(Charge {
        id: r.get("id"),
        payment_intent_id: r.get("payment_intent_id"),
        provider: r.get("provider"),
        provider_charge_id: r.get("provider_charge_id"),
        authorized_amount: r.get("authorized_amount"),
        captured_amount: r.get("captured_amount"),
        status: ChargeStatus::parse(r.get::<String, _>("status").as_str())?,
        created_at: r.get("created_at"),
    })
}

impl PaymentsRepo {
    async fn transition_intent_tx(
        tx: &mut Transaction<'_, Postgres>,
        intent_id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE payment_intents SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(intent_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(tx.as_mut())
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn lock_intent_status_tx(
        tx: &mut Transaction<'_, Postgres>,
        intent_id: Uuid,
    ) -> Result<Option<PaymentIntentStatus>> {
        let row = sqlx::query("SELECT status FROM payment_intents WHERE id = $1 FOR UPDATE")
            .bind(intent_id)
            .fetch_optional(tx.as_mut())
            .await?;
        row.map(|r| PaymentIntentStatus::parse(r.get::<String, _>("status").as_str()))
            .transpose()
    }
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_intents (id, merchant_id, amount, currency, status, customer_ref, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&intent.merchant_id)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(PaymentIntentStatus::RequiresConfirmation.as_str())
        .bind(&intent.customer_ref)
        .bind(intent.metadata.map(serde_json::Value::Object))
        .fetch_one(&self.pool)
        .await?;

        intent_from_row(&row)
    }

    async fn find_intent(&self, merchant_id: &str, intent_id: Uuid) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = $1 AND merchant_id = $2"
        ))
        .bind(intent_id)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(intent_from_row).transpose()
    }

    async fn list_charges(&self, intent_id: Uuid) -> Result<Vec<Charge>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHARGE_COLUMNS} FROM charges WHERE payment_intent_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(intent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(charge_from_row).collect()
    }

    async fn latest_charge(&self, intent_id: Uuid) -> Result<Option<Charge>> {
        let row = sqlx::query(&format!(
            "SELECT {CHARGE_COLUMNS} FROM charges WHERE payment_intent_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(charge_from_row).transpose()
    }

    async fn find_charge_for_merchant(&self, merchant_id: &str, charge_id: Uuid) -> Result<Option<Charge>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM charges c
            JOIN payment_intents pi ON pi.id = c.payment_intent_id
            WHERE c.id = $1 AND pi.merchant_id = $2
            "#,
            prefixed("c", CHARGE_COLUMNS)
        ))
        .bind(charge_id)
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(charge_from_row).transpose()
    }

    async fn transition_intent(
        &self,
        intent_id: Uuid,
        from: PaymentIntentStatus,
        to: PaymentIntentStatus,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let moved = Self::transition_intent_tx(&mut tx, intent_id, from, to).await?;
        tx.commit().await?;
        Ok(moved)
    }

    async fn record_authorization(
        &self,
        intent_id: Uuid,
        charge: NewCharge,
        event: NewOutboxEvent,
    ) -> Result<Option<Charge>> {
        let mut tx = self.pool.begin().await?;
        let moved = Self::transition_intent_tx(
            &mut tx,
            intent_id,
            PaymentIntentStatus::Processing,
            PaymentIntentStatus::RequiresCapture,
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO charges (id, payment_intent_id, provider, provider_charge_id, authorized_amount, captured_amount, status)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING {CHARGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(charge.payment_intent_id)
        .bind(&charge.provider)
        .bind(&charge.provider_charge_id)
        .bind(charge.authorized_amount)
        .bind(ChargeStatus::Authorized.as_str())
        .fetch_one(tx.as_mut())
        .await?;
        let stored = charge_from_row(&row)?;

        OutboxRepo::insert_tx(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(Some(stored))
    }

    async fn record_capture(&self, write: CaptureWrite) -> Result<Option<CaptureApplied>> {
        let mut tx = self.pool.begin().await?;
        let intent_status = Self::lock_intent_status_tx(&mut tx, write.intent_id).await?;
        if intent_status != Some(PaymentIntentStatus::RequiresCapture) {
            tx.rollback().await?;
            return Ok(None);
        }

        // Guarded increment: the row only changes while the new total fits
        // inside the authorization.
        let row = sqlx::query(&format!(
            r#"
            UPDATE charges
            SET captured_amount = captured_amount + $3,
                status = CASE WHEN captured_amount + $3 >= authorized_amount THEN 'captured' ELSE 'partially_captured' END,
                updated_at = now()
            WHERE id = $1
              AND payment_intent_id = $2
              AND status IN ('authorized', 'partially_captured')
              AND captured_amount + $3 <= authorized_amount
            RETURNING {CHARGE_COLUMNS}
            "#
        ))
        .bind(write.charge_id)
        .bind(write.intent_id)
        .bind(write.amount)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let charge = charge_from_row(&row)?;

        let mut intent_status = PaymentIntentStatus::RequiresCapture;
        if write.provider_final || charge.status == ChargeStatus::Captured {
            Self::transition_intent_tx(
                &mut tx,
                write.intent_id,
                PaymentIntentStatus::RequiresCapture,
                PaymentIntentStatus::Succeeded,
            )
            .await?;
            intent_status = PaymentIntentStatus::Succeeded;
        }

        OutboxRepo::insert_tx(&mut tx, &write.event).await?;
        tx.commit().await?;
        Ok(Some(CaptureApplied { charge, intent_status }))
    }

    async fn record_void(&self, write: VoidWrite) -> Result<Option<Charge>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE charges
            SET status = 'voided', updated_at = now()
            WHERE id = $1 AND payment_intent_id = $2 AND status IN ('authorized', 'partially_captured')
            RETURNING {CHARGE_COLUMNS}
            "#
        ))
        .bind(write.charge_id)
        .bind(write.intent_id)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let charge = charge_from_row(&row)?;

        let moved = Self::transition_intent_tx(
            &mut tx,
            write.intent_id,
            PaymentIntentStatus::RequiresCapture,
            PaymentIntentStatus::Canceled,
        )
        .await?;
        if !moved {
            tx.rollback().await?;
            return Ok(None);
        }

        OutboxRepo::insert_tx(&mut tx, &write.event).await?;
        tx.commit().await?;
        Ok(Some(charge))
    }
}
