//! Postgres-backed bill store.
//!
//! Every operation runs in its own transaction at REPEATABLE READ. Writes
//! classify unique-constraint violations on user-controlled columns as
//! [`StoreError::UserInput`] so the activity layer can refuse to retry them.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use billfold_billing::{Bill, BillStatus, Currency, Item, Money};
use billfold_core::{BillId, ItemId, RequestId, UserId};

use crate::error::{StoreError, StoreResult};
use crate::BillStore;

pub struct PgBillStore {
    pool: PgPool,
}

impl PgBillStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_repeatable_read(&self) -> StoreResult<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

fn classify_write(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return StoreError::UserInput(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn decode<T, E: core::fmt::Display>(value: Result<T, E>, what: &str) -> StoreResult<T> {
    value.map_err(|e| StoreError::Decode(format!("{what}: {e}")))
}

#[async_trait]
impl BillStore for PgBillStore {
    async fn add_open_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        let mut tx = self.begin_repeatable_read().await?;

        // Gated upsert: replaying the same request id leaves the row as-is;
        // a new request id may move the status forward and bump updated_at.
        sqlx::query(
            r#"
            INSERT INTO open_bills (id, user_id, currency, status, created_at, updated_at, request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO UPDATE SET
                status = CASE
                    WHEN open_bills.status <> EXCLUDED.status THEN EXCLUDED.status
                    ELSE open_bills.status
                END,
                updated_at = EXCLUDED.updated_at
            WHERE open_bills.request_id IS DISTINCT FROM EXCLUDED.request_id
            "#,
        )
        .bind(bill.bill_id().as_uuid())
        .bind(bill.user_id().as_uuid())
        .bind(bill.currency().as_str())
        .bind(BillStatus::Open.as_str())
        .bind(bill.created_at())
        .bind(Utc::now())
        .bind(request_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(classify_write)?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_closed_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        if request_id.is_nil() {
            return Err(StoreError::InvalidRequest(
                "request id must not be nil".to_string(),
            ));
        }

        let mut tx = self.begin_repeatable_read().await?;
        let now = Utc::now();

        // First writer wins; later requests are resolved by the read-back
        // below so a completed close is never overwritten.
        let res = sqlx::query(
            r#"
            INSERT INTO closed_bills
                (id, user_id, status, total_amount, currency, created_at, updated_at, closed_at, request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(bill.bill_id().as_uuid())
        .bind(bill.user_id().as_uuid())
        .bind(BillStatus::Closed.as_str())
        .bind(bill.total().amount)
        .bind(bill.currency().as_str())
        .bind(bill.created_at())
        .bind(now)
        .bind(now)
        .bind(request_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(classify_write)?;

        if res.rows_affected() == 0 {
            let stored: Uuid =
                sqlx::query_scalar("SELECT request_id FROM closed_bills WHERE id = $1")
                    .bind(bill.bill_id().as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;

            if &stored == request_id.as_uuid() {
                // Retry of a completed close. Commit to settle the
                // transaction and report the idempotent replay.
                tx.commit().await?;
                return Err(StoreError::DuplicateRequest);
            }
            tracing::warn!(bill_id = %bill.bill_id(), "close refused: bill closed under a different request");
            return Err(StoreError::AlreadyClosed);
        }

        for item in bill.items() {
            sqlx::query(
                r#"
                INSERT INTO closed_bill_items
                    (id, bill_id, item_id, description, quantity, unit_price, currency)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (bill_id, item_id)
                DO UPDATE SET
                    description = EXCLUDED.description,
                    quantity = EXCLUDED.quantity,
                    unit_price = EXCLUDED.unit_price,
                    currency = EXCLUDED.currency
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(bill.bill_id().as_uuid())
            .bind(item.id.as_uuid())
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.price_per_unit.amount)
            .bind(item.price_per_unit.currency.as_str())
            .execute(&mut *tx)
            .await
            .map_err(classify_write)?;
        }

        sqlx::query("DELETE FROM open_bills WHERE id = $1")
            .bind(bill.bill_id().as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(bill_id = %bill.bill_id(), "bill persisted as closed");
        Ok(())
    }

    async fn get_open_bill(&self, id: BillId) -> StoreResult<Bill> {
        let mut tx = self.begin_repeatable_read().await?;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, currency, status, created_at, updated_at
            FROM open_bills
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let currency: Currency = decode(row.try_get::<String, _>("currency")?.parse(), "currency")?;
        let status: BillStatus = decode(row.try_get::<String, _>("status")?.parse(), "status")?;

        let bill = Bill::from_parts(
            BillId::from_uuid(row.try_get("id")?),
            UserId::from_uuid(row.try_get("user_id")?),
            Vec::new(),
            Money::zero(currency),
            status,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
            None,
        );

        tx.commit().await?;
        Ok(bill)
    }

    async fn get_closed_bill(&self, id: BillId) -> StoreResult<Bill> {
        let mut tx = self.begin_repeatable_read().await?;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, currency, created_at, updated_at, closed_at
            FROM closed_bills
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let currency: Currency = decode(row.try_get::<String, _>("currency")?.parse(), "currency")?;
        let status: BillStatus = decode(row.try_get::<String, _>("status")?.parse(), "status")?;

        let bill = Bill::from_parts(
            BillId::from_uuid(row.try_get("id")?),
            UserId::from_uuid(row.try_get("user_id")?),
            Vec::new(),
            Money::new(row.try_get("total_amount")?, currency),
            status,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
            row.try_get("closed_at")?,
        );

        tx.commit().await?;
        Ok(bill)
    }

    async fn get_closed_bill_request(&self, id: BillId) -> StoreResult<RequestId> {
        let mut tx = self.begin_repeatable_read().await?;

        let stored: Option<Uuid> =
            sqlx::query_scalar("SELECT request_id FROM closed_bills WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        tx.commit().await?;
        stored.map(RequestId::from_uuid).ok_or(StoreError::NotFound)
    }

    async fn get_closed_bill_items(&self, id: BillId) -> StoreResult<Vec<Item>> {
        let mut tx = self.begin_repeatable_read().await?;

        let rows = sqlx::query(
            r#"
            SELECT item_id, description, quantity, unit_price, currency
            FROM closed_bill_items
            WHERE bill_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let currency: Currency =
                decode(row.try_get::<String, _>("currency")?.parse(), "currency")?;
            items.push(Item {
                id: ItemId::from_uuid(row.try_get("item_id")?),
                quantity: row.try_get("quantity")?,
                description: row.try_get("description")?,
                price_per_unit: Money::new(row.try_get("unit_price")?, currency),
            });
        }

        tx.commit().await?;
        Ok(items)
    }
}
