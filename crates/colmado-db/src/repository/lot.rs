//! # Lot Repository
//!
//! Storage for FIFO inventory lots.
//!
//! ## Concurrency Model
//! The FIFO walk is planned in memory from a snapshot, then each decrement
//! is applied as a compare-and-swap UPDATE guarded on the remaining
//! quantity seen at planning time. Zero affected rows means another writer
//! got there first; the caller re-reads and re-plans.
//!
//! Reads that feed a write in the same transaction use the `_tx` variants
//! so they run on the transaction's connection instead of borrowing a
//! second one from the pool.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use colmado_core::{InventoryLot, LotStatus};

use crate::error::{DbError, DbResult};

/// Repository for inventory lot reads.
#[derive(Debug, Clone)]
pub struct LotRepository {
    pool: SqlitePool,
}

impl LotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LotRepository { pool }
    }

    /// Fetches a lot by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<InventoryLot> {
        let mut conn = self.pool.acquire().await?;
        Self::get_tx(&mut conn, id).await
    }

    /// Active lots of a product in FIFO order.
    pub async fn fifo_lots(&self, product_id: &str) -> DbResult<Vec<InventoryLot>> {
        let mut conn = self.pool.acquire().await?;
        Self::fifo_lots_tx(&mut conn, product_id).await
    }

    /// All lots of a product regardless of status, FIFO order.
    pub async fn lots_for_product(&self, product_id: &str) -> DbResult<Vec<InventoryLot>> {
        let lots = sqlx::query_as::<_, InventoryLot>(
            r#"
            SELECT * FROM inventory_lots
            WHERE product_id = ?1
            ORDER BY purchase_date ASC, rowid ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lots)
    }

    /// Total remaining quantity of a product across active lots.
    pub async fn on_hand(&self, product_id: &str) -> DbResult<i64> {
        let qty: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(remaining_qty), 0) FROM inventory_lots
            WHERE product_id = ?1 AND status = 'active'
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(qty)
    }

    /// Inventory value (remaining quantity at tax-exclusive cost) across
    /// all active lots, in centavos.
    pub async fn inventory_value(&self) -> DbResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(remaining_qty * unit_cost_cents), 0)
            FROM inventory_lots
            WHERE status = 'active'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    /// Active lots whose expiration date falls on or before the given date.
    pub async fn expiring_on_or_before(&self, date: NaiveDate) -> DbResult<Vec<InventoryLot>> {
        let lots = sqlx::query_as::<_, InventoryLot>(
            r#"
            SELECT * FROM inventory_lots
            WHERE status = 'active'
              AND expiration_date IS NOT NULL
              AND expiration_date <= ?1
            ORDER BY expiration_date ASC
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(lots)
    }

    // =========================================================================
    // Transaction-scoped reads
    // =========================================================================

    /// Fetches a lot by id on the given connection.
    pub async fn get_tx(conn: &mut SqliteConnection, id: &str) -> DbResult<InventoryLot> {
        let lot = sqlx::query_as::<_, InventoryLot>(
            "SELECT * FROM inventory_lots WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("inventory_lot", id))?;

        Ok(lot)
    }

    /// Active lots of a product in FIFO order: oldest purchase date first,
    /// insertion order (rowid) breaking ties.
    pub async fn fifo_lots_tx(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<InventoryLot>> {
        let lots = sqlx::query_as::<_, InventoryLot>(
            r#"
            SELECT * FROM inventory_lots
            WHERE product_id = ?1 AND status = 'active' AND remaining_qty > 0
            ORDER BY purchase_date ASC, rowid ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(conn)
        .await?;

        Ok(lots)
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Inserts a new lot.
    pub async fn insert(conn: &mut SqliteConnection, lot: &InventoryLot) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_lots (
                id, product_id, purchase_date, original_qty, remaining_qty,
                unit_cost_cents, unit_cost_with_tax_cents, tax_rate_bps,
                expiration_date, lot_number, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&lot.id)
        .bind(&lot.product_id)
        .bind(lot.purchase_date)
        .bind(lot.original_qty)
        .bind(lot.remaining_qty)
        .bind(lot.unit_cost_cents)
        .bind(lot.unit_cost_with_tax_cents)
        .bind(lot.tax_rate_bps)
        .bind(lot.expiration_date)
        .bind(&lot.lot_number)
        .bind(lot.status)
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(conn)
        .await?;

        debug!(lot_id = %lot.id, product_id = %lot.product_id, "Lot inserted");
        Ok(())
    }

    /// Applies a quantity delta to a lot, guarded on the remaining quantity
    /// the caller planned against.
    ///
    /// `delta` is negative for consumption, positive for restock. The
    /// UPDATE refuses to move remaining outside `[0, original_qty]`, and
    /// flips status between active/depleted as the new remaining dictates.
    ///
    /// A guard miss is classified by re-reading the lot on the same
    /// connection: when the remaining quantity no longer matches the
    /// caller's read, the miss is a [`DbError::ConcurrentModification`]
    /// and a retry from a fresh read can succeed; when it still matches,
    /// the delta itself breaches the bounds and the miss surfaces as
    /// [`colmado_core::CoreError::InsufficientLotQuantity`], which no
    /// retry can fix.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        lot_id: &str,
        delta: i64,
        expected_remaining: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_lots
            SET remaining_qty = remaining_qty + ?2,
                status = CASE WHEN remaining_qty + ?2 = 0 THEN 'depleted' ELSE 'active' END,
                updated_at = ?4
            WHERE id = ?1
              AND remaining_qty = ?3
              AND remaining_qty + ?2 >= 0
              AND remaining_qty + ?2 <= original_qty
              AND status IN ('active', 'depleted')
            "#,
        )
        .bind(lot_id)
        .bind(delta)
        .bind(expected_remaining)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            debug!(lot_id, delta, expected_remaining, "Lot delta guard missed");
            let lot = Self::get_tx(conn, lot_id).await?;
            if lot.remaining_qty == expected_remaining
                && matches!(lot.status, LotStatus::Active | LotStatus::Depleted)
            {
                // Guard matched the caller's read; the delta is what the
                // bounds refused.
                let available = if delta < 0 {
                    lot.remaining_qty
                } else {
                    lot.original_qty - lot.remaining_qty
                };
                return Err(colmado_core::CoreError::InsufficientLotQuantity {
                    lot_id: lot_id.to_string(),
                    available,
                    requested: delta.abs(),
                }
                .into());
            }
            return Err(DbError::concurrent("inventory_lot", lot_id));
        }

        Ok(())
    }

    /// Moves a lot to a non-quantity status (expired, returned).
    ///
    /// Guarded on the current status so duplicate transitions surface as
    /// conflicts rather than silent re-writes.
    pub async fn set_status(
        conn: &mut SqliteConnection,
        lot_id: &str,
        from: LotStatus,
        to: LotStatus,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_lots
            SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(lot_id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::concurrent("inventory_lot", lot_id));
        }

        Ok(())
    }
}
