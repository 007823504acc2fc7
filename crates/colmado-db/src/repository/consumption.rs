//! # Consumption Repository
//!
//! Immutable record of which lot supplied which transaction at what cost.
//! These rows are the audit trail behind every COGS figure - reversals are
//! compensating rows, never edits.

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use colmado_core::CostConsumption;

use crate::error::DbResult;

/// Conservation check for one product:
/// purchased == consumed - returned + remaining must hold at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationReport {
    pub product_id: String,
    /// Sum of original quantities over all lots.
    pub purchased: i64,
    /// Sale + adjustment + loss quantity.
    pub consumed: i64,
    /// Return (restock) quantity.
    pub returned: i64,
    /// Sum of remaining over all lots.
    pub remaining: i64,
}

impl ConservationReport {
    /// Whether quantity is conserved for this product.
    pub fn holds(&self) -> bool {
        self.purchased == self.consumed - self.returned + self.remaining
    }
}

/// Repository for cost consumption reads.
#[derive(Debug, Clone)]
pub struct ConsumptionRepository {
    pool: SqlitePool,
}

impl ConsumptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ConsumptionRepository { pool }
    }

    /// All consumptions recorded against one transaction, oldest first.
    pub async fn for_transaction(&self, transaction_ref: &str) -> DbResult<Vec<CostConsumption>> {
        let mut conn = self.pool.acquire().await?;
        Self::for_transaction_tx(&mut conn, transaction_ref).await
    }

    /// As [`Self::for_transaction`], on the given connection.
    pub async fn for_transaction_tx(
        conn: &mut SqliteConnection,
        transaction_ref: &str,
    ) -> DbResult<Vec<CostConsumption>> {
        let rows = sqlx::query_as::<_, CostConsumption>(
            r#"
            SELECT * FROM cost_consumptions
            WHERE transaction_ref = ?1
            ORDER BY consumed_at ASC, rowid ASC
            "#,
        )
        .bind(transaction_ref)
        .fetch_all(conn)
        .await?;

        Ok(rows)
    }

    /// All consumptions against one lot.
    pub async fn for_lot(&self, lot_id: &str) -> DbResult<Vec<CostConsumption>> {
        let rows = sqlx::query_as::<_, CostConsumption>(
            "SELECT * FROM cost_consumptions WHERE lot_id = ?1 ORDER BY consumed_at ASC",
        )
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Builds the quantity-conservation report for a product.
    ///
    /// Joins lot totals against consumption totals; a report where
    /// [`ConservationReport::holds`] is false means a write path leaked
    /// quantity and is a bug, not a data-entry problem.
    pub async fn conservation(&self, product_id: &str) -> DbResult<ConservationReport> {
        let (purchased, remaining): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(original_qty), 0), COALESCE(SUM(remaining_qty), 0)
            FROM inventory_lots
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        let (consumed, returned): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN consumption_type != 'return' THEN quantity ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN consumption_type = 'return' THEN quantity ELSE 0 END), 0)
            FROM cost_consumptions
            WHERE product_id = ?1
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ConservationReport {
            product_id: product_id.to_string(),
            purchased,
            consumed,
            returned,
            remaining,
        })
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Inserts one consumption row.
    pub async fn insert(conn: &mut SqliteConnection, row: &CostConsumption) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cost_consumptions (
                id, lot_id, product_id, transaction_ref, consumption_type,
                quantity, unit_cost_cents, total_cost_cents, consumed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&row.id)
        .bind(&row.lot_id)
        .bind(&row.product_id)
        .bind(&row.transaction_ref)
        .bind(row.consumption_type)
        .bind(row.quantity)
        .bind(row.unit_cost_cents)
        .bind(row.total_cost_cents)
        .bind(row.consumed_at)
        .execute(conn)
        .await?;

        Ok(())
    }
}
