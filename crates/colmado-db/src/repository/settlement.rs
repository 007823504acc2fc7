//! # Settlement Repository
//!
//! Card settlement batches. `sale_refs` is stored as a JSON array column
//! and (de)serialized at the repository boundary, same convention as the
//! sync payloads elsewhere in the product family.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use colmado_core::{CardSettlement, SettlementStatus};

use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct SettlementRow {
    id: String,
    settlement_date: NaiveDate,
    processor: String,
    gross_cents: i64,
    commission_cents: i64,
    commission_tax_cents: i64,
    net_cents: i64,
    sale_refs: String,
    status: SettlementStatus,
    journal_entry_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl SettlementRow {
    fn into_settlement(self) -> DbResult<CardSettlement> {
        let sale_refs: Vec<String> = serde_json::from_str(&self.sale_refs)?;
        Ok(CardSettlement {
            id: self.id,
            settlement_date: self.settlement_date,
            processor: self.processor,
            gross_cents: self.gross_cents,
            commission_cents: self.commission_cents,
            commission_tax_cents: self.commission_tax_cents,
            net_cents: self.net_cents,
            sale_refs,
            status: self.status,
            journal_entry_id: self.journal_entry_id,
            created_at: self.created_at,
        })
    }
}

/// Repository for card settlement reads.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Fetches a settlement by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<CardSettlement> {
        let mut conn = self.pool.acquire().await?;
        Self::get_tx(&mut conn, id).await
    }

    /// As [`Self::get_by_id`], on the given connection.
    pub async fn get_tx(conn: &mut SqliteConnection, id: &str) -> DbResult<CardSettlement> {
        let row = sqlx::query_as::<_, SettlementRow>(
            "SELECT * FROM card_settlements WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("card_settlement", id))?;

        row.into_settlement()
    }

    /// Settlements still awaiting reconciliation, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<CardSettlement>> {
        let rows = sqlx::query_as::<_, SettlementRow>(
            r#"
            SELECT * FROM card_settlements
            WHERE status = 'pending'
            ORDER BY settlement_date ASC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SettlementRow::into_settlement).collect()
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Inserts a new settlement batch.
    pub async fn insert(conn: &mut SqliteConnection, settlement: &CardSettlement) -> DbResult<()> {
        let sale_refs = serde_json::to_string(&settlement.sale_refs)?;

        sqlx::query(
            r#"
            INSERT INTO card_settlements (
                id, settlement_date, processor, gross_cents, commission_cents,
                commission_tax_cents, net_cents, sale_refs, status,
                journal_entry_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&settlement.id)
        .bind(settlement.settlement_date)
        .bind(&settlement.processor)
        .bind(settlement.gross_cents)
        .bind(settlement.commission_cents)
        .bind(settlement.commission_tax_cents)
        .bind(settlement.net_cents)
        .bind(sale_refs)
        .bind(settlement.status)
        .bind(&settlement.journal_entry_id)
        .bind(settlement.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Moves a pending settlement to reconciled and links its journal
    /// entry. Guarded so only a pending settlement can reconcile.
    pub async fn mark_reconciled(
        conn: &mut SqliteConnection,
        settlement_id: &str,
        journal_entry_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE card_settlements
            SET status = 'reconciled', journal_entry_id = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(settlement_id)
        .bind(journal_entry_id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::concurrent("card_settlement", settlement_id));
        }

        Ok(())
    }

    /// Flags a pending settlement as disputed.
    pub async fn mark_disputed(conn: &mut SqliteConnection, settlement_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE card_settlements
            SET status = 'disputed'
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(settlement_id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::concurrent("card_settlement", settlement_id));
        }

        Ok(())
    }
}
