//! # Period Repository
//!
//! Tax facts and monthly ITBIS period rows.
//!
//! Facts are immutable and keyed by a deterministic id, so posting the
//! same transaction twice writes the same rows (INSERT OR IGNORE) and the
//! period summary, re-derived from facts, never double counts.
//!
//! A period without a row is open. Rows appear when a period is first
//! aggregated or closed.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use colmado_core::{ItbisPeriodSummary, Period, PeriodStatus, TaxFact};

use crate::error::{DbError, DbResult};

/// Repository for tax facts and period summaries.
#[derive(Debug, Clone)]
pub struct PeriodRepository {
    pool: SqlitePool,
}

impl PeriodRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PeriodRepository { pool }
    }

    /// All tax facts dated in `[start, end)`.
    pub async fn facts_in_range(&self, start: NaiveDate, end: NaiveDate) -> DbResult<Vec<TaxFact>> {
        let mut conn = self.pool.acquire().await?;
        Self::facts_in_range_tx(&mut conn, start, end).await
    }

    /// As [`Self::facts_in_range`], on the given connection.
    pub async fn facts_in_range_tx(
        conn: &mut SqliteConnection,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<Vec<TaxFact>> {
        let facts = sqlx::query_as::<_, TaxFact>(
            r#"
            SELECT * FROM tax_facts
            WHERE fact_date >= ?1 AND fact_date < ?2
            ORDER BY fact_date ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(conn)
        .await?;

        Ok(facts)
    }

    /// Facts written for one transaction.
    pub async fn facts_for_transaction(&self, transaction_ref: &str) -> DbResult<Vec<TaxFact>> {
        let mut conn = self.pool.acquire().await?;
        Self::facts_for_transaction_tx(&mut conn, transaction_ref).await
    }

    /// As [`Self::facts_for_transaction`], on the given connection.
    pub async fn facts_for_transaction_tx(
        conn: &mut SqliteConnection,
        transaction_ref: &str,
    ) -> DbResult<Vec<TaxFact>> {
        let facts = sqlx::query_as::<_, TaxFact>(
            "SELECT * FROM tax_facts WHERE transaction_ref = ?1 ORDER BY id ASC",
        )
        .bind(transaction_ref)
        .fetch_all(conn)
        .await?;

        Ok(facts)
    }

    /// Fetches the stored summary for a period, if one has been written.
    pub async fn get_summary(&self, period: Period) -> DbResult<Option<ItbisPeriodSummary>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_summary_tx(&mut conn, period).await
    }

    /// As [`Self::get_summary`], on the given connection.
    pub async fn get_summary_tx(
        conn: &mut SqliteConnection,
        period: Period,
    ) -> DbResult<Option<ItbisPeriodSummary>> {
        let summary = sqlx::query_as::<_, ItbisPeriodSummary>(
            "SELECT * FROM itbis_periods WHERE period = ?1",
        )
        .bind(period.to_string())
        .fetch_optional(conn)
        .await?;

        Ok(summary)
    }

    /// Status of a period. A missing row means open.
    pub async fn status(&self, period: Period) -> DbResult<PeriodStatus> {
        let mut conn = self.pool.acquire().await?;
        Self::status_tx(&mut conn, period).await
    }

    /// As [`Self::status`], on the given connection.
    pub async fn status_tx(conn: &mut SqliteConnection, period: Period) -> DbResult<PeriodStatus> {
        let status: Option<PeriodStatus> = sqlx::query_scalar(
            "SELECT status FROM itbis_periods WHERE period = ?1",
        )
        .bind(period.to_string())
        .fetch_optional(conn)
        .await?;

        Ok(status.unwrap_or(PeriodStatus::Open))
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Writes one tax fact. Deterministic ids make a replay a no-op.
    pub async fn insert_fact(conn: &mut SqliteConnection, fact: &TaxFact) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO tax_facts (
                id, transaction_ref, kind, rate_bps, base_cents, itbis_cents, fact_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&fact.id)
        .bind(&fact.transaction_ref)
        .bind(fact.kind)
        .bind(fact.rate_bps)
        .bind(fact.base_cents)
        .bind(fact.itbis_cents)
        .bind(fact.fact_date)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Writes (or replaces the figures of) a period summary, preserving
    /// whatever status the row already carries.
    pub async fn upsert_summary(
        conn: &mut SqliteConnection,
        summary: &ItbisPeriodSummary,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO itbis_periods (
                period, status, collected_standard_cents, collected_reduced_cents,
                exempt_sales_cents, paid_standard_cents, paid_reduced_cents,
                retained_cents, net_due_cents, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (period) DO UPDATE SET
                collected_standard_cents = excluded.collected_standard_cents,
                collected_reduced_cents = excluded.collected_reduced_cents,
                exempt_sales_cents = excluded.exempt_sales_cents,
                paid_standard_cents = excluded.paid_standard_cents,
                paid_reduced_cents = excluded.paid_reduced_cents,
                retained_cents = excluded.retained_cents,
                net_due_cents = excluded.net_due_cents,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&summary.period)
        .bind(summary.status)
        .bind(summary.collected_standard_cents)
        .bind(summary.collected_reduced_cents)
        .bind(summary.exempt_sales_cents)
        .bind(summary.paid_standard_cents)
        .bind(summary.paid_reduced_cents)
        .bind(summary.retained_cents)
        .bind(summary.net_due_cents)
        .bind(summary.updated_at)
        .execute(conn)
        .await?;

        debug!(period = %summary.period, "Period summary upserted");
        Ok(())
    }

    /// Transitions a period's status, guarded on the expected current
    /// status. The row must already exist (aggregation writes it).
    pub async fn set_status(
        conn: &mut SqliteConnection,
        period: Period,
        from: PeriodStatus,
        to: PeriodStatus,
    ) -> DbResult<()> {
        let key = period.to_string();
        let result = sqlx::query(
            r#"
            UPDATE itbis_periods
            SET status = ?3, updated_at = ?4
            WHERE period = ?1 AND status = ?2
            "#,
        )
        .bind(&key)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::concurrent("itbis_period", &key));
        }

        Ok(())
    }
}
