//! # Shift Repository
//!
//! Cash register shifts. One shift open at a time; close is terminal and
//! records the count against the derived expectation.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use colmado_core::Shift;

use crate::error::{DbError, DbResult};

/// Repository for shift reads.
#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    /// Fetches a shift by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Shift> {
        let mut conn = self.pool.acquire().await?;
        Self::get_tx(&mut conn, id).await
    }

    /// As [`Self::get_by_id`], on the given connection.
    pub async fn get_tx(conn: &mut SqliteConnection, id: &str) -> DbResult<Shift> {
        let shift = sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?1")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DbError::not_found("shift", id))?;

        Ok(shift)
    }

    /// The currently open shift, if any.
    pub async fn current_open(&self) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        Self::current_open_tx(&mut conn).await
    }

    /// As [`Self::current_open`], on the given connection.
    pub async fn current_open_tx(conn: &mut SqliteConnection) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            "SELECT * FROM shifts WHERE status = 'open' ORDER BY opened_at DESC LIMIT 1",
        )
        .fetch_optional(conn)
        .await?;

        Ok(shift)
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Opens a new shift.
    pub async fn insert(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO shifts (
                id, opened_at, closed_at, opening_float_cents,
                expected_cash_cents, counted_cash_cents, cash_difference_cents, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&shift.id)
        .bind(shift.opened_at)
        .bind(shift.closed_at)
        .bind(shift.opening_float_cents)
        .bind(shift.expected_cash_cents)
        .bind(shift.counted_cash_cents)
        .bind(shift.cash_difference_cents)
        .bind(shift.status)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Closes an open shift with the count figures. Guarded on status so
    /// a double close surfaces as a conflict.
    pub async fn close(
        conn: &mut SqliteConnection,
        shift_id: &str,
        closed_at: DateTime<Utc>,
        expected_cash_cents: i64,
        counted_cash_cents: i64,
        cash_difference_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE shifts
            SET status = 'closed',
                closed_at = ?2,
                expected_cash_cents = ?3,
                counted_cash_cents = ?4,
                cash_difference_cents = ?5
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(shift_id)
        .bind(closed_at)
        .bind(expected_cash_cents)
        .bind(counted_cash_cents)
        .bind(cash_difference_cents)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::concurrent("shift", shift_id));
        }

        Ok(())
    }
}
