//! # Journal Repository
//!
//! Storage for double-entry journal entries and their typed lines.
//!
//! Entries and lines live in separate tables; the repository assembles
//! them back into [`JournalEntry`] on read. Voiding never touches lines -
//! the original record stays intact under the voided status.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use colmado_core::{Account, JournalEntry, JournalLine, JournalStatus, SourceType};

use crate::error::{DbError, DbResult};

/// Header row, without lines.
#[derive(Debug, FromRow)]
struct EntryRow {
    id: String,
    entry_number: i64,
    entry_date: NaiveDate,
    description: String,
    source_type: SourceType,
    source_ref: String,
    total_debit_cents: i64,
    total_credit_cents: i64,
    status: JournalStatus,
    void_reason: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct LineRow {
    entry_id: String,
    account: Account,
    debit_cents: i64,
    credit_cents: i64,
}

impl EntryRow {
    fn into_entry(self, lines: Vec<JournalLine>) -> JournalEntry {
        JournalEntry {
            id: self.id,
            entry_number: self.entry_number,
            entry_date: self.entry_date,
            description: self.description,
            source_type: self.source_type,
            source_ref: self.source_ref,
            lines,
            total_debit_cents: self.total_debit_cents,
            total_credit_cents: self.total_credit_cents,
            status: self.status,
            void_reason: self.void_reason,
            voided_at: self.voided_at,
            created_at: self.created_at,
        }
    }
}

/// Repository for journal reads.
#[derive(Debug, Clone)]
pub struct JournalRepository {
    pool: SqlitePool,
}

impl JournalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        JournalRepository { pool }
    }

    /// Fetches an entry with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<JournalEntry> {
        let mut conn = self.pool.acquire().await?;
        Self::get_tx(&mut conn, id).await
    }

    /// As [`Self::get_by_id`], on the given connection.
    pub async fn get_tx(conn: &mut SqliteConnection, id: &str) -> DbResult<JournalEntry> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM journal_entries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("journal_entry", id))?;

        let lines = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT entry_id, account, debit_cents, credit_cents
            FROM journal_lines
            WHERE entry_id = ?1
            ORDER BY line_no ASC
            "#,
        )
        .bind(id)
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|l| JournalLine {
            account: l.account,
            debit_cents: l.debit_cents,
            credit_cents: l.credit_cents,
        })
        .collect();

        Ok(row.into_entry(lines))
    }

    /// Entries originating from one source transaction.
    pub async fn for_source(
        &self,
        source_type: SourceType,
        source_ref: &str,
    ) -> DbResult<Vec<JournalEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT * FROM journal_entries
            WHERE source_type = ?1 AND source_ref = ?2
            ORDER BY entry_number ASC
            "#,
        )
        .bind(source_type)
        .bind(source_ref)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    /// Entries dated in `[start, end)`, entry-number order.
    pub async fn list_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<Vec<JournalEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT * FROM journal_entries
            WHERE entry_date >= ?1 AND entry_date < ?2
            ORDER BY entry_number ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    /// Count of entries still pending in a date range. Period close
    /// requires this to be zero.
    pub async fn count_pending_in_range(&self, start: NaiveDate, end: NaiveDate) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::count_pending_in_range_tx(&mut conn, start, end).await
    }

    /// As [`Self::count_pending_in_range`], on the given connection.
    pub async fn count_pending_in_range_tx(
        conn: &mut SqliteConnection,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM journal_entries
            WHERE status = 'pending' AND entry_date >= ?1 AND entry_date < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(conn)
        .await?;

        Ok(count)
    }

    /// Net cash movement (debits minus credits against the cash account)
    /// over posted entries created in `[start, end)`.
    ///
    /// Drives the expected-drawer figure at shift close, so it keys off
    /// creation time rather than entry date.
    pub async fn cash_movement_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::cash_movement_between_tx(&mut conn, start, end).await
    }

    /// As [`Self::cash_movement_between`], on the given connection.
    pub async fn cash_movement_between_tx(
        conn: &mut SqliteConnection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<i64> {
        let movement: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(l.debit_cents - l.credit_cents), 0)
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE l.account = 'cash'
              AND e.status = 'posted'
              AND e.created_at >= ?1 AND e.created_at < ?2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(conn)
        .await?;

        Ok(movement)
    }

    /// Trial balance over posted entries dated in `[start, end)`:
    /// per-account (debit, credit) totals.
    pub async fn account_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<Vec<(Account, i64, i64)>> {
        let rows: Vec<(Account, i64, i64)> = sqlx::query_as(
            r#"
            SELECT l.account, COALESCE(SUM(l.debit_cents), 0), COALESCE(SUM(l.credit_cents), 0)
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.status = 'posted'
              AND e.entry_date >= ?1 AND e.entry_date < ?2
            GROUP BY l.account
            ORDER BY l.account
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn assemble(&self, rows: Vec<EntryRow>) -> DbResult<Vec<JournalEntry>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT entry_id, account, debit_cents, credit_cents \
             FROM journal_lines WHERE entry_id IN ({placeholders}) \
             ORDER BY entry_id, line_no ASC"
        );

        let mut query = sqlx::query_as::<_, LineRow>(&sql);
        for id in &ids {
            query = query.bind(id);
        }
        let line_rows = query.fetch_all(&self.pool).await?;

        let mut by_entry: std::collections::HashMap<String, Vec<JournalLine>> =
            std::collections::HashMap::new();
        for l in line_rows {
            by_entry.entry(l.entry_id.clone()).or_default().push(JournalLine {
                account: l.account,
                debit_cents: l.debit_cents,
                credit_cents: l.credit_cents,
            });
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let lines = by_entry.remove(&r.id).unwrap_or_default();
                r.into_entry(lines)
            })
            .collect())
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Inserts an entry and its lines.
    pub async fn insert(conn: &mut SqliteConnection, entry: &JournalEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (
                id, entry_number, entry_date, description, source_type, source_ref,
                total_debit_cents, total_credit_cents, status, void_reason,
                voided_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.entry_number)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(entry.source_type)
        .bind(&entry.source_ref)
        .bind(entry.total_debit_cents)
        .bind(entry.total_credit_cents)
        .bind(entry.status)
        .bind(&entry.void_reason)
        .bind(entry.voided_at)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        for (line_no, line) in entry.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO journal_lines (id, entry_id, line_no, account, debit_cents, credit_cents)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&entry.id)
            .bind(line_no as i64)
            .bind(line.account)
            .bind(line.debit_cents)
            .bind(line.credit_cents)
            .execute(&mut *conn)
            .await?;
        }

        debug!(
            entry_id = %entry.id,
            entry_number = entry.entry_number,
            lines = entry.lines.len(),
            "Journal entry inserted"
        );
        Ok(())
    }

    /// Marks a posted entry voided, recording reason and time. The guard
    /// on status means a pending or already-voided entry misses.
    pub async fn void(
        conn: &mut SqliteConnection,
        entry_id: &str,
        reason: &str,
        voided_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE journal_entries
            SET status = 'voided', void_reason = ?2, voided_at = ?3
            WHERE id = ?1 AND status = 'posted'
            "#,
        )
        .bind(entry_id)
        .bind(reason)
        .bind(voided_at)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::concurrent("journal_entry", entry_id));
        }

        Ok(())
    }
}
