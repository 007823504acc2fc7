//! # Sequence Repository
//!
//! Serialized counters for journal entry numbers and NCF series.
//!
//! Allocation is a single `UPDATE ... RETURNING` inside the caller's
//! transaction, so two committed writers can never observe the same
//! value. The guarantee is uniqueness; callers must not assume
//! contiguity.

use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};

/// Sequence name for journal entry numbers.
pub const SEQ_JOURNAL_ENTRY: &str = "journal_entry";

/// Namespaced access to `ledger_sequences`. Allocation always happens
/// inside the caller's transaction, so this carries no pool.
#[derive(Debug)]
pub struct SequenceRepository;

impl SequenceRepository {
    /// Allocates the next value of a named sequence.
    pub async fn next(conn: &mut SqliteConnection, name: &str) -> DbResult<i64> {
        let value: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE ledger_sequences
            SET next_value = next_value + 1
            WHERE name = ?1
            RETURNING next_value
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        value.ok_or_else(|| DbError::not_found("ledger_sequence", name))
    }

    /// Registers a sequence if it does not exist, starting at zero.
    /// Used for NCF series, which appear as they are configured.
    pub async fn ensure(conn: &mut SqliteConnection, name: &str) -> DbResult<()> {
        sqlx::query("INSERT OR IGNORE INTO ledger_sequences (name, next_value) VALUES (?1, 0)")
            .bind(name)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// The highest value a sequence has handed out so far, or `None` for
    /// an unregistered sequence. Values `1..=current` have been issued.
    pub async fn current(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<i64>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT next_value FROM ledger_sequences WHERE name = ?1")
                .bind(name)
                .fetch_optional(conn)
                .await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_sequence_never_repeats() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..5 {
            let mut tx = db.begin().await.unwrap();
            let n = SequenceRepository::next(&mut tx, SEQ_JOURNAL_ENTRY)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            seen.push(n);
        }

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_rollback_does_not_leak_a_duplicate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            let n = SequenceRepository::next(&mut tx, SEQ_JOURNAL_ENTRY)
                .await
                .unwrap();
            assert_eq!(n, 1);
            // dropped without commit
        }

        let mut tx = db.begin().await.unwrap();
        let n = SequenceRepository::next(&mut tx, SEQ_JOURNAL_ENTRY)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // the rolled-back allocation was undone with its transaction
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_unknown_sequence_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let err = SequenceRepository::next(&mut tx, "no_such_series")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
