//! # Audit Repository
//!
//! Append-only record of sensitive operations (voids, period reopens, NCF
//! issuance, status overrides). Never updated, never deleted.

use sqlx::{SqliteConnection, SqlitePool};

use colmado_core::{AuditAction, AuditEntry};

use crate::error::DbResult;

/// Repository for audit log reads.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Audit records for one entity, newest first.
    pub async fn for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at DESC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// All records of one action, newest first.
    pub async fn for_action(&self, action: AuditAction) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            "SELECT * FROM audit_log WHERE action = ?1 ORDER BY created_at DESC",
        )
        .bind(action)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    // =========================================================================
    // Mutations (transaction-scoped)
    // =========================================================================

    /// Appends one audit record.
    pub async fn insert(conn: &mut SqliteConnection, entry: &AuditEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, action, entity_type, entity_id, actor,
                snapshot_before, snapshot_after, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.actor)
        .bind(&entry.snapshot_before)
        .bind(&entry.snapshot_after)
        .bind(entry.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }
}
