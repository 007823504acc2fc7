//! # Period Lifecycle
//!
//! Monthly ITBIS aggregation and the open → closed → filed lifecycle.
//! Aggregation always re-derives the whole summary from the period's tax
//! facts - running it twice changes nothing - and close/reopen/file are
//! guarded status transitions with an audit trail.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use colmado_core::{itbis, AuditAction, CoreError, ItbisPeriodSummary, Period, PeriodStatus};
use colmado_db::{JournalRepository, PeriodRepository};

use crate::engine::LedgerEngine;
use crate::error::EngineResult;

#[derive(Serialize)]
struct ReopenNote<'a> {
    reason: &'a str,
    previous_status: &'a str,
}

impl LedgerEngine {
    /// Re-derives and stores the ITBIS summary for a period from its tax
    /// facts. Idempotent; safe to run at any time while the period is in
    /// any status (the stored status is preserved).
    pub async fn accumulate_period(&self, period: Period) -> EngineResult<ItbisPeriodSummary> {
        let now = Utc::now();
        let mut tx = self.database().begin().await?;

        let facts =
            PeriodRepository::facts_in_range_tx(&mut tx, period.first_day(), period.next_first_day())
                .await?;
        let mut summary = itbis::accumulate_period(period, &facts, now);

        // Keep the lifecycle status out of the derivation's hands.
        if let Some(existing) = PeriodRepository::get_summary_tx(&mut tx, period).await? {
            summary.status = existing.status;
        }
        PeriodRepository::upsert_summary(&mut tx, &summary).await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(period = %period, net_due_cents = summary.net_due_cents, "Period aggregated");
        Ok(summary)
    }

    /// Closes an open period: refuses while pending entries exist inside
    /// it, re-derives the final summary, then locks further postings.
    pub async fn close_period(&self, period: Period, actor: &str) -> EngineResult<ItbisPeriodSummary> {
        let now = Utc::now();
        let mut tx = self.database().begin().await?;

        let status = PeriodRepository::status_tx(&mut tx, period).await?;
        if status != PeriodStatus::Open {
            return Err(CoreError::PeriodClosed {
                period: period.to_string(),
            }
            .into());
        }

        let pending = JournalRepository::count_pending_in_range_tx(
            &mut tx,
            period.first_day(),
            period.next_first_day(),
        )
        .await?;
        if pending > 0 {
            return Err(CoreError::OpenTransactionsExist {
                period: period.to_string(),
                pending,
            }
            .into());
        }

        let facts =
            PeriodRepository::facts_in_range_tx(&mut tx, period.first_day(), period.next_first_day())
                .await?;
        let mut summary = itbis::accumulate_period(period, &facts, now);
        summary.status = PeriodStatus::Closed;
        PeriodRepository::upsert_summary(&mut tx, &summary).await?;
        // upsert preserves an existing row's status; transition it explicitly
        let stored = PeriodRepository::status_tx(&mut tx, period).await?;
        if stored == PeriodStatus::Open {
            PeriodRepository::set_status(&mut tx, period, PeriodStatus::Open, PeriodStatus::Closed)
                .await?;
        }

        Self::append_audit(
            &mut tx,
            AuditAction::PeriodClosed,
            "itbis_period",
            &period.to_string(),
            actor,
            None,
            Some(serde_json::to_string(&summary).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(period = %period, net_due_cents = summary.net_due_cents, "Period closed");
        Ok(summary)
    }

    /// Reopens a closed or filed period for back-dated corrections. A
    /// sensitive override: requires a reason and always lands in the
    /// audit log.
    pub async fn reopen_period(
        &self,
        period: Period,
        reason: &str,
        actor: &str,
    ) -> EngineResult<()> {
        colmado_core::validation::validate_ref("reopen reason", reason)?;

        let mut tx = self.database().begin().await?;
        let status = PeriodRepository::status_tx(&mut tx, period).await?;
        let previous = match status {
            PeriodStatus::Closed => "closed",
            PeriodStatus::Filed => "filed",
            PeriodStatus::Open => {
                return Err(CoreError::PeriodNotClosed {
                    period: period.to_string(),
                    status: "open".to_string(),
                }
                .into());
            }
        };

        PeriodRepository::set_status(&mut tx, period, status, PeriodStatus::Open).await?;
        let note = ReopenNote {
            reason,
            previous_status: previous,
        };
        Self::append_audit(
            &mut tx,
            AuditAction::PeriodReopened,
            "itbis_period",
            &period.to_string(),
            actor,
            Some(serde_json::to_string(previous).map_err(colmado_db::DbError::from)?),
            Some(serde_json::to_string(&note).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(period = %period, reason, previous, "Period reopened");
        Ok(())
    }

    /// Marks a closed period as filed with DGII. Terminal short of an
    /// audited reopen.
    pub async fn file_period(&self, period: Period, actor: &str) -> EngineResult<ItbisPeriodSummary> {
        let mut tx = self.database().begin().await?;

        let status = PeriodRepository::status_tx(&mut tx, period).await?;
        if status != PeriodStatus::Closed {
            return Err(CoreError::PeriodNotClosed {
                period: period.to_string(),
                status: match status {
                    PeriodStatus::Open => "open",
                    PeriodStatus::Filed => "filed",
                    PeriodStatus::Closed => "closed",
                }
                .to_string(),
            }
            .into());
        }

        PeriodRepository::set_status(&mut tx, period, PeriodStatus::Closed, PeriodStatus::Filed)
            .await?;
        let summary = PeriodRepository::get_summary_tx(&mut tx, period)
            .await?
            .ok_or_else(|| colmado_db::DbError::not_found("itbis_period", period.to_string()))?;

        Self::append_audit(
            &mut tx,
            AuditAction::PeriodFiled,
            "itbis_period",
            &period.to_string(),
            actor,
            None,
            Some(serde_json::to_string(&summary).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(period = %period, "Period filed");
        Ok(summary)
    }
}
