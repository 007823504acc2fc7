//! # Register Shifts
//!
//! One drawer, one open shift at a time. Closing derives the expected
//! cash from the journal (opening float plus net posted cash movement
//! since open), records the count, and posts the variance to
//! CashOverShort when the drawer is off.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use colmado_core::{journal, AuditAction, CoreError, Money, Shift, ShiftStatus};
use colmado_db::{JournalRepository, ShiftRepository};

use crate::engine::LedgerEngine;
use crate::error::{EngineError, EngineResult};

impl LedgerEngine {
    /// Opens a shift with the counted opening float. Fails while another
    /// shift is open.
    pub async fn open_shift(&self, opening_float_cents: i64, _actor: &str) -> EngineResult<Shift> {
        let mut tx = self.database().begin().await?;

        if let Some(open) = ShiftRepository::current_open_tx(&mut tx).await? {
            return Err(EngineError::ShiftAlreadyOpen { shift_id: open.id });
        }

        let shift = Shift {
            id: Uuid::new_v4().to_string(),
            opened_at: Utc::now(),
            closed_at: None,
            opening_float_cents,
            expected_cash_cents: None,
            counted_cash_cents: None,
            cash_difference_cents: None,
            status: ShiftStatus::Open,
        };
        ShiftRepository::insert(&mut tx, &shift).await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(shift_id = %shift.id, opening_float_cents, "Shift opened");
        Ok(shift)
    }

    /// Closes a shift against a physical cash count.
    ///
    /// `expected = opening float + net posted cash movement since open`;
    /// a nonzero difference posts to CashOverShort so the drawer and the
    /// ledger agree again. Returns the closed shift.
    pub async fn close_shift(
        &self,
        shift_id: &str,
        counted_cash_cents: i64,
        actor: &str,
    ) -> EngineResult<Shift> {
        let now = Utc::now();
        let today = now.date_naive();

        let mut tx = self.database().begin().await?;

        let shift = ShiftRepository::get_tx(&mut tx, shift_id).await?;
        if shift.status == ShiftStatus::Closed {
            return Err(CoreError::ShiftAlreadyClosed {
                shift_id: shift_id.to_string(),
            }
            .into());
        }
        Self::guard_period_open(&mut tx, today).await?;

        let movement =
            JournalRepository::cash_movement_between_tx(&mut tx, shift.opened_at, now).await?;
        let expected = shift.opening_float_cents + movement;
        let difference = counted_cash_cents - expected;

        if let Some(draft) =
            journal::build_shift_close_entry(shift_id, today, Money::from_cents(difference))?
        {
            Self::post_draft(&mut tx, draft, now).await?;
        }

        ShiftRepository::close(&mut tx, shift_id, now, expected, counted_cash_cents, difference)
            .await?;
        let closed = ShiftRepository::get_tx(&mut tx, shift_id).await?;

        Self::append_audit(
            &mut tx,
            AuditAction::ShiftClosed,
            "shift",
            shift_id,
            actor,
            Some(serde_json::to_string(&shift).map_err(colmado_db::DbError::from)?),
            Some(serde_json::to_string(&closed).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(
            shift_id,
            expected_cash_cents = expected,
            counted_cash_cents,
            cash_difference_cents = difference,
            "Shift closed"
        );
        Ok(closed)
    }
}
