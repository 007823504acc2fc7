//! # Card Settlement Reconciliation
//!
//! Card sales debit CardReceivable at posting time; when the processor's
//! deposit arrives (gross minus commission minus ITBIS on the
//! commission), reconciliation clears the receivable, expenses the
//! commission, and records the processor's ITBIS retention as a tax fact.
//!
//! The retention (Norma 08-04, 2% of the ITBIS on settled sales) is a
//! DGII credit, not cash movement in the deposit, so it lives in the tax
//! facts and never in the settlement entry - the entry's net invariant
//! stays `net = gross - commission - tax_on_commission`.

use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use colmado_core::{
    itbis, validation, AuditAction, CardSettlement, CoreError, JournalEntry, Money,
    SettlementStatus, TaxFactKind, TaxRate,
};
use colmado_db::{PeriodRepository, SettlementRepository};

use crate::engine::LedgerEngine;
use crate::error::EngineResult;

/// Input for recording a processor deposit.
#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub settlement_date: NaiveDate,
    /// Processor name (CardNET, AZUL, ...).
    pub processor: String,
    pub gross_cents: i64,
    pub commission_cents: i64,
    pub commission_tax_cents: i64,
    pub net_cents: i64,
    /// Sale transaction refs this deposit covers.
    pub sale_refs: Vec<String>,
}

impl LedgerEngine {
    /// Records a settlement batch as pending. Amounts must satisfy
    /// `net = gross - commission - tax_on_commission`.
    pub async fn record_settlement(
        &self,
        input: NewSettlement,
        _actor: &str,
    ) -> EngineResult<CardSettlement> {
        validation::validate_ref("processor", &input.processor)?;

        let settlement = CardSettlement {
            id: Uuid::new_v4().to_string(),
            settlement_date: input.settlement_date,
            processor: input.processor,
            gross_cents: input.gross_cents,
            commission_cents: input.commission_cents,
            commission_tax_cents: input.commission_tax_cents,
            net_cents: input.net_cents,
            sale_refs: input.sale_refs,
            status: SettlementStatus::Pending,
            journal_entry_id: None,
            created_at: Utc::now(),
        };
        if !settlement.amounts_consistent() {
            return Err(CoreError::SettlementAmountMismatch {
                settlement_id: settlement.id,
                gross_cents: settlement.gross_cents,
                commission_cents: settlement.commission_cents,
                commission_tax_cents: settlement.commission_tax_cents,
                net_cents: settlement.net_cents,
            }
            .into());
        }

        let mut tx = self.database().begin().await?;
        SettlementRepository::insert(&mut tx, &settlement).await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(settlement_id = %settlement.id, processor = %settlement.processor, "Settlement recorded");
        Ok(settlement)
    }

    /// Reconciles a pending settlement: posts the clearing entry, writes
    /// the ITBIS retention fact, and links the entry to the settlement.
    pub async fn reconcile_settlement(
        &self,
        settlement_id: &str,
        actor: &str,
    ) -> EngineResult<JournalEntry> {
        let now = Utc::now();
        let mut tx = self.database().begin().await?;

        let settlement = SettlementRepository::get_tx(&mut tx, settlement_id).await?;
        Self::guard_period_open(&mut tx, settlement.settlement_date).await?;

        // ITBIS collected on the settled sales is the retention base.
        let mut settled_itbis = Money::zero();
        for sale_ref in &settlement.sale_refs {
            let facts = PeriodRepository::facts_for_transaction_tx(&mut tx, sale_ref).await?;
            settled_itbis += facts
                .iter()
                .filter(|f| f.kind == TaxFactKind::Collected)
                .map(|f| Money::from_cents(f.itbis_cents))
                .sum();
        }

        let retention_rate = TaxRate::from_bps(self.config().retention_rate_bps);
        let retention_fact = itbis::fact_for_retention(&settlement, settled_itbis, retention_rate);
        PeriodRepository::insert_fact(&mut tx, &retention_fact).await?;

        let draft = colmado_core::journal::build_settlement_entry(&settlement)?;
        let entry = Self::post_draft(&mut tx, draft, now).await?;

        SettlementRepository::mark_reconciled(&mut tx, settlement_id, &entry.id).await?;
        Self::append_audit(
            &mut tx,
            AuditAction::SettlementReconciled,
            "card_settlement",
            settlement_id,
            actor,
            None,
            Some(serde_json::to_string(&entry.id).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(
            settlement_id,
            entry_number = entry.entry_number,
            retained_cents = retention_fact.itbis_cents,
            "Settlement reconciled"
        );
        Ok(entry)
    }

    /// Flags a pending settlement as disputed (deposit didn't match the
    /// expected amounts). No ledger movement until resolution.
    pub async fn dispute_settlement(
        &self,
        settlement_id: &str,
        reason: &str,
        actor: &str,
    ) -> EngineResult<()> {
        validation::validate_ref("dispute reason", reason)?;

        let mut tx = self.database().begin().await?;
        SettlementRepository::mark_disputed(&mut tx, settlement_id).await?;
        Self::append_audit(
            &mut tx,
            AuditAction::SettlementDisputed,
            "card_settlement",
            settlement_id,
            actor,
            None,
            Some(serde_json::to_string(reason).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(settlement_id, reason, "Settlement disputed");
        Ok(())
    }
}
