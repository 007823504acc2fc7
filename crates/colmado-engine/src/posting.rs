//! # Transaction Posting
//!
//! Sale, purchase, return and manual postings. Each operation validates
//! its event, then runs plan/execute inside one transaction: lot
//! movements, consumption rows, tax facts and the balanced journal entry
//! commit together or not at all.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use colmado_core::{
    itbis, journal, validation, AuditAction, ConsumptionType, CoreError, CostConsumption,
    EntryDraft, InventoryLot, JournalEntry, JournalLine, JournalStatus, LotStatus, Money,
    PurchaseEvent, ReturnEvent, SaleEvent, SourceType, TaxRate,
};
use colmado_db::{ConsumptionRepository, JournalRepository, LotRepository, PeriodRepository};

use crate::engine::LedgerEngine;
use crate::error::EngineResult;

// =============================================================================
// Outcomes
// =============================================================================

/// Stock the FIFO walk could not cover for one product of a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub product_id: String,
    pub quantity: i64,
}

/// Result of posting a sale.
#[derive(Debug, Clone)]
pub struct SaleOutcome {
    pub entry: JournalEntry,
    pub consumptions: Vec<CostConsumption>,
    /// Total COGS across all lines, in centavos.
    pub cogs_cents: i64,
    /// Never hidden: quantity sold ahead of recorded stock. Empty when
    /// every line was fully allocated.
    pub shortfalls: Vec<Shortfall>,
}

/// Result of posting a purchase.
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub entry: JournalEntry,
    /// One new lot per invoice line, in line order.
    pub lots: Vec<InventoryLot>,
}

/// Result of posting a customer return.
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub entry: JournalEntry,
    /// Compensating consumption rows, newest original allocation first.
    pub restocked: Vec<CostConsumption>,
    /// Cost basis restored to inventory, in centavos.
    pub restocked_cost_cents: i64,
}

// =============================================================================
// Posting Operations
// =============================================================================

impl LedgerEngine {
    /// Posts a finalized sale: FIFO consumption per line, COGS at frozen
    /// lot costs, ITBIS facts, and the balanced revenue entry.
    ///
    /// A line the stock cannot cover posts its available portion and
    /// reports the rest on `shortfalls` - the till is never blocked by a
    /// late invoice entry.
    pub async fn post_sale(&self, sale: &SaleEvent, actor: &str) -> EngineResult<SaleOutcome> {
        validation::validate_ref("sale id", &sale.id)?;
        for line in &sale.lines {
            validation::validate_sale_line(line)?;
        }

        let outcome = self
            .with_retry("post_sale", || self.try_post_sale(sale, actor))
            .await?;

        info!(
            sale_id = %sale.id,
            entry_number = outcome.entry.entry_number,
            cogs_cents = outcome.cogs_cents,
            shortfalls = outcome.shortfalls.len(),
            "Sale posted"
        );
        Ok(outcome)
    }

    async fn try_post_sale(&self, sale: &SaleEvent, actor: &str) -> EngineResult<SaleOutcome> {
        let now = Utc::now();
        let mut tx = self.database().begin().await?;
        Self::guard_period_open(&mut tx, sale.date).await?;

        let mut consumptions = Vec::new();
        let mut shortfalls = Vec::new();
        let mut cogs = Money::zero();

        for line in &sale.lines {
            let (rows, plan) = Self::execute_fifo(
                &mut tx,
                &line.product_id,
                line.quantity,
                ConsumptionType::Sale,
                &sale.id,
                now,
            )
            .await?;
            cogs += Money::from_cents(plan.total_cost_cents);
            if plan.shortfall > 0 {
                shortfalls.push(Shortfall {
                    product_id: line.product_id.clone(),
                    quantity: plan.shortfall,
                });
            }
            consumptions.extend(rows);
        }

        for fact in itbis::facts_for_sale(sale) {
            PeriodRepository::insert_fact(&mut tx, &fact).await?;
        }

        let totals = itbis::sale_totals(&sale.lines);
        let draft = journal::build_sale_entry(sale, &totals, cogs)?;
        let entry = Self::post_draft(&mut tx, draft, now).await?;

        Self::append_audit(
            &mut tx,
            AuditAction::LotConsumed,
            "cost_consumption",
            &sale.id,
            actor,
            None,
            Some(serde_json::to_string(&consumptions).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        Ok(SaleOutcome {
            entry,
            consumptions,
            cogs_cents: cogs.cents(),
            shortfalls,
        })
    }

    /// Posts a supplier invoice: one new FIFO lot per line, paid-ITBIS
    /// facts, and the inventory entry (credit purchases post to
    /// AccountsPayable instead of Cash).
    pub async fn post_purchase(
        &self,
        purchase: &PurchaseEvent,
        actor: &str,
    ) -> EngineResult<PurchaseOutcome> {
        validation::validate_ref("purchase id", &purchase.id)?;
        for line in &purchase.lines {
            validation::validate_purchase_line(line)?;
        }

        let now = Utc::now();
        let mut tx = self.database().begin().await?;
        Self::guard_period_open(&mut tx, purchase.date).await?;

        let mut lots = Vec::new();
        for line in &purchase.lines {
            let rate = TaxRate::from_bps(line.tax_rate_bps);
            let lot = InventoryLot {
                id: Uuid::new_v4().to_string(),
                product_id: line.product_id.clone(),
                purchase_date: purchase.date,
                original_qty: line.quantity,
                remaining_qty: line.quantity,
                unit_cost_cents: line.unit_cost_cents,
                unit_cost_with_tax_cents: Money::from_cents(line.unit_cost_cents)
                    .with_itbis(rate)
                    .cents(),
                tax_rate_bps: line.tax_rate_bps,
                expiration_date: line.expiration_date,
                lot_number: line.lot_number.clone(),
                status: LotStatus::Active,
                created_at: now,
                updated_at: now,
            };
            LotRepository::insert(&mut tx, &lot).await?;
            Self::append_audit(
                &mut tx,
                AuditAction::LotCreated,
                "inventory_lot",
                &lot.id,
                actor,
                None,
                Some(serde_json::to_string(&lot).map_err(colmado_db::DbError::from)?),
            )
            .await?;
            lots.push(lot);
        }

        for fact in itbis::facts_for_purchase(purchase) {
            PeriodRepository::insert_fact(&mut tx, &fact).await?;
        }

        let totals = itbis::purchase_totals(&purchase.lines);
        let draft = journal::build_purchase_entry(purchase, &totals)?;
        let entry = Self::post_draft(&mut tx, draft, now).await?;

        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(
            purchase_id = %purchase.id,
            entry_number = entry.entry_number,
            lots = lots.len(),
            "Purchase posted"
        );
        Ok(PurchaseOutcome { entry, lots })
    }

    /// Posts a customer return against an earlier sale.
    ///
    /// Restocks the exact lots the sale consumed (newest allocation
    /// first) at their frozen costs, writes negative collected-ITBIS
    /// facts, and posts the mirror entry. Inventory and COGS round-trip
    /// to the centavo.
    pub async fn post_return(&self, ret: &ReturnEvent, actor: &str) -> EngineResult<ReturnOutcome> {
        validation::validate_ref("return id", &ret.id)?;
        validation::validate_ref("sale_ref", &ret.sale_ref)?;
        for line in &ret.lines {
            validation::validate_sale_line(line)?;
        }

        let outcome = self
            .with_retry("post_return", || self.try_post_return(ret, actor))
            .await?;

        info!(
            return_id = %ret.id,
            sale_ref = %ret.sale_ref,
            entry_number = outcome.entry.entry_number,
            restocked_cost_cents = outcome.restocked_cost_cents,
            "Return posted"
        );
        Ok(outcome)
    }

    async fn try_post_return(&self, ret: &ReturnEvent, actor: &str) -> EngineResult<ReturnOutcome> {
        let now = Utc::now();
        let mut tx = self.database().begin().await?;
        Self::guard_period_open(&mut tx, ret.date).await?;

        let sold = ConsumptionRepository::for_transaction_tx(&mut tx, &ret.sale_ref).await?;
        // All returns against one sale share this compensating ref, so
        // the cumulative returned quantity is queryable per sale.
        let return_ref = format!("{}:return", ret.sale_ref);
        let prior = ConsumptionRepository::for_transaction_tx(&mut tx, &return_ref).await?;

        let mut returnable: HashMap<String, i64> = HashMap::new();
        for c in &sold {
            if c.consumption_type != ConsumptionType::Return {
                *returnable.entry(c.product_id.clone()).or_insert(0) += c.quantity;
            }
        }
        for c in &prior {
            if let Some(q) = returnable.get_mut(&c.product_id) {
                *q -= c.quantity.min(*q);
            }
        }

        let mut limits: HashMap<String, i64> = HashMap::new();
        for line in &ret.lines {
            *limits.entry(line.product_id.clone()).or_insert(0) += line.quantity;
        }
        for (product_id, requested) in &limits {
            let available = returnable.get(product_id).copied().unwrap_or(0);
            if *requested > available {
                return Err(CoreError::ReturnExceedsSale {
                    sale_ref: ret.sale_ref.clone(),
                    product_id: product_id.clone(),
                    requested: *requested,
                    returnable: available,
                }
                .into());
            }
        }

        let (restocked, restocked_cost) =
            Self::restock_from(&mut tx, &sold, &prior, &limits, &return_ref, now).await?;

        for fact in itbis::facts_for_return(ret) {
            PeriodRepository::insert_fact(&mut tx, &fact).await?;
        }

        let totals = itbis::sale_totals(&ret.lines);
        let draft = journal::build_return_entry(ret, &totals, Money::from_cents(restocked_cost))?;
        let entry = Self::post_draft(&mut tx, draft, now).await?;

        Self::append_audit(
            &mut tx,
            AuditAction::LotConsumed,
            "cost_consumption",
            &ret.id,
            actor,
            None,
            Some(serde_json::to_string(&restocked).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        Ok(ReturnOutcome {
            entry,
            restocked,
            restocked_cost_cents: restocked_cost,
        })
    }

    /// Posts a manual entry from caller-supplied lines. The draft must
    /// balance; the period must be open.
    pub async fn post_manual(
        &self,
        entry_date: NaiveDate,
        description: &str,
        source_ref: &str,
        lines: Vec<JournalLine>,
        actor: &str,
    ) -> EngineResult<JournalEntry> {
        validation::validate_ref("source_ref", source_ref)?;

        let now = Utc::now();
        let mut tx = self.database().begin().await?;
        Self::guard_period_open(&mut tx, entry_date).await?;

        let draft = EntryDraft {
            entry_date,
            description: description.to_string(),
            source_type: SourceType::Manual,
            source_ref: source_ref.to_string(),
            lines,
        };
        let entry = Self::post_draft(&mut tx, draft, now).await?;

        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(entry_number = entry.entry_number, actor, "Manual entry posted");
        Ok(entry)
    }

    /// Voids a posted entry, keeping its lines for audit.
    ///
    /// Pending entries cannot be voided (nothing posted to undo), voided
    /// entries cannot be voided twice, and an entry inside a closed
    /// period needs the period reopened first.
    pub async fn void_entry(
        &self,
        entry_id: &str,
        reason: &str,
        actor: &str,
    ) -> EngineResult<JournalEntry> {
        validation::validate_ref("void reason", reason)?;

        let now = Utc::now();
        let mut tx = self.database().begin().await?;

        let before = JournalRepository::get_tx(&mut tx, entry_id).await?;
        match before.status {
            JournalStatus::Pending => {
                return Err(CoreError::CannotVoidPending {
                    entry_id: entry_id.to_string(),
                }
                .into());
            }
            JournalStatus::Voided => {
                return Err(CoreError::AlreadyVoided {
                    entry_id: entry_id.to_string(),
                }
                .into());
            }
            JournalStatus::Posted => {}
        }
        Self::guard_period_open(&mut tx, before.entry_date).await?;

        JournalRepository::void(&mut tx, entry_id, reason, now).await?;
        let after = JournalRepository::get_tx(&mut tx, entry_id).await?;

        Self::append_audit(
            &mut tx,
            AuditAction::JournalVoided,
            "journal_entry",
            entry_id,
            actor,
            Some(serde_json::to_string(&before).map_err(colmado_db::DbError::from)?),
            Some(serde_json::to_string(&after).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(entry_id, entry_number = after.entry_number, reason, "Entry voided");
        Ok(after)
    }
}
