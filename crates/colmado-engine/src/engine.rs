//! # Ledger Engine
//!
//! The orchestration core: owns the database handle, composes each
//! operation into one transaction, and retries the plan/execute cycle
//! when a compare-and-swap conflict shows the planned-against state went
//! stale.
//!
//! ## Posting Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ONE OPERATION = ONE TRANSACTION                                        │
//! │                                                                         │
//! │  begin ──► period guard ──► FIFO plan ──► CAS lot decrements            │
//! │        ──► consumption rows ──► tax facts ──► entry number              │
//! │        ──► journal entry ──► audit ──► commit                           │
//! │                                                                         │
//! │  Any CAS miss rolls the whole transaction back; the retry re-reads      │
//! │  lots and re-plans. Nothing partial ever persists.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use colmado_core::{
    fifo, validation, Account, AuditAction, AuditEntry, ConsumptionOutcome, ConsumptionType,
    CoreError, CostConsumption, EntryDraft, InventoryLot, JournalEntry, JournalLine, JournalStatus,
    LotStatus, Money, Period, PeriodStatus, SourceType, TaxRate,
};
use colmado_db::repository::sequence::SEQ_JOURNAL_ENTRY;
use colmado_db::{
    AuditRepository, ConsumptionRepository, Database, JournalRepository, LotRepository,
    PeriodRepository, SequenceRepository,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Engine
// =============================================================================

/// FIFO costing and accounting engine over one store's ledger.
///
/// Clone is cheap; the handle is shared between the POS front end and
/// report readers.
#[derive(Debug, Clone)]
pub struct LedgerEngine {
    db: Database,
    config: EngineConfig,
}

/// Input for creating an inventory lot outside the purchase path
/// (opening stock, stock count corrections upward).
#[derive(Debug, Clone)]
pub struct NewLot {
    pub product_id: String,
    pub purchase_date: NaiveDate,
    pub quantity: i64,
    /// Tax-exclusive unit cost in centavos.
    pub unit_cost_cents: i64,
    pub tax_rate_bps: u32,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

impl LedgerEngine {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        LedgerEngine { db, config }
    }

    /// The underlying database handle, for report readers.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Shared plumbing
    // =========================================================================

    /// Runs `f` until it succeeds, fails non-retryably, or the conflict
    /// budget runs out. Each call starts from a fresh read.
    pub(crate) async fn with_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let budget = self.config.max_conflict_retries;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match f().await {
                Err(e) if e.is_conflict() => {
                    if attempts > budget {
                        return Err(EngineError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts,
                        });
                    }
                    warn!(operation, attempts, "Stale plan, re-reading");
                }
                other => return other,
            }
        }
    }

    /// Rejects postings dated inside a closed or filed period.
    pub(crate) async fn guard_period_open(
        conn: &mut SqliteConnection,
        date: NaiveDate,
    ) -> EngineResult<()> {
        let period = Period::from_date(date);
        match PeriodRepository::status_tx(conn, period).await? {
            PeriodStatus::Open => Ok(()),
            PeriodStatus::Closed | PeriodStatus::Filed => Err(CoreError::PeriodClosed {
                period: period.to_string(),
            }
            .into()),
        }
    }

    /// Materializes a balanced draft into a posted entry with its number.
    pub(crate) fn finalize_entry(
        draft: EntryDraft,
        entry_number: i64,
        now: DateTime<Utc>,
    ) -> JournalEntry {
        let total_debit_cents = draft.total_debit().cents();
        let total_credit_cents = draft.total_credit().cents();
        JournalEntry {
            id: Uuid::new_v4().to_string(),
            entry_number,
            entry_date: draft.entry_date,
            description: draft.description,
            source_type: draft.source_type,
            source_ref: draft.source_ref,
            lines: draft.lines,
            total_debit_cents,
            total_credit_cents,
            status: JournalStatus::Posted,
            void_reason: None,
            voided_at: None,
            created_at: now,
        }
    }

    /// Posts a finalized draft: allocates the number, stamps it Posted,
    /// inserts it. Returns the stored entry.
    pub(crate) async fn post_draft(
        conn: &mut SqliteConnection,
        draft: EntryDraft,
        now: DateTime<Utc>,
    ) -> EngineResult<JournalEntry> {
        draft.ensure_balanced()?;
        let number = SequenceRepository::next(conn, SEQ_JOURNAL_ENTRY).await?;
        let entry = Self::finalize_entry(draft, number, now);
        JournalRepository::insert(conn, &entry).await?;
        Ok(entry)
    }

    /// Appends one audit record inside the caller's transaction.
    pub(crate) async fn append_audit(
        conn: &mut SqliteConnection,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        actor: &str,
        snapshot_before: Option<String>,
        snapshot_after: Option<String>,
    ) -> EngineResult<()> {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            actor: actor.to_string(),
            snapshot_before,
            snapshot_after,
            created_at: Utc::now(),
        };
        AuditRepository::insert(conn, &entry).await?;
        Ok(())
    }

    // =========================================================================
    // Inventory: lot creation
    // =========================================================================

    /// Records a new inventory lot directly (opening stock, upward count
    /// correction). Purchases go through `post_purchase`, which creates
    /// its lots and the journal entry together.
    pub async fn create_lot(&self, input: NewLot, actor: &str) -> EngineResult<InventoryLot> {
        validation::validate_quantity(input.quantity)?;
        validation::validate_unit_cost(input.unit_cost_cents)?;
        let rate = TaxRate::from_bps(input.tax_rate_bps);
        validation::validate_tax_rate(rate)?;
        validation::validate_ref("product_id", &input.product_id)?;

        let now = Utc::now();
        let lot = InventoryLot {
            id: Uuid::new_v4().to_string(),
            product_id: input.product_id,
            purchase_date: input.purchase_date,
            original_qty: input.quantity,
            remaining_qty: input.quantity,
            unit_cost_cents: input.unit_cost_cents,
            unit_cost_with_tax_cents: Money::from_cents(input.unit_cost_cents)
                .with_itbis(rate)
                .cents(),
            tax_rate_bps: input.tax_rate_bps,
            expiration_date: input.expiration_date,
            lot_number: input.lot_number,
            status: LotStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.begin().await?;
        LotRepository::insert(&mut tx, &lot).await?;
        let snapshot = serde_json::to_string(&lot).map_err(colmado_db::DbError::from)?;
        Self::append_audit(
            &mut tx,
            AuditAction::LotCreated,
            "inventory_lot",
            &lot.id,
            actor,
            None,
            Some(snapshot),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(lot_id = %lot.id, product_id = %lot.product_id, qty = lot.original_qty, "Lot created");
        Ok(lot)
    }

    /// Marks an active lot expired, excluding it from FIFO consumption.
    pub async fn expire_lot(&self, lot_id: &str, actor: &str) -> EngineResult<()> {
        let mut tx = self.db.begin().await?;
        LotRepository::set_status(&mut tx, lot_id, LotStatus::Active, LotStatus::Expired).await?;
        Self::append_audit(
            &mut tx,
            AuditAction::LotStatusChanged,
            "inventory_lot",
            lot_id,
            actor,
            Some("\"active\"".to_string()),
            Some("\"expired\"".to_string()),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;
        Ok(())
    }

    // =========================================================================
    // Inventory: consumption & reversal
    // =========================================================================

    /// Consumes stock FIFO for an adjustment or loss, posting the cost to
    /// the ledger (Dr COGS / Cr Inventory) when any was allocated.
    ///
    /// Sales go through `post_sale`; this path is for count corrections,
    /// breakage, expiry write-offs.
    pub async fn consume(
        &self,
        product_id: &str,
        quantity: i64,
        consumption_type: ConsumptionType,
        transaction_ref: &str,
        date: NaiveDate,
        actor: &str,
    ) -> EngineResult<ConsumptionOutcome> {
        validation::validate_ref("product_id", product_id)?;
        validation::validate_ref("transaction_ref", transaction_ref)?;
        validation::validate_quantity(quantity)?;

        self.with_retry("consume", || {
            self.try_consume(product_id, quantity, consumption_type, transaction_ref, date, actor)
        })
        .await
    }

    async fn try_consume(
        &self,
        product_id: &str,
        quantity: i64,
        consumption_type: ConsumptionType,
        transaction_ref: &str,
        date: NaiveDate,
        actor: &str,
    ) -> EngineResult<ConsumptionOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        Self::guard_period_open(&mut tx, date).await?;

        let (consumptions, plan) = Self::execute_fifo(
            &mut tx,
            product_id,
            quantity,
            consumption_type,
            transaction_ref,
            now,
        )
        .await?;

        let cost = Money::from_cents(plan.total_cost_cents);
        if !cost.is_zero() {
            let draft = EntryDraft {
                entry_date: date,
                description: format!("Stock {} {}", consumption_label(consumption_type), transaction_ref),
                source_type: SourceType::Adjustment,
                source_ref: transaction_ref.to_string(),
                lines: vec![
                    JournalLine::debit(Account::CostOfGoodsSold, cost),
                    JournalLine::credit(Account::Inventory, cost),
                ],
            };
            Self::post_draft(&mut tx, draft, now).await?;
        }

        Self::append_audit(
            &mut tx,
            AuditAction::LotConsumed,
            "cost_consumption",
            transaction_ref,
            actor,
            None,
            Some(serde_json::to_string(&consumptions).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        Ok(ConsumptionOutcome {
            total_cost_cents: plan.total_cost_cents,
            avg_unit_cost_cents: plan.avg_unit_cost_cents(),
            shortfall: plan.shortfall,
            consumptions,
        })
    }

    /// Plans and executes one FIFO consumption inside the caller's
    /// transaction: CAS decrements plus consumption rows.
    pub(crate) async fn execute_fifo(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
        consumption_type: ConsumptionType,
        transaction_ref: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<(Vec<CostConsumption>, fifo::AllocationPlan)> {
        let lots = LotRepository::fifo_lots_tx(conn, product_id).await?;
        let snapshots: Vec<fifo::LotSnapshot> = lots.iter().map(Into::into).collect();
        let plan = fifo::plan_consumption(&snapshots, quantity)?;

        for allocation in &plan.allocations {
            LotRepository::apply_delta(
                conn,
                &allocation.lot_id,
                -allocation.quantity,
                allocation.expected_remaining,
            )
            .await?;
        }

        let consumptions = fifo::consumptions_for_plan(
            &plan,
            product_id,
            transaction_ref,
            consumption_type,
            now,
            || Uuid::new_v4().to_string(),
        );
        for consumption in &consumptions {
            ConsumptionRepository::insert(conn, consumption).await?;
        }

        Ok((consumptions, plan))
    }

    /// Restocks lots from earlier consumptions, newest allocation first.
    ///
    /// `already_restocked` are compensating rows written by earlier
    /// reversals/returns against the same consumptions; their quantities
    /// are deducted from the newest allocations first (the same order
    /// this walk restocks in), so no allocation is ever put back twice.
    /// `limits` caps the restocked quantity per product (a partial
    /// return restocks less than the sale took). Returns the compensating
    /// consumption rows and the restored cost basis in centavos.
    pub(crate) async fn restock_from(
        conn: &mut SqliteConnection,
        consumptions: &[CostConsumption],
        already_restocked: &[CostConsumption],
        limits: &HashMap<String, i64>,
        reversal_ref: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<(Vec<CostConsumption>, i64)> {
        let mut wanted = limits.clone();

        let mut prior_by_lot: HashMap<&str, i64> = HashMap::new();
        for c in already_restocked {
            *prior_by_lot.entry(c.lot_id.as_str()).or_insert(0) += c.quantity;
        }

        let mut restocked = Vec::new();
        let mut total_cost = 0i64;

        // Walk newest-first so a partial return undoes the most recent
        // (most expensive under inflation) allocations first.
        for c in consumptions.iter().rev() {
            if c.consumption_type == ConsumptionType::Return {
                continue;
            }
            let mut row_qty = c.quantity;
            if let Some(prior) = prior_by_lot.get_mut(c.lot_id.as_str()) {
                let used = row_qty.min(*prior);
                row_qty -= used;
                *prior -= used;
            }
            if row_qty == 0 {
                continue;
            }
            let Some(remaining_wanted) = wanted.get_mut(&c.product_id) else {
                continue;
            };
            if *remaining_wanted == 0 {
                continue;
            }

            let qty = row_qty.min(*remaining_wanted);
            let lot = LotRepository::get_tx(conn, &c.lot_id).await?;
            LotRepository::apply_delta(conn, &lot.id, qty, lot.remaining_qty).await?;

            let row = CostConsumption {
                id: Uuid::new_v4().to_string(),
                lot_id: c.lot_id.clone(),
                product_id: c.product_id.clone(),
                transaction_ref: reversal_ref.to_string(),
                consumption_type: ConsumptionType::Return,
                quantity: qty,
                unit_cost_cents: c.unit_cost_cents,
                total_cost_cents: c.unit_cost_cents * qty,
                consumed_at: now,
            };
            ConsumptionRepository::insert(conn, &row).await?;

            total_cost += row.total_cost_cents;
            *remaining_wanted -= qty;
            restocked.push(row);
        }

        Ok((restocked, total_cost))
    }

    /// Fully reverses an earlier consumption: restocks every lot it drew
    /// from and posts the compensating entry (Dr Inventory / Cr COGS).
    ///
    /// The compensating rows carry `{transaction_ref}:reversal` so the
    /// original allocation trail stays intact.
    pub async fn reverse(
        &self,
        transaction_ref: &str,
        date: NaiveDate,
        actor: &str,
    ) -> EngineResult<ConsumptionOutcome> {
        validation::validate_ref("transaction_ref", transaction_ref)?;
        self.with_retry("reverse", || self.try_reverse(transaction_ref, date, actor))
            .await
    }

    async fn try_reverse(
        &self,
        transaction_ref: &str,
        date: NaiveDate,
        actor: &str,
    ) -> EngineResult<ConsumptionOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        Self::guard_period_open(&mut tx, date).await?;

        let originals =
            ConsumptionRepository::for_transaction_tx(&mut tx, transaction_ref).await?;
        let reversal_ref = format!("{transaction_ref}:reversal");
        let mut already =
            ConsumptionRepository::for_transaction_tx(&mut tx, &reversal_ref).await?;
        // Customer returns against the same transaction restock too.
        already.extend(
            ConsumptionRepository::for_transaction_tx(
                &mut tx,
                &format!("{transaction_ref}:return"),
            )
            .await?,
        );

        // What the original took, minus what earlier reversals and
        // returns already put back. Empty means nothing is left to undo.
        let mut wanted: HashMap<String, i64> = HashMap::new();
        for c in &originals {
            if c.consumption_type != ConsumptionType::Return {
                *wanted.entry(c.product_id.clone()).or_insert(0) += c.quantity;
            }
        }
        for c in &already {
            if let Some(q) = wanted.get_mut(&c.product_id) {
                *q -= c.quantity.min(*q);
            }
        }
        wanted.retain(|_, q| *q > 0);
        if wanted.is_empty() {
            return Err(CoreError::NothingToReverse {
                transaction_ref: transaction_ref.to_string(),
            }
            .into());
        }

        let (restocked, total_cost) =
            Self::restock_from(&mut tx, &originals, &already, &wanted, &reversal_ref, now).await?;

        let cost = Money::from_cents(total_cost);
        if !cost.is_zero() {
            let draft = EntryDraft {
                entry_date: date,
                description: format!("Reversal of {transaction_ref}"),
                source_type: SourceType::Adjustment,
                source_ref: reversal_ref.clone(),
                lines: vec![
                    JournalLine::debit(Account::Inventory, cost),
                    JournalLine::credit(Account::CostOfGoodsSold, cost),
                ],
            };
            Self::post_draft(&mut tx, draft, now).await?;
        }

        Self::append_audit(
            &mut tx,
            AuditAction::LotConsumed,
            "cost_consumption",
            &reversal_ref,
            actor,
            None,
            Some(serde_json::to_string(&restocked).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        let restocked_qty: i64 = restocked.iter().map(|c| c.quantity).sum();
        Ok(ConsumptionOutcome {
            avg_unit_cost_cents: if restocked_qty == 0 { 0 } else { total_cost / restocked_qty },
            total_cost_cents: total_cost,
            shortfall: 0,
            consumptions: restocked,
        })
    }
}

fn consumption_label(t: ConsumptionType) -> &'static str {
    match t {
        ConsumptionType::Sale => "sale",
        ConsumptionType::Return => "return",
        ConsumptionType::Adjustment => "adjustment",
        ConsumptionType::Loss => "loss",
    }
}
