//! End-to-end tests over a real (temp file) SQLite database: posting,
//! FIFO costing, returns, settlements, periods, shifts and concurrency.

use std::path::PathBuf;

use chrono::NaiveDate;
use uuid::Uuid;

use colmado_core::{
    Account, ConsumptionType, CoreError, JournalEntry, JournalStatus, Period, PurchaseEvent,
    PurchaseLine, ReturnEvent, SaleEvent, SaleLine, SettlementStatus, Tender,
};
use colmado_db::{Database, DbConfig, DbError};
use colmado_engine::{EngineConfig, EngineError, LedgerEngine, NewLot, NewSettlement};

// =============================================================================
// Harness
// =============================================================================

static TRACING: std::sync::Once = std::sync::Once::new();

/// Engine logs go to the test writer; enable with RUST_LOG.
fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A file-backed database so concurrent transactions get real pool
/// connections. Cleans up after itself.
struct TestLedger {
    engine: LedgerEngine,
    path: PathBuf,
}

impl TestLedger {
    async fn new() -> Self {
        init_tracing();
        let path = std::env::temp_dir().join(format!("colmado-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(path.clone())).await.unwrap();
        let engine = LedgerEngine::new(db, EngineConfig::default());
        TestLedger { engine, path }
    }
}

impl Drop for TestLedger {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn purchase(id: &str, day: NaiveDate, product: &str, qty: i64, cost: i64) -> PurchaseEvent {
    PurchaseEvent {
        id: id.to_string(),
        date: day,
        on_credit: false,
        lines: vec![PurchaseLine {
            product_id: product.to_string(),
            quantity: qty,
            unit_cost_cents: cost,
            tax_rate_bps: 1800,
            lot_number: None,
            expiration_date: None,
        }],
    }
}

fn sale(id: &str, day: NaiveDate, tender: Tender, product: &str, qty: i64, price: i64) -> SaleEvent {
    SaleEvent {
        id: id.to_string(),
        date: day,
        tender,
        lines: vec![SaleLine {
            product_id: product.to_string(),
            quantity: qty,
            unit_price_cents: price,
            tax_rate_bps: 1800,
        }],
    }
}

fn account_amounts(entry: &JournalEntry, account: Account) -> (i64, i64) {
    entry
        .lines
        .iter()
        .filter(|l| l.account == account)
        .fold((0, 0), |(d, c), l| (d + l.debit_cents, c + l.credit_cents))
}

// =============================================================================
// FIFO Costing
// =============================================================================

#[tokio::test]
async fn sale_consumes_lots_fifo_at_frozen_costs() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    // Older lot 5 @ 10.00, newer lot 5 @ 12.00.
    engine
        .post_purchase(&purchase("inv-1", date(2024, 1, 1), "arroz", 5, 1_000), "test")
        .await
        .unwrap();
    engine
        .post_purchase(&purchase("inv-2", date(2024, 1, 5), "arroz", 5, 1_200), "test")
        .await
        .unwrap();

    let outcome = engine
        .post_sale(&sale("sale-1", date(2024, 1, 10), Tender::Cash, "arroz", 7, 2_000), "test")
        .await
        .unwrap();

    // 5 × 10.00 + 2 × 12.00 = 74.00 COGS.
    assert_eq!(outcome.cogs_cents, 7_400);
    assert!(outcome.shortfalls.is_empty());
    assert_eq!(outcome.consumptions.len(), 2);
    assert_eq!(outcome.consumptions[0].quantity, 5);
    assert_eq!(outcome.consumptions[0].unit_cost_cents, 1_000);
    assert_eq!(outcome.consumptions[1].quantity, 2);
    assert_eq!(outcome.consumptions[1].unit_cost_cents, 1_200);

    // Older lot drained, newer lot holds the remainder.
    assert_eq!(engine.database().lots().on_hand("arroz").await.unwrap(), 3);

    // Revenue side: 7 × 20.00 = 140.00, ITBIS 25.20, cash 165.20.
    let entry = &outcome.entry;
    assert!(entry.is_balanced());
    assert_eq!(account_amounts(entry, Account::Cash), (16_520, 0));
    assert_eq!(account_amounts(entry, Account::Revenue), (0, 14_000));
    assert_eq!(account_amounts(entry, Account::ItbisPayable), (0, 2_520));
    assert_eq!(account_amounts(entry, Account::CostOfGoodsSold), (7_400, 0));
    assert_eq!(account_amounts(entry, Account::Inventory), (0, 7_400));
}

#[tokio::test]
async fn oversell_surfaces_shortfall_instead_of_blocking() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .post_purchase(&purchase("inv-1", date(2024, 2, 1), "aceite", 6, 900), "test")
        .await
        .unwrap();

    let outcome = engine
        .post_sale(&sale("sale-1", date(2024, 2, 3), Tender::Cash, "aceite", 10, 1_500), "test")
        .await
        .unwrap();

    assert_eq!(outcome.shortfalls.len(), 1);
    assert_eq!(outcome.shortfalls[0].quantity, 4);
    // COGS only covers the 6 units that existed.
    assert_eq!(outcome.cogs_cents, 6 * 900);
    assert_eq!(engine.database().lots().on_hand("aceite").await.unwrap(), 0);
    // Revenue is still the full 10 units; the entry balances regardless.
    assert!(outcome.entry.is_balanced());
    assert_eq!(account_amounts(&outcome.entry, Account::Revenue), (0, 15_000));
}

#[tokio::test]
async fn quantity_is_conserved_through_sale_and_return() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .post_purchase(&purchase("inv-1", date(2024, 3, 1), "habichuela", 10, 800), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-1", date(2024, 3, 2), Tender::Cash, "habichuela", 4, 1_400), "test")
        .await
        .unwrap();

    let ret = ReturnEvent {
        id: "ret-1".to_string(),
        date: date(2024, 3, 3),
        sale_ref: "sale-1".to_string(),
        lines: vec![SaleLine {
            product_id: "habichuela".to_string(),
            quantity: 2,
            unit_price_cents: 1_400,
            tax_rate_bps: 1800,
        }],
    };
    engine.post_return(&ret, "test").await.unwrap();

    let report = engine
        .database()
        .consumptions()
        .conservation("habichuela")
        .await
        .unwrap();
    assert!(report.holds(), "conservation violated: {report:?}");
    assert_eq!(report.purchased, 10);
    assert_eq!(report.consumed, 4);
    assert_eq!(report.returned, 2);
    assert_eq!(report.remaining, 8);

    // Both movements left a consumption audit trail.
    let audit = engine.database().audit();
    let sale_audits = audit.for_entity("cost_consumption", "sale-1").await.unwrap();
    assert!(sale_audits
        .iter()
        .any(|a| a.action == colmado_core::AuditAction::LotConsumed));
    let return_audits = audit.for_entity("cost_consumption", "ret-1").await.unwrap();
    assert!(return_audits
        .iter()
        .any(|a| a.action == colmado_core::AuditAction::LotConsumed));
}

#[tokio::test]
async fn second_full_return_against_one_sale_is_rejected() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    // Another sale leaves headroom in the lot, so only per-sale
    // bookkeeping can catch the repeat.
    engine
        .post_purchase(&purchase("inv-1", date(2024, 3, 1), "galleta", 10, 800), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-a", date(2024, 3, 2), Tender::Cash, "galleta", 4, 1_500), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-b", date(2024, 3, 2), Tender::Cash, "galleta", 4, 1_500), "test")
        .await
        .unwrap();

    let full_return = |id: &str, sale_ref: &str, qty: i64| ReturnEvent {
        id: id.to_string(),
        date: date(2024, 3, 3),
        sale_ref: sale_ref.to_string(),
        lines: vec![SaleLine {
            product_id: "galleta".to_string(),
            quantity: qty,
            unit_price_cents: 1_500,
            tax_rate_bps: 1800,
        }],
    };

    engine.post_return(&full_return("ret-1", "sale-a", 4), "test").await.unwrap();
    assert_eq!(engine.database().lots().on_hand("galleta").await.unwrap(), 6);

    let err = engine
        .post_return(&full_return("ret-2", "sale-a", 4), "test")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::ReturnExceedsSale { .. })
    ));
    assert_eq!(engine.database().lots().on_hand("galleta").await.unwrap(), 6);

    // The other sale's own return is unaffected.
    engine.post_return(&full_return("ret-3", "sale-b", 2), "test").await.unwrap();
    assert_eq!(engine.database().lots().on_hand("galleta").await.unwrap(), 8);

    let report = engine
        .database()
        .consumptions()
        .conservation("galleta")
        .await
        .unwrap();
    assert!(report.holds(), "conservation violated: {report:?}");
}

#[tokio::test]
async fn partial_returns_accumulate_to_the_sold_quantity() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .post_purchase(&purchase("inv-1", date(2024, 4, 1), "jabon", 10, 600), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-1", date(2024, 4, 2), Tender::Cash, "jabon", 4, 1_000), "test")
        .await
        .unwrap();

    let partial = |id: &str, qty: i64| ReturnEvent {
        id: id.to_string(),
        date: date(2024, 4, 3),
        sale_ref: "sale-1".to_string(),
        lines: vec![SaleLine {
            product_id: "jabon".to_string(),
            quantity: qty,
            unit_price_cents: 1_000,
            tax_rate_bps: 1800,
        }],
    };

    // 2 + 2 exhausts the sale exactly; the next unit is refused.
    engine.post_return(&partial("ret-1", 2), "test").await.unwrap();
    engine.post_return(&partial("ret-2", 2), "test").await.unwrap();
    assert_eq!(engine.database().lots().on_hand("jabon").await.unwrap(), 10);

    let err = engine.post_return(&partial("ret-3", 1), "test").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::ReturnExceedsSale { .. })
    ));
    assert_eq!(engine.database().lots().on_hand("jabon").await.unwrap(), 10);
}

#[tokio::test]
async fn return_restocks_newest_allocation_first_at_original_cost() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .post_purchase(&purchase("inv-1", date(2024, 1, 1), "cafe", 5, 1_000), "test")
        .await
        .unwrap();
    engine
        .post_purchase(&purchase("inv-2", date(2024, 1, 5), "cafe", 5, 1_200), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-1", date(2024, 1, 10), Tender::Cash, "cafe", 7, 2_000), "test")
        .await
        .unwrap();

    let ret = ReturnEvent {
        id: "ret-1".to_string(),
        date: date(2024, 1, 12),
        sale_ref: "sale-1".to_string(),
        lines: vec![SaleLine {
            product_id: "cafe".to_string(),
            quantity: 2,
            unit_price_cents: 2_000,
            tax_rate_bps: 1800,
        }],
    };
    let outcome = engine.post_return(&ret, "test").await.unwrap();

    // The sale took 5 @ 10.00 then 2 @ 12.00; a 2-unit return undoes the
    // newest allocation, restoring exactly 24.00 of cost basis.
    assert_eq!(outcome.restocked_cost_cents, 2_400);
    assert_eq!(outcome.restocked.len(), 1);
    assert_eq!(outcome.restocked[0].unit_cost_cents, 1_200);
    assert_eq!(outcome.restocked[0].consumption_type, ConsumptionType::Return);

    // Refund side: 2 × 20.00 = 40.00 plus ITBIS 7.20 back to the customer.
    let entry = &outcome.entry;
    assert!(entry.is_balanced());
    assert_eq!(account_amounts(entry, Account::SalesReturns), (4_000, 0));
    assert_eq!(account_amounts(entry, Account::ItbisPayable), (720, 0));
    assert_eq!(account_amounts(entry, Account::Cash), (0, 4_720));
    assert_eq!(account_amounts(entry, Account::Inventory), (2_400, 0));
    assert_eq!(account_amounts(entry, Account::CostOfGoodsSold), (0, 2_400));
}

#[tokio::test]
async fn reverse_restores_every_lot_the_consumption_drew_from() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .create_lot(
            NewLot {
                product_id: "azucar".to_string(),
                purchase_date: date(2024, 4, 1),
                quantity: 8,
                unit_cost_cents: 700,
                tax_rate_bps: 1800,
                lot_number: None,
                expiration_date: None,
            },
            "test",
        )
        .await
        .unwrap();

    engine
        .consume("azucar", 5, ConsumptionType::Loss, "loss-1", date(2024, 4, 2), "test")
        .await
        .unwrap();
    assert_eq!(engine.database().lots().on_hand("azucar").await.unwrap(), 3);

    let outcome = engine.reverse("loss-1", date(2024, 4, 3), "test").await.unwrap();
    assert_eq!(outcome.total_cost_cents, 5 * 700);
    assert_eq!(engine.database().lots().on_hand("azucar").await.unwrap(), 8);

    // Nothing left to reverse the second time.
    let err = engine.reverse("loss-1", date(2024, 4, 3), "test").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::NothingToReverse { .. })
    ));
}

// =============================================================================
// Periods & Tax
// =============================================================================

#[tokio::test]
async fn closed_period_rejects_postings_until_reopened() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;
    let period = Period::new(2024, 1).unwrap();

    engine
        .post_purchase(&purchase("inv-1", date(2024, 1, 1), "pan", 10, 500), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-1", date(2024, 1, 5), Tender::Cash, "pan", 2, 900), "test")
        .await
        .unwrap();

    engine.close_period(period, "contador").await.unwrap();

    let err = engine
        .post_sale(&sale("sale-2", date(2024, 1, 20), Tender::Cash, "pan", 1, 900), "test")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::PeriodClosed { .. })));

    // February is unaffected.
    engine
        .post_sale(&sale("sale-3", date(2024, 2, 1), Tender::Cash, "pan", 1, 900), "test")
        .await
        .unwrap();

    engine
        .reopen_period(period, "late supplier invoice", "contador")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-2", date(2024, 1, 20), Tender::Cash, "pan", 1, 900), "test")
        .await
        .unwrap();

    // The override left a trail.
    let audits = engine
        .database()
        .audit()
        .for_entity("itbis_period", "2024-01")
        .await
        .unwrap();
    assert!(audits
        .iter()
        .any(|a| a.action == colmado_core::AuditAction::PeriodReopened));
}

#[tokio::test]
async fn period_aggregation_is_idempotent() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;
    let period = Period::new(2024, 5).unwrap();

    engine
        .post_purchase(&purchase("inv-1", date(2024, 5, 2), "leche", 20, 600), "test")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-1", date(2024, 5, 3), Tender::Cash, "leche", 5, 1_000), "test")
        .await
        .unwrap();

    let first = engine.accumulate_period(period).await.unwrap();
    let second = engine.accumulate_period(period).await.unwrap();

    // Same facts in, same figures out - no double counting.
    assert_eq!(first.collected_standard_cents, second.collected_standard_cents);
    assert_eq!(first.paid_standard_cents, second.paid_standard_cents);
    assert_eq!(first.net_due_cents, second.net_due_cents);

    // Collected 18% of 50.00 = 9.00; paid 18% of 120.00 = 21.60.
    assert_eq!(first.collected_standard_cents, 900);
    assert_eq!(first.paid_standard_cents, 2_160);
    assert_eq!(first.net_due_cents, 900 - 2_160);
    assert!(first.net_due_consistent());
}

#[tokio::test]
async fn filed_period_requires_audited_reopen() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;
    let period = Period::new(2024, 6).unwrap();

    // A quiet month can close directly (nothing pending inside it).
    engine.close_period(period, "contador").await.unwrap();
    engine.file_period(period, "contador").await.unwrap();

    let err = engine.file_period(period, "contador").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::PeriodNotClosed { .. })
    ));

    engine
        .reopen_period(period, "DGII amendment", "contador")
        .await
        .unwrap();
}

// =============================================================================
// Settlements
// =============================================================================

#[tokio::test]
async fn card_settlement_clears_receivable_and_records_retention() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .post_purchase(&purchase("inv-1", date(2024, 7, 1), "pollo", 10, 4_000), "test")
        .await
        .unwrap();
    // Card sale: 100.00 + 18.00 ITBIS = 118.00 into CardReceivable.
    let sale_outcome = engine
        .post_sale(&sale("sale-1", date(2024, 7, 2), Tender::Card, "pollo", 2, 5_000), "test")
        .await
        .unwrap();
    assert_eq!(
        account_amounts(&sale_outcome.entry, Account::CardReceivable),
        (11_800, 0)
    );

    // Deposit: gross 118.00, commission 2.95, ITBIS on commission 0.53.
    let settlement = engine
        .record_settlement(
            NewSettlement {
                settlement_date: date(2024, 7, 4),
                processor: "CardNET".to_string(),
                gross_cents: 11_800,
                commission_cents: 295,
                commission_tax_cents: 53,
                net_cents: 11_452,
                sale_refs: vec!["sale-1".to_string()],
            },
            "test",
        )
        .await
        .unwrap();

    let entry = engine.reconcile_settlement(&settlement.id, "test").await.unwrap();
    assert!(entry.is_balanced());
    assert_eq!(account_amounts(&entry, Account::Cash), (11_452, 0));
    assert_eq!(account_amounts(&entry, Account::CommissionExpense), (295, 0));
    assert_eq!(account_amounts(&entry, Account::ItbisReceivable), (53, 0));
    assert_eq!(account_amounts(&entry, Account::CardReceivable), (0, 11_800));

    let stored = engine
        .database()
        .settlements()
        .get_by_id(&settlement.id)
        .await
        .unwrap();
    assert_eq!(stored.status, SettlementStatus::Reconciled);
    assert_eq!(stored.journal_entry_id.as_deref(), Some(entry.id.as_str()));

    // 2% retention on the 18.00 of settled ITBIS shows up in the period.
    let summary = engine
        .accumulate_period(Period::new(2024, 7).unwrap())
        .await
        .unwrap();
    assert_eq!(summary.retained_cents, 36);
    assert!(summary.net_due_consistent());
}

#[tokio::test]
async fn inconsistent_settlement_amounts_are_rejected() {
    let ledger = TestLedger::new().await;

    let err = ledger
        .engine
        .record_settlement(
            NewSettlement {
                settlement_date: date(2024, 7, 4),
                processor: "AZUL".to_string(),
                gross_cents: 10_000,
                commission_cents: 250,
                commission_tax_cents: 45,
                net_cents: 9_800, // should be 9_705
                sale_refs: vec![],
            },
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::SettlementAmountMismatch { .. })
    ));
}

// =============================================================================
// Journal Lifecycle
// =============================================================================

#[tokio::test]
async fn voiding_keeps_lines_and_refuses_double_void() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    let entry = engine
        .post_manual(
            date(2024, 8, 1),
            "Owner capital contribution",
            "capital-1",
            vec![
                colmado_core::JournalLine::debit(Account::Cash, colmado_core::Money::from_cents(50_000)),
                colmado_core::JournalLine::credit(Account::Revenue, colmado_core::Money::from_cents(50_000)),
            ],
            "dueno",
        )
        .await
        .unwrap();

    let voided = engine
        .void_entry(&entry.id, "entered twice", "dueno")
        .await
        .unwrap();
    assert_eq!(voided.status, JournalStatus::Voided);
    assert_eq!(voided.lines.len(), 2);
    assert_eq!(voided.void_reason.as_deref(), Some("entered twice"));

    let err = engine
        .void_entry(&entry.id, "again", "dueno")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::AlreadyVoided { .. })));
}

#[tokio::test]
async fn entry_numbers_never_repeat() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    engine
        .post_purchase(&purchase("inv-1", date(2024, 9, 1), "yuca", 30, 300), "test")
        .await
        .unwrap();
    let mut numbers = Vec::new();
    for i in 0..5 {
        let outcome = engine
            .post_sale(
                &sale(&format!("sale-{i}"), date(2024, 9, 2), Tender::Cash, "yuca", 1, 500),
                "test",
            )
            .await
            .unwrap();
        numbers.push(outcome.entry.entry_number);
    }

    let mut deduped = numbers.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), numbers.len());
}

#[tokio::test]
async fn unbalanced_manual_entry_is_rejected() {
    let ledger = TestLedger::new().await;

    let err = ledger
        .engine
        .post_manual(
            date(2024, 8, 1),
            "Broken entry",
            "bad-1",
            vec![
                colmado_core::JournalLine::debit(Account::Cash, colmado_core::Money::from_cents(100)),
                colmado_core::JournalLine::credit(Account::Revenue, colmado_core::Money::from_cents(90)),
            ],
            "test",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::UnbalancedEntry { .. })
    ));
}

// =============================================================================
// Shifts
// =============================================================================

#[tokio::test]
async fn shift_close_posts_cash_variance() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;
    let today = chrono::Utc::now().date_naive();

    let shift = engine.open_shift(5_000, "cajero").await.unwrap();

    // Only one shift at a time.
    let err = engine.open_shift(1_000, "cajero").await.unwrap_err();
    assert!(matches!(err, EngineError::ShiftAlreadyOpen { .. }));

    engine
        .post_purchase(&purchase("inv-1", today, "platano", 10, 200), "cajero")
        .await
        .unwrap();
    engine
        .post_sale(&sale("sale-1", today, Tender::Cash, "platano", 5, 400), "cajero")
        .await
        .unwrap();

    // Expected: 50.00 float - 23.60 purchase + 23.60 sale = wait, the
    // purchase paid cash too. float 5000 - 2360 + 2360 = 5000.
    // Purchase: 10 × 2.00 + ITBIS 3.60 = 23.60 out; sale 5 × 4.00 +
    // ITBIS 3.60 = 23.60 in. Net zero movement.
    let closed = engine.close_shift(&shift.id, 4_700, "cajero").await.unwrap();
    assert_eq!(closed.expected_cash_cents, Some(5_000));
    assert_eq!(closed.counted_cash_cents, Some(4_700));
    assert_eq!(closed.cash_difference_cents, Some(-300));

    // The shortage reached the ledger.
    let entries = engine
        .database()
        .journal()
        .for_source(colmado_core::SourceType::ShiftClose, &shift.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(account_amounts(&entries[0], Account::CashOverShort), (300, 0));

    let err = engine.close_shift(&shift.id, 4_700, "cajero").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(CoreError::ShiftAlreadyClosed { .. })
    ));
}

// =============================================================================
// NCF
// =============================================================================

#[tokio::test]
async fn ncf_numbers_are_sequential_per_series() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    let first = engine.issue_ncf("B02", "sale-1", "cajero").await.unwrap();
    let second = engine.issue_ncf("B02", "sale-2", "cajero").await.unwrap();
    let other_series = engine.issue_ncf("B01", "sale-3", "cajero").await.unwrap();

    assert_eq!(first, "B0200000001");
    assert_eq!(second, "B0200000002");
    assert_eq!(other_series, "B0100000001");

    engine.void_ncf(&first, "spoiled receipt", "cajero").await.unwrap();
    let audits = engine.database().audit().for_entity("ncf", &first).await.unwrap();
    assert_eq!(audits.len(), 2); // issue + void
}

#[tokio::test]
async fn voiding_an_unissued_ncf_is_rejected() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    let issued = engine.issue_ncf("B02", "sale-1", "cajero").await.unwrap();

    // Beyond what the series has handed out.
    let err = engine
        .void_ncf("B0200000099", "typo", "cajero")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NcfNotIssued { .. })));

    // A series that was never configured.
    let err = engine
        .void_ncf("Z9900000001", "typo", "cajero")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NcfNotIssued { .. })));

    // Not series-plus-eight-digits at all.
    let err = engine.void_ncf("B02-17", "typo", "cajero").await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::NcfNotIssued { .. })));

    // The genuinely issued number still voids.
    engine.void_ncf(&issued, "cancelled sale", "cajero").await.unwrap();
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn concurrent_consumption_never_oversells() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;
    let today = chrono::Utc::now().date_naive();

    engine
        .post_purchase(&purchase("inv-1", today, "queso", 6, 1_500), "test")
        .await
        .unwrap();

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .consume("queso", 5, ConsumptionType::Loss, "loss-a", today, "test")
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .consume("queso", 5, ConsumptionType::Loss, "loss-b", today, "test")
                .await
        })
    };

    let outcome_a = a.await.unwrap().unwrap();
    let outcome_b = b.await.unwrap().unwrap();

    let allocated_a: i64 = outcome_a.consumptions.iter().map(|c| c.quantity).sum();
    let allocated_b: i64 = outcome_b.consumptions.iter().map(|c| c.quantity).sum();

    // Whatever interleaving happened, only 6 units existed.
    assert_eq!(allocated_a + allocated_b, 6);
    assert_eq!(outcome_a.shortfall + outcome_b.shortfall, 4);
    assert_eq!(engine.database().lots().on_hand("queso").await.unwrap(), 0);

    let report = engine
        .database()
        .consumptions()
        .conservation("queso")
        .await
        .unwrap();
    assert!(report.holds(), "conservation violated: {report:?}");
}

#[tokio::test]
async fn stale_lot_guard_misses_instead_of_overwriting() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    let lot = engine
        .create_lot(
            NewLot {
                product_id: "sal".to_string(),
                purchase_date: date(2024, 10, 1),
                quantity: 6,
                unit_cost_cents: 250,
                tax_rate_bps: 0,
                lot_number: None,
                expiration_date: None,
            },
            "test",
        )
        .await
        .unwrap();

    // A decrement planned against a remaining quantity that is no longer
    // there must miss, not clobber.
    let mut tx = engine.database().begin().await.unwrap();
    let err = colmado_db::LotRepository::apply_delta(&mut tx, &lot.id, -5, 4)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConcurrentModification { .. }));
}

#[tokio::test]
async fn impossible_delta_fails_fast_instead_of_retrying() {
    let ledger = TestLedger::new().await;
    let engine = &ledger.engine;

    let lot = engine
        .create_lot(
            NewLot {
                product_id: "vela".to_string(),
                purchase_date: date(2024, 10, 1),
                quantity: 6,
                unit_cost_cents: 250,
                tax_rate_bps: 0,
                lot_number: None,
                expiration_date: None,
            },
            "test",
        )
        .await
        .unwrap();

    let mut tx = engine.database().begin().await.unwrap();

    // The guard matches the fresh remaining quantity, so the miss is the
    // delta itself: no retry can make 6 cover 10.
    let err = colmado_db::LotRepository::apply_delta(&mut tx, &lot.id, -10, 6)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Invariant(CoreError::InsufficientLotQuantity { .. })
    ));
    assert!(!err.is_retryable());

    // Restocking past the original quantity is refused the same way.
    let err = colmado_db::LotRepository::apply_delta(&mut tx, &lot.id, 1, 6)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Invariant(CoreError::InsufficientLotQuantity { .. })
    ));
}
