//! # Journal Entry Construction
//!
//! Pure builders that turn sales, purchases, returns, settlements and
//! shift closes into balanced multi-line journal entries.
//!
//! ## Posting Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SALE (cash, RD$100 + RD$18 ITBIS, COGS RD$60)                          │
//! │     Dr Cash                 118.00                                      │
//! │        Cr Revenue                    100.00                             │
//! │        Cr ITBIS Payable               18.00                             │
//! │     Dr COGS                  60.00                                      │
//! │        Cr Inventory                   60.00                             │
//! │                                                                         │
//! │  PURCHASE (credit, RD$500 + RD$90 ITBIS)                                │
//! │     Dr Inventory            500.00                                      │
//! │     Dr ITBIS Receivable      90.00                                      │
//! │        Cr Accounts Payable           590.00                             │
//! │                                                                         │
//! │  RETURN mirrors the sale through SalesReturns; SETTLEMENT splits        │
//! │  the card deposit into net cash, commission and its tax; SHIFT          │
//! │  CLOSE books only the drawer variance.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every builder finishes with a balance check. `UnbalancedEntry` from a
//! builder is a defect signal - the caller aborts the transaction and
//! logs loudly; it is never corrected silently.

use chrono::NaiveDate;

use crate::error::{CoreError, CoreResult};
use crate::itbis::TransactionTotals;
use crate::money::Money;
use crate::types::{
    Account, CardSettlement, JournalLine, PurchaseEvent, ReturnEvent, SaleEvent, SourceType,
    Tender,
};

// =============================================================================
// Entry Draft
// =============================================================================

/// A constructed-but-unpersisted journal entry.
///
/// The engine allocates the entry number and id when it persists the
/// draft; keeping those out of the builder keeps construction pure.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub entry_date: NaiveDate,
    pub description: String,
    pub source_type: SourceType,
    pub source_ref: String,
    pub lines: Vec<JournalLine>,
}

impl EntryDraft {
    /// Sum of debit amounts.
    pub fn total_debit(&self) -> Money {
        self.lines
            .iter()
            .map(|l| Money::from_cents(l.debit_cents))
            .sum()
    }

    /// Sum of credit amounts.
    pub fn total_credit(&self) -> Money {
        self.lines
            .iter()
            .map(|l| Money::from_cents(l.credit_cents))
            .sum()
    }

    /// Verifies the debit == credit invariant, exactly to the centavo.
    pub fn ensure_balanced(&self) -> CoreResult<()> {
        let debit = self.total_debit();
        let credit = self.total_credit();
        if debit != credit {
            return Err(CoreError::UnbalancedEntry {
                origin: format!("{:?}:{}", self.source_type, self.source_ref),
                total_debit_cents: debit.cents(),
                total_credit_cents: credit.cents(),
            });
        }
        Ok(())
    }
}

/// Pushes a line only when the amount is nonzero - zero-amount lines are
/// noise on the ledger.
fn push_debit(lines: &mut Vec<JournalLine>, account: Account, amount: Money) {
    if !amount.is_zero() {
        lines.push(JournalLine::debit(account, amount));
    }
}

fn push_credit(lines: &mut Vec<JournalLine>, account: Account, amount: Money) {
    if !amount.is_zero() {
        lines.push(JournalLine::credit(account, amount));
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Builds the entry for a finalized sale.
///
/// `cogs` is the total cost from the sale's FIFO consumptions; a sale
/// with full shortfall (no lots) carries zero COGS and posts only the
/// revenue side.
pub fn build_sale_entry(sale: &SaleEvent, totals: &TransactionTotals, cogs: Money) -> CoreResult<EntryDraft> {
    let mut lines = Vec::new();

    let debit_account = match sale.tender {
        Tender::Cash => Account::Cash,
        Tender::Card => Account::CardReceivable,
    };
    push_debit(&mut lines, debit_account, totals.total());
    push_credit(&mut lines, Account::Revenue, totals.subtotal());
    push_credit(&mut lines, Account::ItbisPayable, totals.tax());

    push_debit(&mut lines, Account::CostOfGoodsSold, cogs);
    push_credit(&mut lines, Account::Inventory, cogs);

    let draft = EntryDraft {
        entry_date: sale.date,
        description: format!("Sale {}", sale.id),
        source_type: SourceType::Sale,
        source_ref: sale.id.clone(),
        lines,
    };
    draft.ensure_balanced()?;
    Ok(draft)
}

/// Builds the entry for a recorded supplier invoice.
pub fn build_purchase_entry(
    purchase: &PurchaseEvent,
    totals: &TransactionTotals,
) -> CoreResult<EntryDraft> {
    let mut lines = Vec::new();

    push_debit(&mut lines, Account::Inventory, totals.subtotal());
    push_debit(&mut lines, Account::ItbisReceivable, totals.tax());

    let credit_account = if purchase.on_credit {
        Account::AccountsPayable
    } else {
        Account::Cash
    };
    push_credit(&mut lines, credit_account, totals.total());

    let draft = EntryDraft {
        entry_date: purchase.date,
        description: format!("Purchase {}", purchase.id),
        source_type: SourceType::Purchase,
        source_ref: purchase.id.clone(),
        lines,
    };
    draft.ensure_balanced()?;
    Ok(draft)
}

/// Builds the entry for a customer return.
///
/// `restocked_cost` is the cost basis restored by reversing the original
/// consumptions - the exact amount the sale expensed, so Inventory and
/// COGS round-trip to the centavo.
pub fn build_return_entry(
    ret: &ReturnEvent,
    totals: &TransactionTotals,
    restocked_cost: Money,
) -> CoreResult<EntryDraft> {
    let mut lines = Vec::new();

    push_debit(&mut lines, Account::SalesReturns, totals.subtotal());
    push_debit(&mut lines, Account::ItbisPayable, totals.tax());
    push_credit(&mut lines, Account::Cash, totals.total());

    push_debit(&mut lines, Account::Inventory, restocked_cost);
    push_credit(&mut lines, Account::CostOfGoodsSold, restocked_cost);

    let draft = EntryDraft {
        entry_date: ret.date,
        description: format!("Return {} against sale {}", ret.id, ret.sale_ref),
        source_type: SourceType::Return,
        source_ref: ret.id.clone(),
        lines,
    };
    draft.ensure_balanced()?;
    Ok(draft)
}

/// Builds the entry for a card settlement batch.
///
/// Validates `net = gross - commission - tax_on_commission` before
/// constructing anything.
pub fn build_settlement_entry(settlement: &CardSettlement) -> CoreResult<EntryDraft> {
    if !settlement.amounts_consistent() {
        return Err(CoreError::SettlementAmountMismatch {
            settlement_id: settlement.id.clone(),
            gross_cents: settlement.gross_cents,
            commission_cents: settlement.commission_cents,
            commission_tax_cents: settlement.commission_tax_cents,
            net_cents: settlement.net_cents,
        });
    }

    let mut lines = Vec::new();
    push_debit(&mut lines, Account::Cash, Money::from_cents(settlement.net_cents));
    push_debit(
        &mut lines,
        Account::CommissionExpense,
        Money::from_cents(settlement.commission_cents),
    );
    // ITBIS charged on the processor's commission is creditable input tax.
    push_debit(
        &mut lines,
        Account::ItbisReceivable,
        Money::from_cents(settlement.commission_tax_cents),
    );
    push_credit(
        &mut lines,
        Account::CardReceivable,
        Money::from_cents(settlement.gross_cents),
    );

    let draft = EntryDraft {
        entry_date: settlement.settlement_date,
        description: format!("{} settlement {}", settlement.processor, settlement.id),
        source_type: SourceType::Settlement,
        source_ref: settlement.id.clone(),
        lines,
    };
    draft.ensure_balanced()?;
    Ok(draft)
}

/// Builds the variance entry for a shift close, if any.
///
/// Returns `None` when counted cash matched expected - a clean drawer
/// needs no entry.
pub fn build_shift_close_entry(
    shift_id: &str,
    close_date: NaiveDate,
    cash_difference: Money,
) -> CoreResult<Option<EntryDraft>> {
    if cash_difference.is_zero() {
        return Ok(None);
    }

    let magnitude = cash_difference.abs();
    let lines = if cash_difference.is_negative() {
        // Shortage: drawer held less than the ledger says.
        vec![
            JournalLine::debit(Account::CashOverShort, magnitude),
            JournalLine::credit(Account::Cash, magnitude),
        ]
    } else {
        // Overage.
        vec![
            JournalLine::debit(Account::Cash, magnitude),
            JournalLine::credit(Account::CashOverShort, magnitude),
        ]
    };

    let draft = EntryDraft {
        entry_date: close_date,
        description: format!("Shift {shift_id} cash variance {cash_difference}"),
        source_type: SourceType::ShiftClose,
        source_ref: shift_id.to_string(),
        lines,
    };
    draft.ensure_balanced()?;
    Ok(Some(draft))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itbis::sale_totals;
    use crate::types::SaleLine;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cash_sale() -> SaleEvent {
        SaleEvent {
            id: "sale-1".to_string(),
            date: date(2024, 1, 10),
            tender: Tender::Cash,
            lines: vec![SaleLine {
                product_id: "p1".to_string(),
                quantity: 1,
                unit_price_cents: 10_000,
                tax_rate_bps: 1800,
            }],
        }
    }

    fn line_amount(draft: &EntryDraft, account: Account) -> (i64, i64) {
        draft
            .lines
            .iter()
            .filter(|l| l.account == account)
            .fold((0, 0), |(d, c), l| (d + l.debit_cents, c + l.credit_cents))
    }

    #[test]
    fn test_sale_entry_shape() {
        let sale = cash_sale();
        let totals = sale_totals(&sale.lines);
        let draft = build_sale_entry(&sale, &totals, Money::from_cents(6_000)).unwrap();

        assert_eq!(line_amount(&draft, Account::Cash), (11_800, 0));
        assert_eq!(line_amount(&draft, Account::Revenue), (0, 10_000));
        assert_eq!(line_amount(&draft, Account::ItbisPayable), (0, 1_800));
        assert_eq!(line_amount(&draft, Account::CostOfGoodsSold), (6_000, 0));
        assert_eq!(line_amount(&draft, Account::Inventory), (0, 6_000));
        assert_eq!(draft.total_debit(), draft.total_credit());
    }

    #[test]
    fn test_card_sale_debits_receivable() {
        let mut sale = cash_sale();
        sale.tender = Tender::Card;
        let totals = sale_totals(&sale.lines);
        let draft = build_sale_entry(&sale, &totals, Money::zero()).unwrap();

        assert_eq!(line_amount(&draft, Account::CardReceivable), (11_800, 0));
        assert_eq!(line_amount(&draft, Account::Cash), (0, 0));
    }

    #[test]
    fn test_zero_cogs_sale_omits_cost_lines() {
        // Full shortfall: revenue side only.
        let sale = cash_sale();
        let totals = sale_totals(&sale.lines);
        let draft = build_sale_entry(&sale, &totals, Money::zero()).unwrap();
        assert!(draft
            .lines
            .iter()
            .all(|l| l.account != Account::CostOfGoodsSold && l.account != Account::Inventory));
        assert_eq!(draft.total_debit(), draft.total_credit());
    }

    #[test]
    fn test_purchase_entry_credit_vs_cash() {
        let purchase = PurchaseEvent {
            id: "inv-9".to_string(),
            date: date(2024, 1, 5),
            on_credit: true,
            lines: vec![crate::types::PurchaseLine {
                product_id: "p1".to_string(),
                quantity: 10,
                unit_cost_cents: 5_000,
                tax_rate_bps: 1800,
                lot_number: None,
                expiration_date: None,
            }],
        };
        let totals = crate::itbis::purchase_totals(&purchase.lines);
        let draft = build_purchase_entry(&purchase, &totals).unwrap();

        assert_eq!(line_amount(&draft, Account::Inventory), (50_000, 0));
        assert_eq!(line_amount(&draft, Account::ItbisReceivable), (9_000, 0));
        assert_eq!(line_amount(&draft, Account::AccountsPayable), (0, 59_000));

        let cash_purchase = PurchaseEvent {
            on_credit: false,
            ..purchase
        };
        let draft = build_purchase_entry(&cash_purchase, &totals).unwrap();
        assert_eq!(line_amount(&draft, Account::Cash), (0, 59_000));
    }

    #[test]
    fn test_return_entry_mirrors_sale() {
        let ret = ReturnEvent {
            id: "ret-1".to_string(),
            date: date(2024, 1, 12),
            sale_ref: "sale-1".to_string(),
            lines: cash_sale().lines,
        };
        let totals = sale_totals(&ret.lines);
        let draft = build_return_entry(&ret, &totals, Money::from_cents(6_000)).unwrap();

        assert_eq!(line_amount(&draft, Account::SalesReturns), (10_000, 0));
        assert_eq!(line_amount(&draft, Account::ItbisPayable), (1_800, 0));
        assert_eq!(line_amount(&draft, Account::Cash), (0, 11_800));
        assert_eq!(line_amount(&draft, Account::Inventory), (6_000, 0));
        assert_eq!(line_amount(&draft, Account::CostOfGoodsSold), (0, 6_000));
        assert_eq!(draft.total_debit(), draft.total_credit());
    }

    #[test]
    fn test_settlement_entry() {
        let settlement = CardSettlement {
            id: "st-1".to_string(),
            settlement_date: date(2024, 1, 20),
            processor: "AZUL".to_string(),
            gross_cents: 100_000,
            commission_cents: 2_500,
            commission_tax_cents: 450,
            net_cents: 97_050,
            sale_refs: vec!["sale-1".to_string()],
            status: crate::types::SettlementStatus::Pending,
            journal_entry_id: None,
            created_at: chrono::Utc::now(),
        };
        let draft = build_settlement_entry(&settlement).unwrap();

        assert_eq!(line_amount(&draft, Account::Cash), (97_050, 0));
        assert_eq!(line_amount(&draft, Account::CommissionExpense), (2_500, 0));
        assert_eq!(line_amount(&draft, Account::ItbisReceivable), (450, 0));
        assert_eq!(line_amount(&draft, Account::CardReceivable), (0, 100_000));
    }

    #[test]
    fn test_settlement_rejects_inconsistent_amounts() {
        let settlement = CardSettlement {
            id: "st-2".to_string(),
            settlement_date: date(2024, 1, 20),
            processor: "AZUL".to_string(),
            gross_cents: 100_000,
            commission_cents: 2_500,
            commission_tax_cents: 450,
            net_cents: 90_000, // wrong
            sale_refs: vec![],
            status: crate::types::SettlementStatus::Pending,
            journal_entry_id: None,
            created_at: chrono::Utc::now(),
        };
        assert!(matches!(
            build_settlement_entry(&settlement),
            Err(CoreError::SettlementAmountMismatch { .. })
        ));
    }

    #[test]
    fn test_shift_close_shortage_and_overage() {
        let shortage = build_shift_close_entry("sh-1", date(2024, 1, 31), Money::from_cents(-500))
            .unwrap()
            .unwrap();
        assert_eq!(line_amount(&shortage, Account::CashOverShort), (500, 0));
        assert_eq!(line_amount(&shortage, Account::Cash), (0, 500));

        let overage = build_shift_close_entry("sh-1", date(2024, 1, 31), Money::from_cents(300))
            .unwrap()
            .unwrap();
        assert_eq!(line_amount(&overage, Account::Cash), (300, 0));
        assert_eq!(line_amount(&overage, Account::CashOverShort), (0, 300));
    }

    #[test]
    fn test_shift_close_zero_variance_no_entry() {
        let none = build_shift_close_entry("sh-1", date(2024, 1, 31), Money::zero()).unwrap();
        assert!(none.is_none());
    }
}
