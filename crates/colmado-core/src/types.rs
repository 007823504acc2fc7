//! # Domain Types
//!
//! Core domain types for the Colmado Ledger costing and accounting engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │  InventoryLot   │   │ CostConsumption │   │  JournalEntry   │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  id (UUID)      │──►│  lot_id (FK)    │   │  entry_number   │        │
//! │  │  remaining_qty  │   │  quantity       │──►│  lines[]        │        │
//! │  │  unit_cost      │   │  total_cost     │   │  debit=credit   │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │ItbisPeriodSummary│  │ CardSettlement  │   │     Shift       │        │
//! │  │  period YYYY-MM │   │  gross/net      │   │  expected cash  │        │
//! │  │  net_due        │   │  commission     │   │  counted cash   │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, stable across devices
//! - Business ID where one exists: (entry_number, lot_number, NCF) -
//!   human-readable, allocated from serialized sequences

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (standard ITBIS), 1600 bps = 16% (reduced)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero (exempt) tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Rate Bucket
// =============================================================================

/// DGII reporting bucket for a tax rate.
///
/// Period summaries break collected/paid ITBIS down by these buckets
/// (Form 606/607 columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBucket {
    /// 18% standard rate.
    Standard,
    /// 16% reduced rate.
    Reduced,
    /// 0% - exempt goods (medicines, staple foods).
    Exempt,
}

impl RateBucket {
    /// Classifies a rate into its reporting bucket.
    ///
    /// Returns `None` for rates DGII does not recognize; validation rejects
    /// those before any record is written.
    pub fn from_rate(rate: TaxRate) -> Option<RateBucket> {
        match rate.bps() {
            0 => Some(RateBucket::Exempt),
            crate::ITBIS_REDUCED_BPS => Some(RateBucket::Reduced),
            crate::ITBIS_STANDARD_BPS => Some(RateBucket::Standard),
            _ => None,
        }
    }
}

// =============================================================================
// Inventory Lot
// =============================================================================

/// Lifecycle status of an inventory lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    /// Lot has remaining quantity available for FIFO consumption.
    Active,
    /// Remaining quantity reached zero. Flips back to Active on restock.
    Depleted,
    /// Past expiration date; excluded from consumption.
    Expired,
    /// Returned to the supplier in full; terminal.
    Returned,
}

/// One purchase batch of one product, tracked as a FIFO cost layer.
///
/// ## Invariants
/// - `0 <= remaining_qty <= original_qty`
/// - status is `Depleted` iff `remaining_qty == 0`
/// - active lots ordered by purchase date (insertion order on ties)
///   form the FIFO consumption order per product
///
/// ## Lifecycle
/// Created when a purchase invoice/receipt is recorded. Mutated only by
/// consumption (decrement) or return (increment, bounded by original).
/// Never deleted - terminal statuses only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryLot {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Product this lot belongs to.
    pub product_id: String,

    /// Date the purchase was recorded; primary FIFO sort key.
    pub purchase_date: NaiveDate,

    /// Quantity originally purchased.
    pub original_qty: i64,

    /// Quantity still available for consumption.
    pub remaining_qty: i64,

    /// Unit cost in centavos, tax-exclusive. This is the COGS basis.
    pub unit_cost_cents: i64,

    /// Unit cost in centavos including ITBIS (what was actually paid).
    pub unit_cost_with_tax_cents: i64,

    /// ITBIS rate paid on this purchase, in basis points.
    pub tax_rate_bps: u32,

    /// Expiration date if the product carries one (pharmacy stock).
    pub expiration_date: Option<NaiveDate>,

    /// Supplier batch/lot number, when printed on the invoice.
    pub lot_number: Option<String>,

    /// Current lifecycle status.
    pub status: LotStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryLot {
    /// Returns the tax-exclusive unit cost as Money.
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    /// Returns the ITBIS rate on this lot.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Whether this lot can supply FIFO consumption.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.status == LotStatus::Active && self.remaining_qty > 0
    }
}

// =============================================================================
// Cost Consumption
// =============================================================================

/// The kind of outbound (or compensating) movement a consumption records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionType {
    /// Units sold to a customer.
    Sale,
    /// Compensating restock from a customer return. Always tied to the
    /// original lot, never FIFO re-selected.
    Return,
    /// Manual stock adjustment (count correction).
    Adjustment,
    /// Shrinkage, breakage, expiry write-off.
    Loss,
}

/// One allocation of quantity from one lot to one outbound transaction.
///
/// Immutable once created: reversals are recorded as compensating
/// `Return`-type rows, never edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CostConsumption {
    pub id: String,
    pub lot_id: String,
    pub product_id: String,
    /// The sale, return or adjustment this allocation belongs to.
    pub transaction_ref: String,
    pub consumption_type: ConsumptionType,
    /// Units taken from (positive) or restocked to (also positive,
    /// distinguished by type) the lot.
    pub quantity: i64,
    /// Unit cost frozen from the lot at allocation time.
    pub unit_cost_cents: i64,
    /// quantity × unit_cost.
    pub total_cost_cents: i64,
    pub consumed_at: DateTime<Utc>,
}

impl CostConsumption {
    /// Returns the total cost as Money.
    #[inline]
    pub fn total_cost(&self) -> Money {
        Money::from_cents(self.total_cost_cents)
    }
}

// =============================================================================
// Chart of Accounts
// =============================================================================

/// The fixed chart of accounts journal lines post to.
///
/// A colmado's books need exactly these; a configurable chart is a later
/// concern and would weaken the static balance checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum Account {
    /// Cash drawer.
    Cash,
    /// Card sales awaiting processor settlement.
    CardReceivable,
    /// Inventory at tax-exclusive cost.
    Inventory,
    /// Sales revenue (tax-exclusive).
    Revenue,
    /// Contra-revenue for customer returns.
    SalesReturns,
    /// Cost of goods sold.
    CostOfGoodsSold,
    /// ITBIS collected on sales, owed to DGII.
    ItbisPayable,
    /// ITBIS paid on purchases, creditable against the payable.
    ItbisReceivable,
    /// Supplier invoices bought on credit.
    AccountsPayable,
    /// Card processor commission.
    CommissionExpense,
    /// Cash drawer variance at shift close.
    CashOverShort,
}

// =============================================================================
// Journal Entry
// =============================================================================

/// Status of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    /// Created but not yet posted. Blocks period close.
    Pending,
    /// Posted; the debit == credit invariant holds.
    Posted,
    /// Voided; original lines retained for audit.
    Voided,
}

/// The source event a journal entry was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Sale,
    Purchase,
    Return,
    Adjustment,
    Settlement,
    ShiftClose,
    Manual,
}

/// One typed debit/credit line of a journal entry.
///
/// Represented as a typed (account, debit, credit) tuple rather than an
/// opaque document so the balance invariant is statically checkable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: Account,
    pub debit_cents: i64,
    pub credit_cents: i64,
}

impl JournalLine {
    /// A pure debit line.
    pub fn debit(account: Account, amount: Money) -> Self {
        JournalLine {
            account,
            debit_cents: amount.cents(),
            credit_cents: 0,
        }
    }

    /// A pure credit line.
    pub fn credit(account: Account, amount: Money) -> Self {
        JournalLine {
            account,
            debit_cents: 0,
            credit_cents: amount.cents(),
        }
    }
}

/// One balanced accounting record.
///
/// ## Invariants
/// - `total_debit == total_credit` for every entry with status `Posted`
/// - a `Voided` entry retains its original lines plus a void
///   reason/timestamp for audit
/// - entry numbers never repeat (contiguity is not guaranteed under
///   concurrent writers)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    /// Sequential human-readable number, allocated from a serialized
    /// sequence.
    pub entry_number: i64,
    pub entry_date: NaiveDate,
    pub description: String,
    pub source_type: SourceType,
    /// Reference to the source transaction for traceability.
    pub source_ref: String,
    pub lines: Vec<JournalLine>,
    pub total_debit_cents: i64,
    pub total_credit_cents: i64,
    pub status: JournalStatus,
    pub void_reason: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Returns the total debit as Money.
    #[inline]
    pub fn total_debit(&self) -> Money {
        Money::from_cents(self.total_debit_cents)
    }

    /// Returns the total credit as Money.
    #[inline]
    pub fn total_credit(&self) -> Money {
        Money::from_cents(self.total_credit_cents)
    }

    /// Whether debits equal credits exactly, to the centavo.
    #[inline]
    pub fn is_balanced(&self) -> bool {
        self.total_debit_cents == self.total_credit_cents
    }
}

// =============================================================================
// Tax Facts & Period Summary
// =============================================================================

/// What side of the ITBIS ledger a tax fact lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TaxFactKind {
    /// ITBIS collected on a sale (or negated by a return).
    Collected,
    /// ITBIS paid on a purchase.
    Paid,
    /// ITBIS retained by a card processor.
    Retained,
}

/// One immutable tax observation written at posting time.
///
/// Period aggregation re-derives from these keyed by id, so re-running
/// over the same set is idempotent - no incremental mutation of the
/// summary, no double counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxFact {
    /// Deterministic id: `{source_ref}:{kind}:{rate_bps}`.
    pub id: String,
    pub transaction_ref: String,
    pub kind: TaxFactKind,
    pub rate_bps: u32,
    /// Tax-exclusive base amount (negative for returns).
    pub base_cents: i64,
    /// ITBIS amount (negative for returns).
    pub itbis_cents: i64,
    pub fact_date: NaiveDate,
}

/// Status of a monthly ITBIS period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    /// Accepting postings.
    Open,
    /// Locked; postings dated inside are rejected.
    Closed,
    /// Filed with DGII. Reopening is a logged, sensitive override.
    Filed,
}

/// Monthly ITBIS aggregation.
///
/// Invariant: `net_due = collected - paid - retained`. A negative net due
/// is a credit carried forward - surfaced to the filer, not handled here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ItbisPeriodSummary {
    /// Period key, `YYYY-MM`.
    pub period: String,
    pub status: PeriodStatus,
    /// ITBIS collected on sales at the 18% rate.
    pub collected_standard_cents: i64,
    /// ITBIS collected on sales at the 16% rate.
    pub collected_reduced_cents: i64,
    /// Tax-exclusive base of exempt sales (reported, carries no tax).
    pub exempt_sales_cents: i64,
    /// ITBIS paid on purchases at the 18% rate.
    pub paid_standard_cents: i64,
    /// ITBIS paid on purchases at the 16% rate.
    pub paid_reduced_cents: i64,
    /// ITBIS retained by card processors.
    pub retained_cents: i64,
    /// collected - paid - retained.
    pub net_due_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl ItbisPeriodSummary {
    /// Total ITBIS collected across rate buckets.
    #[inline]
    pub fn total_collected(&self) -> Money {
        Money::from_cents(self.collected_standard_cents + self.collected_reduced_cents)
    }

    /// Total ITBIS paid across rate buckets.
    #[inline]
    pub fn total_paid(&self) -> Money {
        Money::from_cents(self.paid_standard_cents + self.paid_reduced_cents)
    }

    /// Whether the stored net due matches the derivation.
    pub fn net_due_consistent(&self) -> bool {
        self.net_due_cents
            == (self.total_collected() - self.total_paid()).cents() - self.retained_cents
    }
}

// =============================================================================
// Period
// =============================================================================

/// A tax period: one calendar month, keyed `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Creates a period; month must be 1-12.
    pub fn new(year: i32, month: u32) -> Option<Period> {
        if (1..=12).contains(&month) {
            Some(Period { year, month })
        } else {
            None
        }
    }

    /// The period a date falls in.
    pub fn from_date(date: NaiveDate) -> Period {
        use chrono::Datelike;
        Period {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of the period.
    pub fn first_day(&self) -> NaiveDate {
        // month validated at construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following period (exclusive upper bound for
    /// range queries).
    pub fn next_first_day(&self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MAX)
    }

    /// Whether a date falls inside this period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date < self.next_first_day()
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for Period {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::error::ValidationError::InvalidFormat {
            field: "period".to_string(),
            reason: "expected YYYY-MM".to_string(),
        };
        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Period::new(year, month).ok_or_else(invalid)
    }
}

// =============================================================================
// Card Settlement
// =============================================================================

/// Status of a card settlement batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Reconciled,
    Disputed,
}

/// One batch reconciliation of card-processor deposits.
///
/// Invariant: `net = gross - commission - tax_on_commission`. A reconciled
/// settlement references a posted journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSettlement {
    pub id: String,
    pub settlement_date: NaiveDate,
    /// Processor name (CardNET, AZUL, ...).
    pub processor: String,
    pub gross_cents: i64,
    pub commission_cents: i64,
    pub commission_tax_cents: i64,
    pub net_cents: i64,
    /// Sale transaction refs covered by this deposit.
    pub sale_refs: Vec<String>,
    pub status: SettlementStatus,
    /// Set when the settlement entry posts.
    pub journal_entry_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CardSettlement {
    /// Whether the net-amount invariant holds.
    pub fn amounts_consistent(&self) -> bool {
        self.net_cents == self.gross_cents - self.commission_cents - self.commission_tax_cents
    }
}

// =============================================================================
// Shift
// =============================================================================

/// Status of a register shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    /// Terminal.
    Closed,
}

/// One cash register shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Shift {
    pub id: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Cash in the drawer at open.
    pub opening_float_cents: i64,
    /// Derived at close: float + cash sales - cash refunds.
    pub expected_cash_cents: Option<i64>,
    /// What the cashier actually counted.
    pub counted_cash_cents: Option<i64>,
    /// counted - expected. Posted to CashOverShort when nonzero.
    pub cash_difference_cents: Option<i64>,
    pub status: ShiftStatus,
}

// =============================================================================
// Audit Log
// =============================================================================

/// Auditable actions emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LotCreated,
    LotConsumed,
    LotStatusChanged,
    JournalVoided,
    PeriodClosed,
    PeriodReopened,
    PeriodFiled,
    NcfIssued,
    NcfVoided,
    SettlementReconciled,
    SettlementDisputed,
    ShiftClosed,
}

/// One append-only audit record.
///
/// Snapshots are JSON strings (same convention as sync payloads) so the
/// audit reader can diff before/after without schema knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: String,
    pub snapshot_before: Option<String>,
    pub snapshot_after: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Transaction Events (inbound collaborator interface)
// =============================================================================

/// How a sale was paid. Determines the debit side of the sale entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tender {
    Cash,
    Card,
}

/// One product line of a sale or return event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    /// Tax-exclusive unit price in centavos.
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
}

impl SaleLine {
    /// Tax-exclusive line subtotal.
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

/// A finalized sale emitted by the POS front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleEvent {
    pub id: String,
    pub date: NaiveDate,
    pub tender: Tender,
    pub lines: Vec<SaleLine>,
}

/// One line of a recorded supplier invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: String,
    pub quantity: i64,
    /// Tax-exclusive unit cost in centavos.
    pub unit_cost_cents: i64,
    pub tax_rate_bps: u32,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

impl PurchaseLine {
    /// Tax-exclusive line subtotal.
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

/// A recorded supplier invoice/receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub id: String,
    pub date: NaiveDate,
    /// Credit purchases post to AccountsPayable instead of Cash.
    pub on_credit: bool,
    pub lines: Vec<PurchaseLine>,
}

/// A customer return against an earlier sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnEvent {
    pub id: String,
    pub date: NaiveDate,
    /// The sale being reversed.
    pub sale_ref: String,
    /// The returned lines at their original prices.
    pub lines: Vec<SaleLine>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1800);
        assert_eq!(rate.bps(), 1800);
        assert!((rate.percentage() - 18.0).abs() < 0.001);
    }

    #[test]
    fn test_rate_bucket_classification() {
        assert_eq!(RateBucket::from_rate(TaxRate::from_bps(1800)), Some(RateBucket::Standard));
        assert_eq!(RateBucket::from_rate(TaxRate::from_bps(1600)), Some(RateBucket::Reduced));
        assert_eq!(RateBucket::from_rate(TaxRate::zero()), Some(RateBucket::Exempt));
        assert_eq!(RateBucket::from_rate(TaxRate::from_bps(825)), None);
    }

    #[test]
    fn test_period_parse_and_bounds() {
        let period: Period = "2024-01".parse().unwrap();
        assert_eq!(period.to_string(), "2024-01");
        assert_eq!(
            period.first_day(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(
            period.next_first_day(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        );
        assert!(period.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
    }

    #[test]
    fn test_period_december_rollover() {
        let period: Period = "2024-12".parse().unwrap();
        assert_eq!(
            period.next_first_day(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_period_rejects_bad_input() {
        assert!("2024-13".parse::<Period>().is_err());
        assert!("202401".parse::<Period>().is_err());
        assert!("abcd-ef".parse::<Period>().is_err());
    }

    #[test]
    fn test_settlement_invariant() {
        let settlement = CardSettlement {
            id: "s1".to_string(),
            settlement_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            processor: "CardNET".to_string(),
            gross_cents: 100_000,
            commission_cents: 2_500,
            commission_tax_cents: 450,
            net_cents: 97_050,
            sale_refs: vec!["sale-1".to_string()],
            status: SettlementStatus::Pending,
            journal_entry_id: None,
            created_at: Utc::now(),
        };
        assert!(settlement.amounts_consistent());
    }

    #[test]
    fn test_lot_availability() {
        let mut lot = InventoryLot {
            id: "l1".to_string(),
            product_id: "p1".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            original_qty: 10,
            remaining_qty: 10,
            unit_cost_cents: 1000,
            unit_cost_with_tax_cents: 1180,
            tax_rate_bps: 1800,
            expiration_date: None,
            lot_number: None,
            status: LotStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(lot.is_available());

        lot.remaining_qty = 0;
        lot.status = LotStatus::Depleted;
        assert!(!lot.is_available());
    }
}
