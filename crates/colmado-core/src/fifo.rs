//! # FIFO Allocation Planning
//!
//! Pure planning for FIFO lot consumption. The planner works on immutable
//! snapshots of lot state taken by the caller; executing the plan (and
//! detecting that the snapshot went stale) is the engine's job.
//!
//! ## Why Plan/Execute Split?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CONCURRENT DEVICES, ONE LEDGER                                         │
//! │                                                                         │
//! │  Device A                      Device B                                 │
//! │     │ read lots (rem=6)           │ read lots (rem=6)                   │
//! │     │ plan: take 5                │ plan: take 5                        │
//! │     │ CAS decrement 6→1  ✓        │ CAS decrement 6→1  ✗ (stale!)       │
//! │     │ commit                      │ retry: fresh read (rem=1),          │
//! │     │                             │ re-plan, partial allocation         │
//! │                                                                         │
//! │  The plan carries each lot's observed remaining quantity so the         │
//! │  storage layer can decrement with compare-and-swap instead of a         │
//! │  read-then-write pair. Remaining never goes negative.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Insufficiency Policy
//! When available stock cannot cover the request, the planner allocates
//! what is available and reports the rest as a `shortfall` instead of
//! failing. Colmados routinely sell ahead of recorded stock (late invoice
//! entry), so a hard failure would block the till; the shortfall is
//! surfaced on the outcome and the caller decides whether to block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{ConsumptionType, CostConsumption, InventoryLot};

// =============================================================================
// Snapshots & Plans
// =============================================================================

/// The slice of lot state the planner needs, frozen at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotSnapshot {
    pub lot_id: String,
    pub remaining: i64,
    pub unit_cost_cents: i64,
}

impl From<&InventoryLot> for LotSnapshot {
    fn from(lot: &InventoryLot) -> Self {
        LotSnapshot {
            lot_id: lot.id.clone(),
            remaining: lot.remaining_qty,
            unit_cost_cents: lot.unit_cost_cents,
        }
    }
}

/// One planned take from one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub lot_id: String,
    /// Units to take from this lot.
    pub quantity: i64,
    /// Unit cost frozen from the lot.
    pub unit_cost_cents: i64,
    /// The remaining quantity observed when planning. The executor uses
    /// this as the compare value of its compare-and-decrement; a mismatch
    /// means another writer got there first.
    pub expected_remaining: i64,
}

impl Allocation {
    /// quantity × unit cost.
    #[inline]
    pub fn total_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// A complete FIFO allocation plan for one consumption request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
    /// Units requested.
    pub requested: i64,
    /// Units the plan covers (== requested unless stock ran short).
    pub allocated: i64,
    /// requested - allocated.
    pub shortfall: i64,
    pub total_cost_cents: i64,
}

impl AllocationPlan {
    /// Whether stock could not cover the full request.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.shortfall > 0
    }

    /// Weighted-average unit cost of the allocated units.
    ///
    /// Integer division truncates; the exact total lives in
    /// `total_cost_cents` and is what posts to the journal.
    pub fn avg_unit_cost_cents(&self) -> i64 {
        if self.allocated == 0 {
            0
        } else {
            self.total_cost_cents / self.allocated
        }
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Plans a FIFO consumption of `requested` units against `lots`.
///
/// `lots` must already be in FIFO order (ascending purchase date, then
/// insertion order) - the lot store's `list_available` guarantees this.
///
/// ## Algorithm
/// Walk the lots in order; from each take `min(remaining, still_needed)`
/// at that lot's unit cost, until the request is covered or lots run out.
///
/// ## Errors
/// - `InvalidQuantity` if `requested <= 0`
///
/// ## Example
/// ```rust
/// use colmado_core::fifo::{plan_consumption, LotSnapshot};
///
/// let lots = vec![
///     LotSnapshot { lot_id: "old".into(), remaining: 5, unit_cost_cents: 1000 },
///     LotSnapshot { lot_id: "new".into(), remaining: 5, unit_cost_cents: 1200 },
/// ];
/// let plan = plan_consumption(&lots, 7).unwrap();
/// assert_eq!(plan.allocations.len(), 2);
/// assert_eq!(plan.allocations[0].quantity, 5);   // drains the old lot
/// assert_eq!(plan.allocations[1].quantity, 2);   // then the newer one
/// assert_eq!(plan.total_cost_cents, 7_400);      // 5×10.00 + 2×12.00
/// ```
pub fn plan_consumption(lots: &[LotSnapshot], requested: i64) -> CoreResult<AllocationPlan> {
    if requested <= 0 {
        return Err(CoreError::InvalidQuantity {
            quantity: requested,
        });
    }

    let mut allocations = Vec::new();
    let mut still_needed = requested;
    let mut total_cost = Money::zero();

    for lot in lots {
        if still_needed == 0 {
            break;
        }
        if lot.remaining <= 0 {
            continue;
        }

        let take = lot.remaining.min(still_needed);
        let allocation = Allocation {
            lot_id: lot.lot_id.clone(),
            quantity: take,
            unit_cost_cents: lot.unit_cost_cents,
            expected_remaining: lot.remaining,
        };
        total_cost += allocation.total_cost();
        allocations.push(allocation);
        still_needed -= take;
    }

    Ok(AllocationPlan {
        requested,
        allocated: requested - still_needed,
        shortfall: still_needed,
        total_cost_cents: total_cost.cents(),
        allocations,
    })
}

// =============================================================================
// Consumption Outcome
// =============================================================================

/// The result of an executed consumption (or reversal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionOutcome {
    /// The persisted consumption records, in allocation order.
    pub consumptions: Vec<CostConsumption>,
    pub total_cost_cents: i64,
    /// Weighted-average unit cost of the allocated units (truncated).
    pub avg_unit_cost_cents: i64,
    /// Units that could not be allocated. Zero for a full allocation.
    pub shortfall: i64,
}

impl ConsumptionOutcome {
    /// Whether stock could not cover the full request.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.shortfall > 0
    }

    /// Total cost as Money.
    #[inline]
    pub fn total_cost(&self) -> Money {
        Money::from_cents(self.total_cost_cents)
    }
}

/// Materializes the consumption records for an executed plan.
///
/// Pure record construction; the engine persists them in the same
/// transaction as the lot decrements.
pub fn consumptions_for_plan(
    plan: &AllocationPlan,
    product_id: &str,
    transaction_ref: &str,
    consumption_type: ConsumptionType,
    consumed_at: DateTime<Utc>,
    mut next_id: impl FnMut() -> String,
) -> Vec<CostConsumption> {
    plan.allocations
        .iter()
        .map(|allocation| CostConsumption {
            id: next_id(),
            lot_id: allocation.lot_id.clone(),
            product_id: product_id.to_string(),
            transaction_ref: transaction_ref.to_string(),
            consumption_type,
            quantity: allocation.quantity,
            unit_cost_cents: allocation.unit_cost_cents,
            total_cost_cents: allocation.total_cost().cents(),
            consumed_at,
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(id: &str, remaining: i64, cost: i64) -> LotSnapshot {
        LotSnapshot {
            lot_id: id.to_string(),
            remaining,
            unit_cost_cents: cost,
        }
    }

    #[test]
    fn test_fifo_ordering() {
        // Older lot (5 @ 10.00) drains before newer (5 @ 12.00).
        let lots = vec![lot("l1", 5, 1000), lot("l2", 5, 1200)];
        let plan = plan_consumption(&lots, 7).unwrap();

        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].lot_id, "l1");
        assert_eq!(plan.allocations[0].quantity, 5);
        assert_eq!(plan.allocations[1].lot_id, "l2");
        assert_eq!(plan.allocations[1].quantity, 2);
        assert_eq!(plan.total_cost_cents, 7_400);
        assert_eq!(plan.shortfall, 0);
        assert!(!plan.is_partial());
    }

    #[test]
    fn test_single_lot_partial_drain() {
        let lots = vec![lot("l1", 10, 500)];
        let plan = plan_consumption(&lots, 3).unwrap();

        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].quantity, 3);
        assert_eq!(plan.allocations[0].expected_remaining, 10);
        assert_eq!(plan.total_cost_cents, 1_500);
    }

    #[test]
    fn test_shortfall_policy() {
        // 6 available, 10 requested: allocate 6, report 4 short.
        let lots = vec![lot("l1", 2, 1000), lot("l2", 4, 1100)];
        let plan = plan_consumption(&lots, 10).unwrap();

        assert_eq!(plan.allocated, 6);
        assert_eq!(plan.shortfall, 4);
        assert!(plan.is_partial());
        assert_eq!(plan.total_cost_cents, 2 * 1000 + 4 * 1100);
    }

    #[test]
    fn test_no_lots_full_shortfall() {
        let plan = plan_consumption(&[], 5).unwrap();
        assert_eq!(plan.allocated, 0);
        assert_eq!(plan.shortfall, 5);
        assert_eq!(plan.avg_unit_cost_cents(), 0);
        assert!(plan.allocations.is_empty());
    }

    #[test]
    fn test_skips_empty_lots() {
        let lots = vec![lot("empty", 0, 900), lot("l2", 3, 1000)];
        let plan = plan_consumption(&lots, 2).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].lot_id, "l2");
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        assert!(matches!(
            plan_consumption(&[lot("l1", 5, 100)], 0),
            Err(CoreError::InvalidQuantity { quantity: 0 })
        ));
        assert!(matches!(
            plan_consumption(&[lot("l1", 5, 100)], -2),
            Err(CoreError::InvalidQuantity { quantity: -2 })
        ));
    }

    #[test]
    fn test_avg_unit_cost() {
        let lots = vec![lot("l1", 5, 1000), lot("l2", 5, 1200)];
        let plan = plan_consumption(&lots, 7).unwrap();
        // 7400 / 7 = 1057 (truncated)
        assert_eq!(plan.avg_unit_cost_cents(), 1_057);
    }

    #[test]
    fn test_consumption_records_match_plan() {
        let lots = vec![lot("l1", 5, 1000), lot("l2", 5, 1200)];
        let plan = plan_consumption(&lots, 7).unwrap();
        let now = Utc::now();
        let mut n = 0;
        let records = consumptions_for_plan(&plan, "p1", "sale-1", ConsumptionType::Sale, now, || {
            n += 1;
            format!("c{n}")
        });

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lot_id, "l1");
        assert_eq!(records[0].quantity, 5);
        assert_eq!(records[0].total_cost_cents, 5_000);
        assert_eq!(records[1].total_cost_cents, 2_400);
        let total: i64 = records.iter().map(|c| c.total_cost_cents).sum();
        assert_eq!(total, plan.total_cost_cents);
    }
}
