//! # ITBIS Calculator
//!
//! Per-line and per-transaction ITBIS amounts, tax fact generation, and
//! period aggregation.
//!
//! ## Idempotent Aggregation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  NO INCREMENTAL MUTATION                                                │
//! │                                                                         │
//! │  Posting writes immutable TaxFact rows keyed by a deterministic id.     │
//! │  Aggregation re-derives the whole period summary from the fact set,     │
//! │  deduplicated by id. Running it twice over the same set produces        │
//! │  bit-identical summaries - there is nothing to double count.            │
//! │                                                                         │
//! │  post_sale ──► TaxFact{sale-1:collected:1800}  ─┐                       │
//! │  post_sale ──► TaxFact{sale-2:collected:1800}  ─┼─► accumulate_period   │
//! │  post_purchase ► TaxFact{inv-9:paid:1800}      ─┘       │               │
//! │                                                         ▼               │
//! │                                            ItbisPeriodSummary           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::money::Money;
use crate::types::{
    CardSettlement, ItbisPeriodSummary, Period, PeriodStatus, PurchaseEvent, RateBucket,
    ReturnEvent, SaleEvent, SaleLine, TaxFact, TaxFactKind, TaxRate,
};

// =============================================================================
// Line & Transaction Computation
// =============================================================================

/// Computes the ITBIS on a tax-exclusive amount, rounded half-up to the
/// centavo (DGII convention).
#[inline]
pub fn compute_line_tax(amount: Money, rate: TaxRate) -> Money {
    amount.itbis(rate)
}

/// Subtotal/tax/total breakdown of a sale or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

impl TransactionTotals {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Totals a set of sale lines. Tax is rounded per line, then summed -
/// line-level rounding is what lands on the receipt, and the journal and
/// Form 607 totals must match it.
pub fn sale_totals(lines: &[SaleLine]) -> TransactionTotals {
    let mut subtotal = Money::zero();
    let mut tax = Money::zero();
    for line in lines {
        let line_subtotal = line.subtotal();
        subtotal += line_subtotal;
        tax += compute_line_tax(line_subtotal, line.tax_rate());
    }
    TransactionTotals {
        subtotal_cents: subtotal.cents(),
        tax_cents: tax.cents(),
        total_cents: (subtotal + tax).cents(),
    }
}

/// Totals a purchase invoice the same way.
pub fn purchase_totals(lines: &[crate::types::PurchaseLine]) -> TransactionTotals {
    let mut subtotal = Money::zero();
    let mut tax = Money::zero();
    for line in lines {
        let line_subtotal = line.subtotal();
        subtotal += line_subtotal;
        tax += compute_line_tax(line_subtotal, line.tax_rate());
    }
    TransactionTotals {
        subtotal_cents: subtotal.cents(),
        tax_cents: tax.cents(),
        total_cents: (subtotal + tax).cents(),
    }
}

/// ITBIS a card processor retains on the tax of settled sales
/// (Norma 08-04), rounded half-up.
#[inline]
pub fn card_retention(itbis: Money, retention_rate: TaxRate) -> Money {
    itbis.itbis(retention_rate)
}

// =============================================================================
// Tax Fact Generation
// =============================================================================

/// Deterministic fact id so re-posting the same transaction cannot
/// duplicate a fact.
fn fact_id(source_ref: &str, kind: TaxFactKind, bps: u32) -> String {
    let kind = match kind {
        TaxFactKind::Collected => "collected",
        TaxFactKind::Paid => "paid",
        TaxFactKind::Retained => "retained",
    };
    format!("{source_ref}:{kind}:{bps}")
}

/// Groups lines by rate and emits one fact per (transaction, kind, rate).
fn facts_from_lines<'a>(
    source_ref: &str,
    kind: TaxFactKind,
    date: chrono::NaiveDate,
    lines: impl Iterator<Item = (Money, TaxRate)> + 'a,
    negate: bool,
) -> Vec<TaxFact> {
    let mut by_rate: BTreeMap<u32, (Money, Money)> = BTreeMap::new();
    for (subtotal, rate) in lines {
        let entry = by_rate.entry(rate.bps()).or_insert((Money::zero(), Money::zero()));
        entry.0 += subtotal;
        entry.1 += compute_line_tax(subtotal, rate);
    }

    by_rate
        .into_iter()
        .map(|(bps, (base, itbis))| {
            let sign = if negate { -1 } else { 1 };
            TaxFact {
                id: fact_id(source_ref, kind, bps),
                transaction_ref: source_ref.to_string(),
                kind,
                rate_bps: bps,
                base_cents: base.cents() * sign,
                itbis_cents: itbis.cents() * sign,
                fact_date: date,
            }
        })
        .collect()
}

/// Tax facts collected by a sale.
pub fn facts_for_sale(sale: &SaleEvent) -> Vec<TaxFact> {
    facts_from_lines(
        &sale.id,
        TaxFactKind::Collected,
        sale.date,
        sale.lines.iter().map(|l| (l.subtotal(), l.tax_rate())),
        false,
    )
}

/// Tax facts paid by a purchase.
pub fn facts_for_purchase(purchase: &PurchaseEvent) -> Vec<TaxFact> {
    facts_from_lines(
        &purchase.id,
        TaxFactKind::Paid,
        purchase.date,
        purchase.lines.iter().map(|l| (l.subtotal(), l.tax_rate())),
        false,
    )
}

/// Negative collected facts for a customer return.
pub fn facts_for_return(ret: &ReturnEvent) -> Vec<TaxFact> {
    facts_from_lines(
        &ret.id,
        TaxFactKind::Collected,
        ret.date,
        ret.lines.iter().map(|l| (l.subtotal(), l.tax_rate())),
        true,
    )
}

/// The retention fact for a card settlement, given the ITBIS collected on
/// its linked sales.
pub fn fact_for_retention(
    settlement: &CardSettlement,
    settled_itbis: Money,
    retention_rate: TaxRate,
) -> TaxFact {
    let retained = card_retention(settled_itbis, retention_rate);
    TaxFact {
        id: fact_id(&settlement.id, TaxFactKind::Retained, retention_rate.bps()),
        transaction_ref: settlement.id.clone(),
        kind: TaxFactKind::Retained,
        rate_bps: retention_rate.bps(),
        base_cents: settled_itbis.cents(),
        itbis_cents: retained.cents(),
        fact_date: settlement.settlement_date,
    }
}

// =============================================================================
// Period Aggregation
// =============================================================================

/// Re-derives the ITBIS summary for a period from a fact set.
///
/// Facts are deduplicated by id and filtered to the period before
/// summing, so the result depends only on the distinct facts dated inside
/// the period. `net_due = collected - paid - retained`; a negative value
/// is a credit carried forward, surfaced to the filer.
pub fn accumulate_period(
    period: Period,
    facts: &[TaxFact],
    as_of: DateTime<Utc>,
) -> ItbisPeriodSummary {
    // BTreeMap dedups by id deterministically (last write wins, but ids
    // are content-derived so duplicates are identical anyway)
    let distinct: BTreeMap<&str, &TaxFact> = facts
        .iter()
        .filter(|f| period.contains(f.fact_date))
        .map(|f| (f.id.as_str(), f))
        .collect();

    let mut summary = ItbisPeriodSummary {
        period: period.to_string(),
        status: PeriodStatus::Open,
        collected_standard_cents: 0,
        collected_reduced_cents: 0,
        exempt_sales_cents: 0,
        paid_standard_cents: 0,
        paid_reduced_cents: 0,
        retained_cents: 0,
        net_due_cents: 0,
        updated_at: as_of,
    };

    for fact in distinct.values() {
        let bucket = RateBucket::from_rate(TaxRate::from_bps(fact.rate_bps));
        match (fact.kind, bucket) {
            (TaxFactKind::Collected, Some(RateBucket::Standard)) => {
                summary.collected_standard_cents += fact.itbis_cents;
            }
            (TaxFactKind::Collected, Some(RateBucket::Reduced)) => {
                summary.collected_reduced_cents += fact.itbis_cents;
            }
            (TaxFactKind::Collected, Some(RateBucket::Exempt)) => {
                summary.exempt_sales_cents += fact.base_cents;
            }
            (TaxFactKind::Paid, Some(RateBucket::Standard)) => {
                summary.paid_standard_cents += fact.itbis_cents;
            }
            (TaxFactKind::Paid, Some(RateBucket::Reduced)) => {
                summary.paid_reduced_cents += fact.itbis_cents;
            }
            // Exempt purchases carry no creditable ITBIS.
            (TaxFactKind::Paid, Some(RateBucket::Exempt)) => {}
            (TaxFactKind::Retained, _) => {
                summary.retained_cents += fact.itbis_cents;
            }
            // Unrecognized rates are rejected at the boundary; skip
            // defensively if one slipped through an old record.
            (_, None) => {}
        }
    }

    summary.net_due_cents = (summary.total_collected() - summary.total_paid()).cents()
        - summary.retained_cents;
    summary
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sale_line(price: i64, qty: i64, bps: u32) -> SaleLine {
        SaleLine {
            product_id: "p1".to_string(),
            quantity: qty,
            unit_price_cents: price,
            tax_rate_bps: bps,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sale_totals_mixed_rates() {
        let lines = vec![
            sale_line(10_000, 1, 1800), // 100.00 + 18.00
            sale_line(5_000, 2, 1600),  // 100.00 + 16.00
            sale_line(2_500, 1, 0),     // 25.00 exempt
        ];
        let totals = sale_totals(&lines);
        assert_eq!(totals.subtotal_cents, 22_500);
        assert_eq!(totals.tax_cents, 3_400);
        assert_eq!(totals.total_cents, 25_900);
    }

    #[test]
    fn test_line_level_rounding() {
        // Two lines of RD$0.25 at 18%: per-line tax is 5 centavos each.
        // Rounding the aggregate (50 * 18% = 9) would disagree with the
        // receipt, which shows 5 + 5.
        let lines = vec![sale_line(25, 1, 1800), sale_line(25, 1, 1800)];
        let totals = sale_totals(&lines);
        assert_eq!(totals.tax_cents, 10);
    }

    #[test]
    fn test_facts_grouped_by_rate() {
        let sale = SaleEvent {
            id: "sale-1".to_string(),
            date: date(2024, 1, 10),
            tender: crate::types::Tender::Cash,
            lines: vec![
                sale_line(10_000, 1, 1800),
                sale_line(4_000, 1, 1800),
                sale_line(3_000, 1, 0),
            ],
        };
        let facts = facts_for_sale(&sale);
        assert_eq!(facts.len(), 2);

        let exempt = facts.iter().find(|f| f.rate_bps == 0).unwrap();
        assert_eq!(exempt.base_cents, 3_000);
        assert_eq!(exempt.itbis_cents, 0);

        let standard = facts.iter().find(|f| f.rate_bps == 1800).unwrap();
        assert_eq!(standard.id, "sale-1:collected:1800");
        assert_eq!(standard.base_cents, 14_000);
        assert_eq!(standard.itbis_cents, 2_520);
    }

    #[test]
    fn test_return_facts_negate() {
        let ret = ReturnEvent {
            id: "ret-1".to_string(),
            date: date(2024, 1, 12),
            sale_ref: "sale-1".to_string(),
            lines: vec![sale_line(10_000, 1, 1800)],
        };
        let facts = facts_for_return(&ret);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].base_cents, -10_000);
        assert_eq!(facts[0].itbis_cents, -1_800);
    }

    fn period_jan() -> Period {
        "2024-01".parse().unwrap()
    }

    fn fact(id: &str, kind: TaxFactKind, bps: u32, base: i64, itbis: i64, d: NaiveDate) -> TaxFact {
        TaxFact {
            id: id.to_string(),
            transaction_ref: id.split(':').next().unwrap().to_string(),
            kind,
            rate_bps: bps,
            base_cents: base,
            itbis_cents: itbis,
            fact_date: d,
        }
    }

    #[test]
    fn test_accumulate_period() {
        let facts = vec![
            fact("s1:collected:1800", TaxFactKind::Collected, 1800, 10_000, 1_800, date(2024, 1, 5)),
            fact("s2:collected:1600", TaxFactKind::Collected, 1600, 5_000, 800, date(2024, 1, 6)),
            fact("s3:collected:0", TaxFactKind::Collected, 0, 2_000, 0, date(2024, 1, 7)),
            fact("p1:paid:1800", TaxFactKind::Paid, 1800, 6_000, 1_080, date(2024, 1, 8)),
            fact("st1:retained:200", TaxFactKind::Retained, 200, 1_800, 36, date(2024, 1, 20)),
            // outside the period - must be ignored
            fact("s9:collected:1800", TaxFactKind::Collected, 1800, 99_000, 17_820, date(2024, 2, 1)),
        ];
        let as_of = Utc::now();
        let summary = accumulate_period(period_jan(), &facts, as_of);

        assert_eq!(summary.collected_standard_cents, 1_800);
        assert_eq!(summary.collected_reduced_cents, 800);
        assert_eq!(summary.exempt_sales_cents, 2_000);
        assert_eq!(summary.paid_standard_cents, 1_080);
        assert_eq!(summary.retained_cents, 36);
        // 2600 - 1080 - 36
        assert_eq!(summary.net_due_cents, 1_484);
        assert!(summary.net_due_consistent());
    }

    #[test]
    fn test_accumulate_is_idempotent() {
        let facts = vec![
            fact("s1:collected:1800", TaxFactKind::Collected, 1800, 10_000, 1_800, date(2024, 1, 5)),
            fact("p1:paid:1800", TaxFactKind::Paid, 1800, 6_000, 1_080, date(2024, 1, 8)),
        ];
        // Duplicate the whole set - aggregation must not double count.
        let doubled: Vec<TaxFact> = facts.iter().chain(facts.iter()).cloned().collect();

        let as_of = Utc::now();
        let once = accumulate_period(period_jan(), &facts, as_of);
        let twice = accumulate_period(period_jan(), &doubled, as_of);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_negative_net_due_is_credit() {
        let facts = vec![
            fact("s1:collected:1800", TaxFactKind::Collected, 1800, 1_000, 180, date(2024, 1, 5)),
            fact("p1:paid:1800", TaxFactKind::Paid, 1800, 50_000, 9_000, date(2024, 1, 8)),
        ];
        let summary = accumulate_period(period_jan(), &facts, Utc::now());
        assert_eq!(summary.net_due_cents, -8_820);
    }

    #[test]
    fn test_card_retention() {
        // 2% of RD$18.00 of ITBIS = RD$0.36
        let retained = card_retention(Money::from_cents(1_800), TaxRate::from_bps(200));
        assert_eq!(retained.cents(), 36);
    }
}
