//! # Error Types
//!
//! Domain-specific error types for colmado-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  colmado-core errors (this file)                                        │
//! │  ├── CoreError        - Costing/accounting rule violations              │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  colmado-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures, ConcurrentModification        │
//! │                                                                         │
//! │  colmado-engine errors                                                  │
//! │  └── EngineError      - Wraps both, adds retry exhaustion               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller reason code   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! - Validation errors reject immediately, before any mutation - the
//!   caller's responsibility to fix, no retry
//! - `UnbalancedEntry` is an internal invariant violation: it is never
//!   silently corrected and must abort the enclosing transaction
//! - Concurrency conflicts live in the db layer and are retried there

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Costing and accounting rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Lot creation or consumption requested with a non-positive quantity.
    #[error("Invalid quantity: {quantity} (must be > 0)")]
    InvalidQuantity { quantity: i64 },

    /// Lot creation requested with a non-positive unit cost.
    #[error("Invalid unit cost: {cost_cents} centavos (must be > 0)")]
    InvalidCost { cost_cents: i64 },

    /// A tax rate outside the DGII-recognized set.
    #[error("Invalid ITBIS rate: {bps} bps (allowed: 0, 1600, 1800)")]
    InvalidTaxRate { bps: u32 },

    /// A lot adjustment would take remaining below zero or above original.
    ///
    /// ## When This Occurs
    /// - Restocking a return beyond the lot's original quantity
    /// - A direct adjustment racing a concurrent consumption
    #[error("Insufficient quantity on lot {lot_id}: available {available}, requested {requested}")]
    InsufficientLotQuantity {
        lot_id: String,
        available: i64,
        requested: i64,
    },

    /// Debits and credits of a constructed entry do not match.
    ///
    /// This is a programming-error signal, not a user-facing condition:
    /// the builders construct both sides from the same amounts, so an
    /// unbalanced entry means a defect. Callers must abort the enclosing
    /// transaction and log loudly.
    #[error(
        "Unbalanced journal entry from {origin}: debit {total_debit_cents} != credit {total_credit_cents}"
    )]
    UnbalancedEntry {
        // Not `source`: thiserror reserves that name for error chaining.
        origin: String,
        total_debit_cents: i64,
        total_credit_cents: i64,
    },

    /// Attempted posting dated inside a closed or filed period.
    ///
    /// The caller must go through the explicit reopen path for back-dated
    /// corrections.
    #[error("Period {period} is closed")]
    PeriodClosed { period: String },

    /// Period close requested while pending entries exist inside it.
    #[error("Cannot close period {period}: {pending} pending journal entries")]
    OpenTransactionsExist { period: String, pending: i64 },

    /// Reopen requested on a period that is not closed or filed.
    #[error("Period {period} is {status}, not closed or filed")]
    PeriodNotClosed { period: String, status: String },

    /// Void requested on an entry that has not posted.
    #[error("Journal entry {entry_id} is pending and cannot be voided")]
    CannotVoidPending { entry_id: String },

    /// Void requested on an already-voided entry.
    #[error("Journal entry {entry_id} is already voided")]
    AlreadyVoided { entry_id: String },

    /// Settlement amounts violate net = gross - commission - tax.
    #[error(
        "Settlement {settlement_id} amounts inconsistent: net {net_cents} != gross {gross_cents} - commission {commission_cents} - tax {commission_tax_cents}"
    )]
    SettlementAmountMismatch {
        settlement_id: String,
        gross_cents: i64,
        commission_cents: i64,
        commission_tax_cents: i64,
        net_cents: i64,
    },

    /// Close requested on a shift that is already closed.
    #[error("Shift {shift_id} is already closed")]
    ShiftAlreadyClosed { shift_id: String },

    /// No consumptions exist for the transaction being reversed.
    #[error("Nothing to reverse for transaction {transaction_ref}")]
    NothingToReverse { transaction_ref: String },

    /// A return asks for more units than the sale still has returnable.
    #[error(
        "Return of {requested} x {product_id} exceeds sale {sale_ref}: {returnable} returnable"
    )]
    ReturnExceedsSale {
        sale_ref: String,
        product_id: String,
        requested: i64,
        returnable: i64,
    },

    /// Void requested on an NCF that was never issued.
    #[error("NCF {ncf} was never issued")]
    NcfNotIssued { ncf: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements. Used for
/// early validation before any costing logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., malformed period key).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientLotQuantity {
            lot_id: "lot-7".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient quantity on lot lot-7: available 3, requested 5"
        );

        let err = CoreError::PeriodClosed {
            period: "2024-01".to_string(),
        };
        assert_eq!(err.to_string(), "Period 2024-01 is closed");
    }

    #[test]
    fn test_unbalanced_entry_has_no_error_source() {
        use std::error::Error;

        let err = CoreError::UnbalancedEntry {
            origin: "Sale:sale-1".to_string(),
            total_debit_cents: 1_000,
            total_credit_cents: 900,
        };
        assert_eq!(
            err.to_string(),
            "Unbalanced journal entry from Sale:sale-1: debit 1000 != credit 900"
        );
        // The origin is display context, not a chained error cause.
        assert!(err.source().is_none());
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "product_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
