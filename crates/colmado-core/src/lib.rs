//! # colmado-core: Pure Costing & Accounting Logic
//!
//! This crate is the **heart** of Colmado Ledger. It contains FIFO lot
//! costing, ITBIS (Dominican VAT) computation and balanced journal entry
//! construction as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Colmado Ledger Architecture                         │
//! │                                                                         │
//! │  Sale / Purchase / Return event source (out of scope: POS UI)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    colmado-engine                               │   │
//! │  │    consume lots, post entries, close periods (transactions)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ colmado-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   fifo    │  │  journal  │  │   │
//! │  │   │   Lot     │  │   Money   │  │  planner  │  │  builders │  │   │
//! │  │   │  Entry    │  │  TaxRate  │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                  ┌───────────┐  ┌───────────┐                  │   │
//! │  │                  │   itbis   │  │ validation│                  │   │
//! │  │                  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    colmado-db (Database Layer)                  │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (InventoryLot, JournalEntry, CardSettlement, ...)
//! - [`money`] - Money type with integer centavo arithmetic (no floating point!)
//! - [`fifo`] - FIFO allocation planning over lot snapshots
//! - [`itbis`] - ITBIS computation and period aggregation
//! - [`journal`] - Balanced journal entry construction
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every function is deterministic - same input = same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are in centavos (i64), never floats
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use colmado_core::money::Money;
//! use colmado_core::types::TaxRate;
//!
//! // Create money from centavos (never from floats!)
//! let price = Money::from_cents(10_000); // RD$100.00
//!
//! // ITBIS at the standard 18% rate, round-half-up per DGII convention
//! let rate = TaxRate::from_bps(colmado_core::ITBIS_STANDARD_BPS);
//! let tax = price.itbis(rate);
//! assert_eq!(tax.cents(), 1_800); // RD$18.00
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fifo;
pub mod itbis;
pub mod journal;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use fifo::{Allocation, AllocationPlan, ConsumptionOutcome, LotSnapshot};
pub use journal::EntryDraft;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Standard ITBIS rate in basis points (18%).
pub const ITBIS_STANDARD_BPS: u32 = 1800;

/// Reduced ITBIS rate in basis points (16%, applies to a short list of
/// goods such as yogurt, coffee and edible oils).
pub const ITBIS_REDUCED_BPS: u32 = 1600;

/// The set of ITBIS rates DGII recognizes. Lot creation and sale lines
/// reject any other rate at the boundary.
pub const ALLOWED_ITBIS_BPS: [u32; 3] = [0, ITBIS_REDUCED_BPS, ITBIS_STANDARD_BPS];

/// Default ITBIS retention applied by card processors on settled card
/// sales, in basis points of the ITBIS amount (Norma 08-04: 2%).
pub const CARD_ITBIS_RETENTION_BPS: u32 = 200;

/// Maximum quantity accepted for a single lot or consumption.
///
/// ## Business Reason
/// Prevents accidental over-entry (e.g., scanning a barcode into the
/// quantity field). Can be made configurable per store later.
pub const MAX_LOT_QUANTITY: i64 = 1_000_000;
