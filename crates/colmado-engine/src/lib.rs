//! # colmado-engine: Orchestration for Colmado Ledger
//!
//! Ties the pure costing/accounting logic in `colmado-core` to the SQLite
//! storage in `colmado-db`. Every operation is one transaction; FIFO
//! consumption runs as plan → compare-and-swap execute with bounded retry.
//!
//! ## Layering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       colmado-engine                                    │
//! │                                                                         │
//! │  POS front end ──► post_sale / post_purchase / post_return              │
//! │  Back office   ──► record/reconcile settlements, period lifecycle,      │
//! │                    shifts, NCF, manual entries, voids                   │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  colmado-core (pure plans & drafts)    colmado-db (guarded SQL)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let engine = LedgerEngine::new(db, EngineConfig::default());
//!
//! let outcome = engine.post_sale(&sale, "cajero-1").await?;
//! assert!(outcome.entry.is_balanced());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod ncf;
pub mod period;
pub mod posting;
pub mod settlement;
pub mod shift;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use engine::{LedgerEngine, NewLot};
pub use error::{EngineError, EngineResult};
pub use posting::{PurchaseOutcome, ReturnOutcome, SaleOutcome, Shortfall};
pub use settlement::NewSettlement;
