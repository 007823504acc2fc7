//! # colmado-db: Database Layer for Colmado Ledger
//!
//! SQLite persistence for lots, consumptions, the journal, tax facts,
//! periods, settlements, shifts and the audit log.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Transaction Composition
//!
//! Read methods hang off repository structs and use the pool. Mutating
//! methods are associated functions taking `&mut SqliteConnection`, so
//! the engine can compose a sale's lot decrements, consumption inserts,
//! tax facts and journal entry into ONE transaction:
//!
//! ```rust,ignore
//! let mut tx = db.begin().await?;
//! LotRepository::apply_delta(&mut tx, &lot_id, -5, 6).await?;
//! ConsumptionRepository::insert(&mut tx, &consumption).await?;
//! let number = SequenceRepository::next(&mut tx, "journal_entry").await?;
//! JournalRepository::insert(&mut tx, &entry).await?;
//! tx.commit().await?;   // or drop => rollback, nothing partial persists
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::audit::AuditRepository;
pub use repository::consumption::{ConservationReport, ConsumptionRepository};
pub use repository::journal::JournalRepository;
pub use repository::lot::LotRepository;
pub use repository::period::PeriodRepository;
pub use repository::sequence::SequenceRepository;
pub use repository::settlement::SettlementRepository;
pub use repository::shift::ShiftRepository;
