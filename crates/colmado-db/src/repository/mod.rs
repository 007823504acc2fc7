//! # Repository Layer
//!
//! Data access for the ledger engine, one repository per aggregate.
//!
//! ## Conventions
//! - Read methods hang off the repository structs and use the pool.
//! - Mutating methods are associated functions taking a
//!   `&mut SqliteConnection`, so the engine can compose a full posting
//!   (lot decrements, consumptions, tax facts, journal entry, audit) into
//!   a single transaction.
//! - Guarded UPDATEs return the affected-row count; zero rows means the
//!   precondition no longer holds and surfaces as
//!   [`DbError::ConcurrentModification`](crate::error::DbError).

pub mod audit;
pub mod consumption;
pub mod journal;
pub mod lot;
pub mod period;
pub mod sequence;
pub mod settlement;
pub mod shift;

pub use audit::AuditRepository;
pub use consumption::{ConservationReport, ConsumptionRepository};
pub use journal::JournalRepository;
pub use lot::LotRepository;
pub use period::PeriodRepository;
pub use sequence::SequenceRepository;
pub use settlement::SettlementRepository;
pub use shift::ShiftRepository;
