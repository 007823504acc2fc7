//! # Engine Error Types
//!
//! Errors surfaced by posting operations. Domain rule violations arrive
//! as [`CoreError`], storage failures as [`DbError`]; the engine adds
//! only the conditions it owns (retry exhaustion, shift bookkeeping).

use thiserror::Error;

use colmado_core::CoreError;
use colmado_db::DbError;

/// Errors from posting and lifecycle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A costing or accounting rule was violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage operation failed.
    #[error(transparent)]
    Db(DbError),

    /// An operation kept losing compare-and-swap races and gave up.
    ///
    /// Each attempt re-reads lot state and re-plans, so exhaustion means
    /// sustained contention on the same products, not a stuck record.
    #[error("{operation} abandoned after {attempts} conflicting attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    /// A shift is already open; close it before opening another.
    #[error("Shift {shift_id} is still open")]
    ShiftAlreadyOpen { shift_id: String },
}

/// A guarded write that deterministically broke a domain invariant
/// surfaces as the domain error, not a storage failure.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Invariant(core) => EngineError::Core(core),
            other => EngineError::Db(other),
        }
    }
}

impl EngineError {
    /// Whether this error came from a stale compare-and-swap and the
    /// whole operation can be retried from a fresh read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Db(e) if e.is_retryable())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
