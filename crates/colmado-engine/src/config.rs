//! # Engine Configuration

use colmado_core::CARD_ITBIS_RETENTION_BPS;

/// Tunable knobs for the ledger engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ITBIS retention applied by card processors, in basis points of the
    /// ITBIS amount on settled sales (Norma 08-04: 2%).
    pub retention_rate_bps: u32,

    /// How many times a posting operation re-reads and re-plans after a
    /// compare-and-swap conflict before giving up.
    pub max_conflict_retries: u32,

    /// Who to record in the audit log when no actor is given.
    pub default_actor: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            retention_rate_bps: CARD_ITBIS_RETENTION_BPS,
            max_conflict_retries: 5,
            default_actor: "system".to_string(),
        }
    }
}

impl EngineConfig {
    /// Sets the card ITBIS retention rate.
    pub fn retention_rate_bps(mut self, bps: u32) -> Self {
        self.retention_rate_bps = bps;
        self
    }

    /// Sets the conflict retry budget.
    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}
