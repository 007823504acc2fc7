//! # NCF Issuance
//!
//! Comprobantes fiscales (NCF): serialized per-series numbering for the
//! receipts DGII requires on fiscal sales. A series is a prefix such as
//! `B01` (crédito fiscal) or `B02` (consumo); the issued number is the
//! prefix plus an eight-digit sequential, e.g. `B0200000042`.
//!
//! Issuance shares the ledger's sequence table, so a number can never be
//! handed out twice, and every issue/void lands in the audit log - DGII
//! asks for the gaps.

use serde::Serialize;
use tracing::info;

use colmado_core::{validation, AuditAction, CoreError};
use colmado_db::SequenceRepository;

use crate::engine::LedgerEngine;
use crate::error::EngineResult;

/// Splits an NCF into its series prefix and sequential number.
///
/// The sequential is the trailing eight digits; everything before it is
/// the series (`B0200000042` → `("B02", 42)`).
fn parse_ncf(ncf: &str) -> Option<(&str, i64)> {
    if ncf.len() <= 8 {
        return None;
    }
    let (series, digits) = ncf.split_at(ncf.len() - 8);
    if series.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: i64 = digits.parse().ok()?;
    if number < 1 {
        return None;
    }
    Some((series, number))
}

#[derive(Serialize)]
struct NcfIssue<'a> {
    ncf: &'a str,
    series: &'a str,
    document_ref: &'a str,
}

impl LedgerEngine {
    /// Issues the next NCF in a series for a document, e.g.
    /// `issue_ncf("B02", "sale-17", cashier)` → `B0200000001`.
    pub async fn issue_ncf(
        &self,
        series: &str,
        document_ref: &str,
        actor: &str,
    ) -> EngineResult<String> {
        validation::validate_ref("ncf series", series)?;
        validation::validate_ref("document_ref", document_ref)?;

        let sequence_name = format!("ncf:{series}");
        let mut tx = self.database().begin().await?;

        SequenceRepository::ensure(&mut tx, &sequence_name).await?;
        let number = SequenceRepository::next(&mut tx, &sequence_name).await?;
        let ncf = format!("{series}{number:08}");

        let issue = NcfIssue {
            ncf: &ncf,
            series,
            document_ref,
        };
        Self::append_audit(
            &mut tx,
            AuditAction::NcfIssued,
            "ncf",
            &ncf,
            actor,
            None,
            Some(serde_json::to_string(&issue).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(ncf = %ncf, document_ref, "NCF issued");
        Ok(ncf)
    }

    /// Voids an issued NCF (spoiled receipt, cancelled sale). The number
    /// stays burned; DGII reporting needs the void on record.
    ///
    /// Refuses numbers the series has not issued - a void of a
    /// never-issued comprobante would corrupt the gap report.
    pub async fn void_ncf(&self, ncf: &str, reason: &str, actor: &str) -> EngineResult<()> {
        validation::validate_ref("ncf", ncf)?;
        validation::validate_ref("void reason", reason)?;
        let Some((series, number)) = parse_ncf(ncf) else {
            return Err(CoreError::NcfNotIssued {
                ncf: ncf.to_string(),
            }
            .into());
        };

        let mut tx = self.database().begin().await?;
        let issued_through =
            SequenceRepository::current(&mut tx, &format!("ncf:{series}")).await?;
        match issued_through {
            Some(high) if number <= high => {}
            _ => {
                return Err(CoreError::NcfNotIssued {
                    ncf: ncf.to_string(),
                }
                .into());
            }
        }
        Self::append_audit(
            &mut tx,
            AuditAction::NcfVoided,
            "ncf",
            ncf,
            actor,
            None,
            Some(serde_json::to_string(reason).map_err(colmado_db::DbError::from)?),
        )
        .await?;
        tx.commit().await.map_err(colmado_db::DbError::from)?;

        info!(ncf, reason, "NCF voided");
        Ok(())
    }
}
