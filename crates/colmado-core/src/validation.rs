//! # Validation Module
//!
//! Boundary validation for inputs to the costing engine.
//!
//! ## Validation Strategy
//! The schema behind this engine is deliberately permissive (shared
//! store, loose types), so every rule is enforced here at the boundary
//! *before* any mutation, and again by the database constraints as a
//! last line. Rejected input never touches a lot or the journal.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{PurchaseLine, SaleLine, TaxRate};
use crate::{ALLOWED_ITBIS_BPS, MAX_LOT_QUANTITY};

/// Validates a quantity for lot creation or consumption.
pub fn validate_quantity(quantity: i64) -> CoreResult<()> {
    if quantity <= 0 {
        return Err(CoreError::InvalidQuantity { quantity });
    }
    if quantity > MAX_LOT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LOT_QUANTITY,
        }
        .into());
    }
    Ok(())
}

/// Validates a unit cost for lot creation.
pub fn validate_unit_cost(cost_cents: i64) -> CoreResult<()> {
    if cost_cents <= 0 {
        return Err(CoreError::InvalidCost { cost_cents });
    }
    Ok(())
}

/// Validates that a tax rate is one DGII recognizes.
pub fn validate_tax_rate(rate: TaxRate) -> CoreResult<()> {
    if ALLOWED_ITBIS_BPS.contains(&rate.bps()) {
        Ok(())
    } else {
        Err(CoreError::InvalidTaxRate { bps: rate.bps() })
    }
}

/// Validates a non-empty identifier (product id, transaction ref, ...).
pub fn validate_ref(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        }
        .into());
    }
    if value.len() > 100 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 100,
        }
        .into());
    }
    Ok(())
}

/// Validates one sale line end to end.
pub fn validate_sale_line(line: &SaleLine) -> CoreResult<()> {
    validate_ref("product_id", &line.product_id)?;
    validate_quantity(line.quantity)?;
    if line.unit_price_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit_price_cents".to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }
    validate_tax_rate(line.tax_rate())
}

/// Validates one purchase line end to end.
pub fn validate_purchase_line(line: &PurchaseLine) -> CoreResult<()> {
    validate_ref("product_id", &line.product_id)?;
    validate_quantity(line.quantity)?;
    validate_unit_cost(line.unit_cost_cents)?;
    validate_tax_rate(line.tax_rate())
}
