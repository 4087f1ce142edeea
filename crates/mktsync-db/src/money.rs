//! `f64` <-> `NUMERIC(14,2)` conversion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::DbError;

/// Converts a monetary value to a 2-place decimal.
///
/// # Errors
///
/// Returns [`DbError::InvalidData`] for `NaN` or infinite input.
pub fn to_decimal(field: &str, value: f64) -> Result<Decimal, DbError> {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| DbError::InvalidData(format!("{field} is not a finite number: {value}")))
}

/// Optional variant of [`to_decimal`].
///
/// # Errors
///
/// Same as [`to_decimal`].
pub fn to_decimal_opt(field: &str, value: Option<f64>) -> Result<Option<Decimal>, DbError> {
    value.map(|v| to_decimal(field, v)).transpose()
}

/// Converts a stored decimal back to `f64`.
#[must_use]
pub fn from_decimal(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
