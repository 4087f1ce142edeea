//! Monetary rounding and contribution margin.

use serde::{Deserialize, Serialize};

/// Rounds to 2 decimal places, half away from zero on the scaled value.
///
/// Negative zero is normalized to `0.0`. Non-finite input is returned as `0.0`
/// so a monetary field can never hold `NaN`.
#[must_use]
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let nudged = value + value.signum() * f64::EPSILON;
    let rounded = (nudged * 100.0).round() / 100.0;
    if rounded.abs() < f64::EPSILON {
        0.0
    } else {
        rounded
    }
}

/// Keeps only finite values.
#[must_use]
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Contribution margin of one order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub value: f64,
    /// `true` when cost of goods was known; otherwise `value` is net revenue.
    pub is_real: bool,
}

/// `total + fee + freight - cmv`, where `fee` is already negative and `freight`
/// carries its own sign. Without a positive `cmv` the result is net revenue.
#[must_use]
pub fn contribution_margin(total: f64, fee: Option<f64>, freight: f64, cmv: Option<f64>) -> Margin {
    let fee = fee.unwrap_or(0.0);
    match cmv {
        Some(cmv) if cmv > 0.0 => Margin {
            value: round2(total + fee + freight - cmv),
            is_real: true,
        },
        _ => Margin {
            value: round2(total + fee + freight),
            is_real: false,
        },
    }
}
