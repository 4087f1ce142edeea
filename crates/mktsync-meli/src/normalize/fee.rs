use mktsync_core::money::finite;
use mktsync_core::round2;

use crate::types::MeliOrderItem;

/// Platform fee of an order: Σ `sale_fee × quantity`, stored negative.
///
/// `sale_fee` is reported per unit, so it must be multiplied by the item
/// quantity (1 when absent). Returns `None` when the sum is not positive, which
/// keeps "no fee reported" apart from a real fee.
#[must_use]
pub fn aggregate_fee(items: &[MeliOrderItem]) -> Option<f64> {
    let total: f64 = items
        .iter()
        .map(|item| {
            let fee = finite(item.sale_fee).unwrap_or(0.0);
            let quantity = finite(item.quantity).unwrap_or(1.0);
            fee * quantity
        })
        .sum();

    if total > 0.0 {
        Some(-round2(total))
    } else {
        None
    }
}
