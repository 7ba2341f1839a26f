use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::error::{DriveGuardError, Result};

/// `round(base_rate × vehicle_price × risk_factor)` to a whole currency unit.
///
/// Halves round away from zero. Inputs must be non-negative.
pub fn compute_premium(
    base_rate: Decimal,
    vehicle_price: Decimal,
    risk_factor: Decimal,
) -> Result<u64> {
    if base_rate.is_sign_negative()
        || vehicle_price.is_sign_negative()
        || risk_factor.is_sign_negative()
    {
        return Err(DriveGuardError::Validation(format!(
            "premium inputs must be non-negative (base_rate={}, vehicle_price={}, risk_factor={})",
            base_rate, vehicle_price, risk_factor
        )));
    }

    let overflow = || {
        DriveGuardError::Validation(format!(
            "premium for base_rate={} vehicle_price={} risk_factor={} is out of range",
            base_rate, vehicle_price, risk_factor
        ))
    };

    let raw = base_rate
        .checked_mul(vehicle_price)
        .and_then(|v| v.checked_mul(risk_factor))
        .ok_or_else(overflow)?;

    raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(overflow)
}
