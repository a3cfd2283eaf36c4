use core_types::ContractSpec;
use rust_decimal::Decimal;

/// Computes the order size of one leg in contracts.
///
/// notional = margin * leverage, size = notional / last_price floored to the contract's
/// step. A size below the contract minimum comes back as zero and the leg must be dropped.
/// A non-positive price or step, or a notional too large to represent, also yields zero.
pub fn size_leg(
    symbol: &str,
    last_price: Decimal,
    margin: Decimal,
    leverage: Decimal,
    spec: &ContractSpec,
) -> Decimal {
    if last_price <= Decimal::ZERO {
        tracing::debug!(symbol, %last_price, "No usable price, leg sized to zero.");
        return Decimal::ZERO;
    }
    if spec.size_step <= Decimal::ZERO {
        tracing::debug!(symbol, step = %spec.size_step, "Invalid size step, leg sized to zero.");
        return Decimal::ZERO;
    }

    let Some(notional) = margin.checked_mul(leverage) else {
        tracing::warn!(symbol, %margin, %leverage, "Notional overflows, leg sized to zero.");
        return Decimal::ZERO;
    };
    let raw = notional.checked_div(last_price).unwrap_or(Decimal::ZERO);
    let steps = raw.checked_div(spec.size_step).unwrap_or(Decimal::ZERO).floor();
    let size = steps.checked_mul(spec.size_step).unwrap_or(Decimal::ZERO).normalize();

    if size <= Decimal::ZERO || size < spec.min_size {
        return Decimal::ZERO;
    }
    size
}
