use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, TradingError};

/// Round a price to the nearest multiple of the tick, halves away from zero.
///
/// All reconstructed and fill prices pass through here: `101.505` at a
/// `0.01` tick becomes `101.51`, `501.495` becomes `501.50`.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Result<Decimal> {
    if tick <= Decimal::ZERO {
        return Err(TradingError::InvalidArgument(format!(
            "tick size must be positive, got {tick}"
        )));
    }
    let ticks = (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Ok((ticks * tick).normalize())
}

/// Round a price up to the next tick multiple.
///
/// Used for barriers that must err away from the fill on the high side
/// (long profit targets, short stops).
pub fn ceil_to_tick(price: Decimal, tick: Decimal) -> Result<Decimal> {
    if tick <= Decimal::ZERO {
        return Err(TradingError::InvalidArgument(format!(
            "tick size must be positive, got {tick}"
        )));
    }
    let ticks = (price / tick).ceil();
    Ok((ticks * tick).normalize())
}

/// Round a price down to the previous tick multiple.
///
/// Used for barriers that must err away from the fill on the low side
/// (long stops, short profit targets).
pub fn floor_to_tick(price: Decimal, tick: Decimal) -> Result<Decimal> {
    if tick <= Decimal::ZERO {
        return Err(TradingError::InvalidArgument(format!(
            "tick size must be positive, got {tick}"
        )));
    }
    let ticks = (price / tick).floor();
    Ok((ticks * tick).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_to_tick(dec!(101.505), dec!(0.01)).unwrap(), dec!(101.51));
        assert_eq!(round_to_tick(dec!(501.495), dec!(0.01)).unwrap(), dec!(501.50));
    }

    #[test]
    fn rounds_to_quarter_ticks() {
        assert_eq!(round_to_tick(dec!(1234.30), dec!(0.25)).unwrap(), dec!(1234.25));
        assert_eq!(round_to_tick(dec!(1234.40), dec!(0.25)).unwrap(), dec!(1234.5));
        assert_eq!(round_to_tick(dec!(1234.125), dec!(0.25)).unwrap(), dec!(1234.25));
    }

    #[test]
    fn exact_multiples_unchanged() {
        assert_eq!(round_to_tick(dec!(100.25), dec!(0.25)).unwrap(), dec!(100.25));
    }

    #[test]
    fn rejects_bad_tick() {
        assert!(round_to_tick(dec!(100), dec!(0)).is_err());
        assert!(round_to_tick(dec!(100), dec!(-0.01)).is_err());
        assert!(ceil_to_tick(dec!(100), dec!(0)).is_err());
        assert!(floor_to_tick(dec!(100), dec!(0)).is_err());
    }

    #[test]
    fn ceil_and_floor_direction() {
        assert_eq!(ceil_to_tick(dec!(101.505), dec!(0.01)).unwrap(), dec!(101.51));
        assert_eq!(ceil_to_tick(dec!(501.495), dec!(0.01)).unwrap(), dec!(501.50));
        assert_eq!(floor_to_tick(dec!(99.9975), dec!(0.01)).unwrap(), dec!(99.99));
        assert_eq!(floor_to_tick(dec!(494.01), dec!(0.01)).unwrap(), dec!(494.01));
        assert_eq!(ceil_to_tick(dec!(100.30), dec!(0.25)).unwrap(), dec!(100.50));
        assert_eq!(floor_to_tick(dec!(100.30), dec!(0.25)).unwrap(), dec!(100.25));
    }
}
