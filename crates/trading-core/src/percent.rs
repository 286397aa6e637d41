use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TradingError};

/// A percentage expressed in whole-percent terms (`1.0` means 1%).
///
/// Pattern profit targets and stops are specified this way; strategies
/// convert to a fraction when deriving limit/stop prices from a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PercentNumber(Decimal);

impl PercentNumber {
    pub fn new(percent: Decimal) -> Result<Self> {
        if percent < Decimal::ZERO {
            return Err(TradingError::InvalidArgument(format!(
                "percent must be non-negative, got {percent}"
            )));
        }
        Ok(Self(percent))
    }

    pub fn from_str(s: &str) -> Result<Self> {
        let value: Decimal = s
            .parse()
            .map_err(|_| TradingError::InvalidArgument(format!("not a percent: {s}")))?;
        Self::new(value)
    }

    /// The raw percent value (`1.0` for 1%).
    pub fn as_percent(&self) -> Decimal {
        self.0
    }

    /// The multiplicative fraction (`0.01` for 1%).
    pub fn as_fraction(&self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }
}

impl std::fmt::Display for PercentNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fraction_conversion() {
        let p = PercentNumber::new(dec!(1.0)).unwrap();
        assert_eq!(p.as_percent(), dec!(1.0));
        assert_eq!(p.as_fraction(), dec!(0.01));
    }

    #[test]
    fn parses_from_string() {
        let p = PercentNumber::from_str("0.34").unwrap();
        assert_eq!(p.as_percent(), dec!(0.34));
    }

    #[test]
    fn rejects_negative() {
        assert!(PercentNumber::new(dec!(-1)).is_err());
        assert!(PercentNumber::from_str("abc").is_err());
    }
}
