use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use trading_core::{Result, TradingError};

use crate::series::OhlcSeries;

/// Standard equity tick: one cent.
fn equity_tick() -> Decimal {
    Decimal::new(1, 2)
}

/// A tradeable instrument: identity, tick geometry and its price history.
#[derive(Debug, Clone)]
pub struct Security {
    symbol: String,
    name: String,
    tick_size: Decimal,
    big_point_value: Decimal,
    is_equity: bool,
    series: Arc<OhlcSeries>,
}

impl Security {
    /// An equity: 0.01 tick, big point 1.
    pub fn equity(symbol: &str, name: &str, series: Arc<OhlcSeries>) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            tick_size: equity_tick(),
            big_point_value: Decimal::ONE,
            is_equity: true,
            series,
        }
    }

    /// A futures contract with explicit tick size and big-point value.
    pub fn futures(
        symbol: &str,
        name: &str,
        tick_size: Decimal,
        big_point_value: Decimal,
        series: Arc<OhlcSeries>,
    ) -> Result<Self> {
        if tick_size <= Decimal::ZERO || big_point_value <= Decimal::ZERO {
            return Err(TradingError::InvalidArgument(format!(
                "futures {symbol}: tick {tick_size} / big point {big_point_value} must be positive"
            )));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            tick_size,
            big_point_value,
            is_equity: false,
            series,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tick_size(&self) -> Decimal {
        self.tick_size
    }

    pub fn big_point_value(&self) -> Decimal {
        self.big_point_value
    }

    pub fn is_equity(&self) -> bool {
        self.is_equity
    }

    pub fn series(&self) -> &Arc<OhlcSeries> {
        &self.series
    }

    /// The same security with a different price history (used when running
    /// against permuted series).
    pub fn with_series(&self, series: Arc<OhlcSeries>) -> Self {
        Self {
            series,
            ..self.clone()
        }
    }
}

/// An insertion-ordered collection of securities keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    name: String,
    securities: Vec<Arc<Security>>,
    by_symbol: HashMap<String, usize>,
}

impl Portfolio {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            securities: Vec::new(),
            by_symbol: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_security(&mut self, security: Arc<Security>) -> Result<()> {
        if self.by_symbol.contains_key(security.symbol()) {
            return Err(TradingError::InvalidArgument(format!(
                "security {} already in portfolio {}",
                security.symbol(),
                self.name
            )));
        }
        self.by_symbol
            .insert(security.symbol().to_string(), self.securities.len());
        self.securities.push(security);
        Ok(())
    }

    pub fn security(&self, symbol: &str) -> Result<&Arc<Security>> {
        self.by_symbol
            .get(symbol)
            .map(|&i| &self.securities[i])
            .ok_or_else(|| TradingError::NotFound(format!("security {symbol}")))
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    /// Securities in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Security>> {
        self.securities.iter()
    }

    pub fn first(&self) -> Option<&Arc<Security>> {
        self.securities.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trading_core::TimeFrame;

    #[test]
    fn equity_defaults() {
        let series = Arc::new(OhlcSeries::new(TimeFrame::Daily));
        let sec = Security::equity("QQQ", "QQQ Trust", series);
        assert_eq!(sec.tick_size(), dec!(0.01));
        assert_eq!(sec.big_point_value(), dec!(1));
        assert!(sec.is_equity());
    }

    #[test]
    fn futures_validation() {
        let series = Arc::new(OhlcSeries::new(TimeFrame::Daily));
        let sec = Security::futures("ES", "E-mini S&P", dec!(0.25), dec!(50), series.clone());
        assert!(sec.is_ok());
        assert!(Security::futures("ES", "bad", dec!(0), dec!(50), series).is_err());
    }

    #[test]
    fn portfolio_rejects_duplicate_symbol() {
        let series = Arc::new(OhlcSeries::new(TimeFrame::Daily));
        let mut p = Portfolio::new("Test");
        p.add_security(Arc::new(Security::equity("QQQ", "QQQ", series.clone())))
            .unwrap();
        let err = p
            .add_security(Arc::new(Security::equity("QQQ", "again", series)))
            .unwrap_err();
        assert!(matches!(err, TradingError::InvalidArgument(_)));
        assert_eq!(p.len(), 1);
        assert!(p.security("QQQ").is_ok());
        assert!(p.security("SPY").is_err());
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let series = Arc::new(OhlcSeries::new(TimeFrame::Daily));
        let mut p = Portfolio::new("Test");
        for sym in ["SPY", "QQQ", "IWM"] {
            p.add_security(Arc::new(Security::equity(sym, sym, series.clone())))
                .unwrap();
        }
        let symbols: Vec<&str> = p.iter().map(|s| s.symbol()).collect();
        assert_eq!(symbols, vec!["SPY", "QQQ", "IWM"]);
    }
}
