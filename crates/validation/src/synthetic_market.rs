use std::sync::Arc;

use market_data::{DailySyntheticSeries, IntradaySyntheticSeries, Portfolio, Security};
use trading_core::{Result, TimeFrame};

/// Builds permuted single-security portfolios for permutation tasks.
///
/// Factor extraction happens once at construction; each task then asks for
/// an independent permutation under its own child seed, so results are
/// reproducible regardless of scheduling order.
pub struct SyntheticMarketGenerator {
    security: Arc<Security>,
    kind: GeneratorKind,
}

enum GeneratorKind {
    Eod(DailySyntheticSeries),
    Intraday(IntradaySyntheticSeries),
}

impl SyntheticMarketGenerator {
    pub fn new(security: Arc<Security>) -> Result<Self> {
        let series = security.series();
        let kind = if series.timeframe() == TimeFrame::Intraday {
            GeneratorKind::Intraday(IntradaySyntheticSeries::new(series, security.tick_size())?)
        } else {
            GeneratorKind::Eod(DailySyntheticSeries::new(series, security.tick_size())?)
        };
        Ok(Self { security, kind })
    }

    pub fn security(&self) -> &Arc<Security> {
        &self.security
    }

    /// A portfolio holding the same security over a permuted price history.
    pub fn permuted_portfolio(&self, seed: u64) -> Result<Arc<Portfolio>> {
        let permuted = match &self.kind {
            GeneratorKind::Eod(generator) => generator.permute(seed)?,
            GeneratorKind::Intraday(generator) => generator.permute(seed)?,
        };
        let security = Arc::new(self.security.with_series(Arc::new(permuted)));
        let mut portfolio = Portfolio::new(&format!("{} Portfolio", self.security.symbol()));
        portfolio.add_security(security)?;
        Ok(Arc::new(portfolio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_data::{OhlcEntry, OhlcSeries};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use trading_core::TimeFrame;

    fn daily_security(n: u32) -> Arc<Security> {
        let mut series = OhlcSeries::new(TimeFrame::Daily);
        let mut close = dec!(100.00);
        for day in 1..=n {
            let open = close + dec!(0.10);
            let high = open + dec!(1.00) + Decimal::from(day % 3) * dec!(0.25);
            let low = open - dec!(0.75);
            let new_close = open + dec!(0.30);
            series
                .add_entry(
                    OhlcEntry::new_eod(
                        NaiveDate::from_ymd_opt(2022, 3, day).unwrap(),
                        open,
                        high,
                        low,
                        new_close,
                        dec!(1000),
                        TimeFrame::Daily,
                    )
                    .unwrap(),
                )
                .unwrap();
            close = new_close;
        }
        Arc::new(Security::equity("QQQ", "QQQ", Arc::new(series)))
    }

    #[test]
    fn permuted_portfolio_preserves_identity_and_length() {
        let security = daily_security(12);
        let generator = SyntheticMarketGenerator::new(security.clone()).unwrap();
        let portfolio = generator.permuted_portfolio(17).unwrap();
        let permuted = portfolio.security("QQQ").unwrap();
        assert_eq!(permuted.symbol(), "QQQ");
        assert_eq!(permuted.tick_size(), security.tick_size());
        assert_eq!(permuted.series().len(), security.series().len());
        assert_eq!(
            permuted.series().first().unwrap(),
            security.series().first().unwrap()
        );
    }

    #[test]
    fn same_seed_reproduces_the_market() {
        let generator = SyntheticMarketGenerator::new(daily_security(12)).unwrap();
        let a = generator.permuted_portfolio(5).unwrap();
        let b = generator.permuted_portfolio(5).unwrap();
        assert_eq!(
            a.security("QQQ").unwrap().series(),
            b.security("QQQ").unwrap().series()
        );
    }

    #[test]
    fn distinct_seeds_differ() {
        let generator = SyntheticMarketGenerator::new(daily_security(12)).unwrap();
        let a = generator.permuted_portfolio(5).unwrap();
        let b = generator.permuted_portfolio(6).unwrap();
        assert_ne!(
            a.security("QQQ").unwrap().series(),
            b.security("QQQ").unwrap().series()
        );
    }
}
