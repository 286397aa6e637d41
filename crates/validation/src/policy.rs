use backtest_engine::BackTester;
use rust_decimal::Decimal;

/// Test-statistic policy for permutation runs: how to score a finished
/// backtest, how many trades a score needs to be meaningful, and what to
/// report when a run trades too little.
pub trait StatisticPolicy: Send + Sync {
    fn statistic(&self, backtester: &BackTester) -> Decimal;

    fn min_trades(&self) -> usize;

    fn failure_statistic(&self) -> Decimal;

    fn statistic_or_failure(&self, backtester: &BackTester) -> Decimal {
        if backtester.num_trades() < self.min_trades() {
            self.failure_statistic()
        } else {
            self.statistic(backtester)
        }
    }
}

/// Profit factor of the closed-trade history; the default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfitFactorPolicy;

impl StatisticPolicy for ProfitFactorPolicy {
    fn statistic(&self, backtester: &BackTester) -> Decimal {
        backtester.profit_factor()
    }

    fn min_trades(&self) -> usize {
        3
    }

    fn failure_statistic(&self) -> Decimal {
        Decimal::ZERO
    }
}

/// Compounded return of the closed-trade sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeReturnPolicy;

impl StatisticPolicy for CumulativeReturnPolicy {
    fn statistic(&self, backtester: &BackTester) -> Decimal {
        backtester.cumulative_return()
    }

    fn min_trades(&self) -> usize {
        3
    }

    fn failure_statistic(&self) -> Decimal {
        Decimal::NEGATIVE_ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backtest_engine::BackTester;
    use chrono::NaiveDate;
    use trading_core::DateRange;

    fn empty_backtester() -> BackTester {
        let d1 = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2022, 1, 7).unwrap();
        BackTester::daily(DateRange::new(d1, d2).unwrap())
    }

    #[test]
    fn too_few_trades_reports_failure_statistic() {
        let bt = empty_backtester();
        assert_eq!(
            ProfitFactorPolicy.statistic_or_failure(&bt),
            ProfitFactorPolicy.failure_statistic()
        );
        assert_eq!(
            CumulativeReturnPolicy.statistic_or_failure(&bt),
            Decimal::NEGATIVE_ONE
        );
    }

    #[test]
    fn policies_disagree_on_failure_marker() {
        assert_ne!(
            ProfitFactorPolicy.failure_statistic(),
            CumulativeReturnPolicy.failure_statistic()
        );
    }
}
