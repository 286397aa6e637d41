use std::sync::{Arc, Mutex};

use backtest_engine::{BackTester, BacktestStrategy};
use parallel_exec::{Executor, TaskHandle};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use trading_core::{Result, TradingError};

use crate::policy::StatisticPolicy;
use crate::preparer::lock_error;
use crate::synthetic_market::SyntheticMarketGenerator;
use crate::types::StrategyContext;

/// What a permutation test reports beyond the p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PValueReturnPolicy {
    #[default]
    PValueOnly,
    WithTestStatistic,
}

/// How the null distribution is accumulated across permutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullAccumulationPolicy {
    /// Track only the running maximum (enough for max-statistic tests).
    #[default]
    MaxStatistic,
    /// Keep every permuted statistic (for diagnostics and MaxStat-family
    /// procedures that need the full distribution).
    AllStatistics,
}

/// Result of a single-strategy permutation test.
#[derive(Debug, Clone, Serialize)]
pub struct PermutationTestResult {
    pub p_value: Decimal,
    /// Largest permuted statistic, present under
    /// [`PValueReturnPolicy::WithTestStatistic`].
    pub summary_statistic: Option<Decimal>,
    /// Full null distribution, present under
    /// [`NullAccumulationPolicy::AllStatistics`].
    pub null_distribution: Option<Vec<Decimal>>,
}

/// Single-pattern Monte-Carlo permutation test: re-runs one strategy on
/// permuted markets and reports the fraction of permutations whose
/// statistic reaches the baseline.
pub struct MonteCarloPermutationTest {
    num_permutations: u32,
    master_seed: u64,
    return_policy: PValueReturnPolicy,
    null_policy: NullAccumulationPolicy,
}

struct NullAccumulator {
    exceedances: u32,
    max_statistic: Option<Decimal>,
    all_statistics: Vec<Decimal>,
}

impl MonteCarloPermutationTest {
    pub fn new(num_permutations: u32, master_seed: u64) -> Result<Self> {
        if num_permutations == 0 {
            return Err(TradingError::InvalidArgument(
                "number of permutations must be positive".to_string(),
            ));
        }
        Ok(Self {
            num_permutations,
            master_seed,
            return_policy: PValueReturnPolicy::default(),
            null_policy: NullAccumulationPolicy::default(),
        })
    }

    pub fn with_policies(
        mut self,
        return_policy: PValueReturnPolicy,
        null_policy: NullAccumulationPolicy,
    ) -> Self {
        self.return_policy = return_policy;
        self.null_policy = null_policy;
        self
    }

    pub fn num_permutations(&self) -> u32 {
        self.num_permutations
    }

    /// Run the test for one strategy context. Each permutation task gets
    /// the child seed `master_seed + index`, so the result is a pure
    /// function of (seed, inputs).
    pub fn run(
        &self,
        template: &BackTester,
        context: &StrategyContext,
        generator: &Arc<SyntheticMarketGenerator>,
        policy: Arc<dyn StatisticPolicy>,
        executor: &dyn Executor,
    ) -> Result<PermutationTestResult> {
        let keep_all = self.null_policy == NullAccumulationPolicy::AllStatistics;
        let accumulator = Arc::new(Mutex::new(NullAccumulator {
            exceedances: 0,
            max_statistic: None,
            all_statistics: Vec::new(),
        }));

        let mut handles: Vec<TaskHandle> = Vec::with_capacity(self.num_permutations as usize);
        for index in 0..u64::from(self.num_permutations) {
            let seed = self.master_seed.wrapping_add(index);
            let generator = generator.clone();
            let strategy = context.strategy.clone();
            let baseline = context.baseline_stat;
            let policy = policy.clone();
            let accumulator = accumulator.clone();
            let mut backtester = template.clone_empty();
            handles.push(executor.submit(Box::new(move || {
                let portfolio = generator.permuted_portfolio(seed)?;
                backtester.add_strategy(strategy.clone_with_portfolio(portfolio));
                backtester.backtest()?;
                let statistic = policy.statistic_or_failure(&backtester);

                let mut acc = accumulator.lock().map_err(lock_error)?;
                if statistic >= baseline {
                    acc.exceedances += 1;
                }
                acc.max_statistic = Some(match acc.max_statistic {
                    Some(current) => current.max(statistic),
                    None => statistic,
                });
                if keep_all {
                    acc.all_statistics.push(statistic);
                }
                Ok(())
            })));
        }
        executor.wait_all(handles)?;

        let accumulator = Arc::try_unwrap(accumulator)
            .map_err(lock_error)?
            .into_inner()
            .map_err(lock_error)?;
        let p_value =
            Decimal::from(accumulator.exceedances) / Decimal::from(self.num_permutations);
        info!(
            strategy = context.strategy.name(),
            p = %p_value,
            "single-pattern permutation test complete"
        );

        Ok(PermutationTestResult {
            p_value,
            summary_statistic: match self.return_policy {
                PValueReturnPolicy::PValueOnly => None,
                PValueReturnPolicy::WithTestStatistic => accumulator.max_statistic,
            },
            null_distribution: keep_all.then_some(accumulator.all_statistics),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ProfitFactorPolicy;
    use crate::preparer::StrategyDataPreparer;
    use chrono::NaiveDate;
    use market_data::{OhlcEntry, OhlcSeries, Security};
    use parallel_exec::{InlineExecutor, ThreadPoolExecutor};
    use pattern_catalog::{
        BarReference, PatternCatalog, PatternExpr, PriceField, PricePattern, TradeDirection,
    };
    use rust_decimal_macros::dec;
    use trading_core::{DateRange, PercentNumber, TimeFrame};

    fn base_security() -> Arc<Security> {
        let mut series = OhlcSeries::new(TimeFrame::Daily);
        let mut close = dec!(100.00);
        for day in 1..=25u32 {
            let open = close + dec!(0.05);
            let high = open + dec!(1.75);
            let low = open - dec!(1.25);
            let new_close = if day % 4 == 0 { open - dec!(0.70) } else { open + dec!(0.90) };
            series
                .add_entry(
                    OhlcEntry::new_eod(
                        NaiveDate::from_ymd_opt(2022, 7, day).unwrap(),
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

    fn template() -> BackTester {
        BackTester::daily(
            DateRange::new(
                NaiveDate::from_ymd_opt(2022, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2022, 7, 25).unwrap(),
            )
            .unwrap(),
        )
    }

    fn single_context() -> (StrategyContext, Arc<Security>, BackTester) {
        let security = base_security();
        let mut catalog = PatternCatalog::new();
        catalog.add(PricePattern::new(
            "bullish",
            PatternExpr::gt(
                BarReference::new(PriceField::Close, 0),
                BarReference::new(PriceField::Open, 0),
            ),
            TradeDirection::Long,
            Some(PercentNumber::from_str("1.0").unwrap()),
            Some(PercentNumber::from_str("0.5").unwrap()),
        ));
        let template = template();
        let data = StrategyDataPreparer::prepare(
            &template,
            &security,
            &catalog,
            Arc::new(ProfitFactorPolicy),
            &InlineExecutor::new(),
        )
        .unwrap();
        (data.into_iter().next().unwrap(), security, template)
    }

    #[test]
    fn rejects_zero_permutations() {
        assert!(MonteCarloPermutationTest::new(0, 1).is_err());
    }

    #[test]
    fn p_value_is_a_probability_and_deterministic() {
        let (context, security, template) = single_context();
        let generator = Arc::new(SyntheticMarketGenerator::new(security).unwrap());
        let test = MonteCarloPermutationTest::new(20, 42).unwrap();

        let first = test
            .run(
                &template,
                &context,
                &generator,
                Arc::new(ProfitFactorPolicy),
                &InlineExecutor::new(),
            )
            .unwrap();
        assert!(first.p_value >= dec!(0) && first.p_value <= dec!(1));
        assert!(first.summary_statistic.is_none());
        assert!(first.null_distribution.is_none());

        let second = test
            .run(
                &template,
                &context,
                &generator,
                Arc::new(ProfitFactorPolicy),
                &InlineExecutor::new(),
            )
            .unwrap();
        assert_eq!(first.p_value, second.p_value);
    }

    #[test]
    fn parallel_execution_matches_inline() {
        let (context, security, template) = single_context();
        let generator = Arc::new(SyntheticMarketGenerator::new(security).unwrap());
        let test = MonteCarloPermutationTest::new(16, 7).unwrap();

        let inline_result = test
            .run(
                &template,
                &context,
                &generator,
                Arc::new(ProfitFactorPolicy),
                &InlineExecutor::new(),
            )
            .unwrap();
        let pool = ThreadPoolExecutor::new(4).unwrap();
        let pool_result = test
            .run(
                &template,
                &context,
                &generator,
                Arc::new(ProfitFactorPolicy),
                &pool,
            )
            .unwrap();
        assert_eq!(inline_result.p_value, pool_result.p_value);
    }

    #[test]
    fn policies_control_the_report_shape() {
        let (context, security, template) = single_context();
        let generator = Arc::new(SyntheticMarketGenerator::new(security).unwrap());
        let test = MonteCarloPermutationTest::new(8, 3)
            .unwrap()
            .with_policies(
                PValueReturnPolicy::WithTestStatistic,
                NullAccumulationPolicy::AllStatistics,
            );

        let result = test
            .run(
                &template,
                &context,
                &generator,
                Arc::new(ProfitFactorPolicy),
                &InlineExecutor::new(),
            )
            .unwrap();
        assert!(result.summary_statistic.is_some());
        let null = result.null_distribution.unwrap();
        assert_eq!(null.len(), 8);
        let max = null.iter().copied().max().unwrap();
        assert_eq!(result.summary_statistic.unwrap(), max);
    }
}
