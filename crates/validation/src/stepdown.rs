//! Masters-style step-down permutation testing with strong family-wise
//! error control, in the naive (per-step re-permutation) and improved
//! (single bulk sweep) variants.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use backtest_engine::{BackTester, BacktestStrategy};
use dashmap::DashMap;
use parallel_exec::{Executor, TaskHandle};
use rust_decimal::Decimal;
use tracing::{debug, info};
use trading_core::{Result, TradingError};

use crate::policy::StatisticPolicy;
use crate::preparer::lock_error;
use crate::synthetic_market::SyntheticMarketGenerator;
use crate::types::StrategyDataContainer;

/// Indices of `data` ordered by descending baseline statistic.
fn descending_order(data: &StrategyDataContainer) -> Vec<usize> {
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.sort_by(|&a, &b| data[b].baseline_stat.cmp(&data[a].baseline_stat));
    order
}

/// The step-down inclusion loop over precomputed exceedance counts.
///
/// `ordered` carries `(index, baseline, count)` sorted by descending
/// baseline, where `count` is already `1 + #exceedances`. Each raw p-value
/// is `count / (N + 1)`; adjustment takes the running maximum, and the
/// first failure against `alpha` propagates its p-value to every remaining
/// strategy.
pub fn step_down_adjusted_pvalues(
    ordered: &[(usize, Decimal, u32)],
    num_permutations: u32,
    alpha: Decimal,
) -> HashMap<usize, Decimal> {
    let denominator = Decimal::from(num_permutations + 1);
    let mut pvalues = HashMap::with_capacity(ordered.len());
    let mut last_adjusted = Decimal::ZERO;

    for (step, &(index, _baseline, count)) in ordered.iter().enumerate() {
        let raw = Decimal::from(count) / denominator;
        let adjusted = raw.max(last_adjusted);
        pvalues.insert(index, adjusted);

        if adjusted <= alpha {
            last_adjusted = adjusted;
        } else {
            for &(later_index, _, _) in &ordered[step + 1..] {
                pvalues.insert(later_index, adjusted);
            }
            break;
        }
    }
    pvalues
}

/// Naive Romano–Wolf step-down: each step runs its own full set of
/// permutations, re-backtesting only the strategies still active and taking
/// the maximum statistic across them.
pub struct MastersRomanoWolf {
    num_permutations: u32,
    master_seed: u64,
}

impl MastersRomanoWolf {
    pub fn new(num_permutations: u32, master_seed: u64) -> Result<Self> {
        if num_permutations == 0 {
            return Err(TradingError::InvalidArgument(
                "number of permutations must be positive".to_string(),
            ));
        }
        Ok(Self {
            num_permutations,
            master_seed,
        })
    }

    /// Adjusted p-values keyed by the strategy's index in `data`.
    pub fn run(
        &self,
        data: &StrategyDataContainer,
        template: &BackTester,
        generator: &Arc<SyntheticMarketGenerator>,
        policy: Arc<dyn StatisticPolicy>,
        executor: &dyn Executor,
        alpha: Decimal,
    ) -> Result<HashMap<usize, Decimal>> {
        if data.is_empty() {
            return Err(TradingError::PermutationFailure(
                "no strategies to test".to_string(),
            ));
        }
        let order = descending_order(data);
        let mut active: Vec<usize> = order.clone();
        let mut pvalues = HashMap::with_capacity(data.len());
        let mut last_adjusted = Decimal::ZERO;
        let denominator = Decimal::from(self.num_permutations + 1);

        for (step, &index) in order.iter().enumerate() {
            let baseline = data[index].baseline_stat;
            let exceedances = self.max_statistic_exceedances(
                data,
                &active,
                baseline,
                template,
                generator,
                policy.clone(),
                executor,
                (step as u64) * u64::from(self.num_permutations),
            )?;

            let raw = Decimal::from(1 + exceedances) / denominator;
            let adjusted = raw.max(last_adjusted);
            pvalues.insert(index, adjusted);
            debug!(step, strategy = data[index].strategy.name(), p = %adjusted, "step-down step");

            if adjusted <= alpha {
                last_adjusted = adjusted;
                active.retain(|&i| i != index);
            } else {
                for &remaining in &active {
                    pvalues.entry(remaining).or_insert(adjusted);
                }
                break;
            }
        }
        info!(strategies = data.len(), "naive step-down complete");
        Ok(pvalues)
    }

    /// Count permutations whose active-set maximum statistic reaches
    /// `baseline`. One market shuffle per permutation is shared by every
    /// active strategy.
    #[allow(clippy::too_many_arguments)]
    fn max_statistic_exceedances(
        &self,
        data: &StrategyDataContainer,
        active: &[usize],
        baseline: Decimal,
        template: &BackTester,
        generator: &Arc<SyntheticMarketGenerator>,
        policy: Arc<dyn StatisticPolicy>,
        executor: &dyn Executor,
        seed_offset: u64,
    ) -> Result<u32> {
        let count = Arc::new(Mutex::new(0u32));
        let strategies: Vec<_> = active.iter().map(|&i| data[i].strategy.clone()).collect();

        let mut handles: Vec<TaskHandle> = Vec::with_capacity(self.num_permutations as usize);
        for index in 0..u64::from(self.num_permutations) {
            let seed = self.master_seed.wrapping_add(seed_offset).wrapping_add(index);
            let generator = generator.clone();
            let strategies = strategies.clone();
            let policy = policy.clone();
            let count = count.clone();
            let template = template.clone_empty();
            handles.push(executor.submit(Box::new(move || {
                let portfolio = generator.permuted_portfolio(seed)?;
                let mut max_statistic: Option<Decimal> = None;
                for strategy in &strategies {
                    let mut backtester = template.clone_empty();
                    backtester.add_strategy(strategy.clone_with_portfolio(portfolio.clone()));
                    backtester.backtest()?;
                    let statistic = policy.statistic_or_failure(&backtester);
                    max_statistic = Some(match max_statistic {
                        Some(current) => current.max(statistic),
                        None => statistic,
                    });
                }
                if max_statistic.map_or(false, |m| m >= baseline) {
                    *count.lock().map_err(lock_error)? += 1;
                }
                Ok(())
            })));
        }
        executor.wait_all(handles)?;
        let count = Arc::try_unwrap(count)
            .map_err(lock_error)?
            .into_inner()
            .map_err(lock_error)?;
        Ok(count)
    }
}

/// Improved step-down: one Monte-Carlo sweep over the full strategy set
/// computes every exceedance count, then the inclusion loop runs over the
/// cached counts. Identical adjusted p-values in the large-N limit, far
/// fewer backtests.
pub struct MastersRomanoWolfImproved {
    num_permutations: u32,
    master_seed: u64,
}

impl MastersRomanoWolfImproved {
    pub fn new(num_permutations: u32, master_seed: u64) -> Result<Self> {
        if num_permutations == 0 {
            return Err(TradingError::InvalidArgument(
                "number of permutations must be positive".to_string(),
            ));
        }
        Ok(Self {
            num_permutations,
            master_seed,
        })
    }

    pub fn run(
        &self,
        data: &StrategyDataContainer,
        template: &BackTester,
        generator: &Arc<SyntheticMarketGenerator>,
        policy: Arc<dyn StatisticPolicy>,
        executor: &dyn Executor,
        alpha: Decimal,
    ) -> Result<HashMap<usize, Decimal>> {
        if data.is_empty() {
            return Err(TradingError::PermutationFailure(
                "no strategies to test".to_string(),
            ));
        }

        // Phase 1: bulk exceedance counts, seeded 1 for the "+1" term.
        let counts: Arc<DashMap<usize, u32>> = Arc::new(DashMap::new());
        for index in 0..data.len() {
            counts.insert(index, 1);
        }
        let baselines: Vec<Decimal> = data.iter().map(|c| c.baseline_stat).collect();
        let strategies: Vec<_> = data.iter().map(|c| c.strategy.clone()).collect();

        let mut handles: Vec<TaskHandle> = Vec::with_capacity(self.num_permutations as usize);
        for index in 0..u64::from(self.num_permutations) {
            let seed = self.master_seed.wrapping_add(index);
            let generator = generator.clone();
            let strategies = strategies.clone();
            let baselines = baselines.clone();
            let policy = policy.clone();
            let counts = counts.clone();
            let template = template.clone_empty();
            handles.push(executor.submit(Box::new(move || {
                let portfolio = generator.permuted_portfolio(seed)?;
                let mut max_statistic: Option<Decimal> = None;
                for strategy in &strategies {
                    let mut backtester = template.clone_empty();
                    backtester.add_strategy(strategy.clone_with_portfolio(portfolio.clone()));
                    backtester.backtest()?;
                    let statistic = policy.statistic_or_failure(&backtester);
                    max_statistic = Some(match max_statistic {
                        Some(current) => current.max(statistic),
                        None => statistic,
                    });
                }
                if let Some(max) = max_statistic {
                    for (strategy_index, &baseline) in baselines.iter().enumerate() {
                        if max >= baseline {
                            *counts.entry(strategy_index).or_insert(1) += 1;
                        }
                    }
                }
                Ok(())
            })));
        }
        executor.wait_all(handles)?;

        // Phase 2: the step-down loop over the cached counts.
        let ordered: Vec<(usize, Decimal, u32)> = descending_order(data)
            .into_iter()
            .map(|index| {
                let count = counts.get(&index).map(|c| *c).unwrap_or(self.num_permutations + 1);
                (index, data[index].baseline_stat, count)
            })
            .collect();
        info!(strategies = data.len(), "bulk sweep complete");
        Ok(step_down_adjusted_pvalues(
            &ordered,
            self.num_permutations,
            alpha,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn step_down_matches_hand_computed_example() {
        // Two strategies, baselines 3.0 and 2.5. The permutation max beat
        // 3.0 in 10 of 100 permutations and 2.5 in 30 of 100.
        let ordered = vec![(0usize, dec!(3.0), 11u32), (1usize, dec!(2.5), 31u32)];
        let pvalues = step_down_adjusted_pvalues(&ordered, 100, dec!(0.5));

        let p1 = dec!(11) / dec!(101);
        let p2 = (dec!(31) / dec!(101)).max(p1);
        assert_eq!(pvalues[&0], p1);
        assert_eq!(pvalues[&1], p2);
        assert!(pvalues[&0] <= pvalues[&1]);
    }

    #[test]
    fn first_failure_propagates_to_the_rest() {
        let ordered = vec![
            (0usize, dec!(3.0), 11u32),
            (1usize, dec!(2.5), 31u32),
            (2usize, dec!(2.0), 60u32),
        ];
        // alpha 0.05: the first step already fails at 11/101.
        let pvalues = step_down_adjusted_pvalues(&ordered, 100, dec!(0.05));
        let p1 = dec!(11) / dec!(101);
        assert_eq!(pvalues[&0], p1);
        assert_eq!(pvalues[&1], p1);
        assert_eq!(pvalues[&2], p1);
    }

    #[test]
    fn adjusted_pvalues_are_monotone_and_bounded() {
        let ordered = vec![
            (0usize, dec!(4.0), 1u32),
            (1usize, dec!(3.0), 5u32),
            (2usize, dec!(2.0), 4u32),
            (3usize, dec!(1.0), 90u32),
        ];
        let pvalues = step_down_adjusted_pvalues(&ordered, 100, dec!(1));
        let mut previous = Decimal::ZERO;
        for (index, _, _) in &ordered {
            let p = pvalues[index];
            assert!(p >= previous, "p-values must not decrease");
            assert!(p >= dec!(0) && p <= dec!(1));
            previous = p;
        }
        // count 4 after count 5 is lifted to the running maximum
        assert_eq!(pvalues[&2], dec!(5) / dec!(101));
    }

    #[test]
    fn every_strategy_appears_exactly_once() {
        let ordered = vec![
            (7usize, dec!(3.0), 2u32),
            (3usize, dec!(2.0), 8u32),
            (5usize, dec!(1.0), 50u32),
        ];
        let pvalues = step_down_adjusted_pvalues(&ordered, 100, dec!(0.02));
        assert_eq!(pvalues.len(), 3);
        for (index, _, _) in &ordered {
            assert!(pvalues.contains_key(index));
        }
    }

    #[test]
    fn rejects_zero_permutations() {
        assert!(MastersRomanoWolf::new(0, 1).is_err());
        assert!(MastersRomanoWolfImproved::new(0, 1).is_err());
    }
}
