use std::sync::{Arc, Mutex};

use backtest_engine::{BackTester, BacktestStrategy, PatternStrategy};
use market_data::{Portfolio, Security};
use parallel_exec::{Executor, TaskHandle};
use pattern_catalog::PatternCatalog;
use tracing::info;
use trading_core::{Result, TradingError};

use crate::policy::StatisticPolicy;
use crate::types::{StrategyContext, StrategyDataContainer};

pub(crate) fn lock_error<T>(_: T) -> TradingError {
    TradingError::PermutationFailure("accumulator mutex poisoned".to_string())
}

/// Builds one pattern strategy per catalog entry and computes each
/// strategy's baseline statistic with a parallel backtest sweep.
pub struct StrategyDataPreparer;

impl StrategyDataPreparer {
    pub fn prepare(
        template: &BackTester,
        base_security: &Arc<Security>,
        catalog: &PatternCatalog,
        policy: Arc<dyn StatisticPolicy>,
        executor: &dyn Executor,
    ) -> Result<StrategyDataContainer> {
        if catalog.is_empty() {
            return Err(TradingError::InvalidArgument(
                "cannot prepare an empty pattern catalog".to_string(),
            ));
        }
        if base_security.series().is_empty() {
            return Err(TradingError::InvalidArgument(format!(
                "security {} has no price history",
                base_security.symbol()
            )));
        }

        let mut portfolio = Portfolio::new(&format!("{} Portfolio", base_security.symbol()));
        portfolio.add_security(base_security.clone())?;
        let portfolio = Arc::new(portfolio);

        let results: Arc<Mutex<Vec<(usize, StrategyContext)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(catalog.len())));

        let mut handles: Vec<TaskHandle> = Vec::with_capacity(catalog.len());
        for (index, pattern) in catalog.iter().enumerate() {
            let side = if pattern.is_long() { "Long" } else { "Short" };
            let name = format!("{side} {}", index + 1);
            let strategy = Arc::new(PatternStrategy::new(&name, pattern.clone(), portfolio.clone()));

            let mut backtester = template.clone_empty();
            let policy = policy.clone();
            let results = results.clone();
            handles.push(executor.submit(Box::new(move || {
                backtester.add_strategy(strategy.clone_for_backtesting());
                backtester.backtest()?;
                let baseline_stat = policy.statistic_or_failure(&backtester);
                let num_trades = backtester.num_trades();
                results.lock().map_err(lock_error)?.push((
                    index,
                    StrategyContext {
                        strategy,
                        baseline_stat,
                        num_trades,
                    },
                ));
                Ok(())
            })));
        }
        executor.wait_all(handles)?;

        let mut collected = Arc::try_unwrap(results)
            .map_err(lock_error)?
            .into_inner()
            .map_err(lock_error)?;
        collected.sort_by_key(|(index, _)| *index);
        info!(strategies = collected.len(), "baseline preparation complete");
        Ok(collected.into_iter().map(|(_, context)| context).collect())
    }
}
