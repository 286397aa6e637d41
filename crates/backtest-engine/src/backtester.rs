use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{debug, info};
use trading_core::{DateRange, DateTimeRange, Result, TimeFrame, TradingError};

use crate::history::ClosedPositionHistory;
use crate::strategy::BacktestStrategy;

/// Date or datetime bounds of a backtest, matching the timeframe's time
/// domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestRange {
    Dates(DateRange),
    DateTimes(DateTimeRange),
}

impl BacktestRange {
    fn contains(&self, ts: NaiveDateTime) -> bool {
        match self {
            BacktestRange::Dates(range) => range.contains(ts.date()),
            BacktestRange::DateTimes(range) => range.contains(ts),
        }
    }
}

/// Time-ordered, data-driven backtest driver.
///
/// The driver iterates exactly the timestamps present in the union of the
/// strategies' portfolio series, filtered to the configured range. At each
/// timestamp it asks every strategy, per security with a bar, to emit exit
/// orders, process pending orders against the current bar, and emit entry
/// orders (suppressed on the final bar, which could never fill them).
pub struct BackTester {
    timeframe: TimeFrame,
    range: BacktestRange,
    strategies: Vec<Box<dyn BacktestStrategy>>,
}

impl std::fmt::Debug for BackTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackTester")
            .field("timeframe", &self.timeframe)
            .field("range", &self.range)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl BackTester {
    fn new(timeframe: TimeFrame, range: BacktestRange) -> Self {
        Self {
            timeframe,
            range,
            strategies: Vec::new(),
        }
    }

    pub fn daily(range: DateRange) -> Self {
        Self::new(TimeFrame::Daily, BacktestRange::Dates(range))
    }

    pub fn weekly(range: DateRange) -> Self {
        Self::new(TimeFrame::Weekly, BacktestRange::Dates(range))
    }

    pub fn monthly(range: DateRange) -> Self {
        Self::new(TimeFrame::Monthly, BacktestRange::Dates(range))
    }

    /// Intraday driver. The end bound is inclusive: a bar stamped exactly
    /// at the end datetime is still processed.
    pub fn intraday(range: DateTimeRange) -> Self {
        Self::new(TimeFrame::Intraday, BacktestRange::DateTimes(range))
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn range(&self) -> BacktestRange {
        self.range
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn BacktestStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn num_strategies(&self) -> usize {
        self.strategies.len()
    }

    pub fn strategies(&self) -> impl Iterator<Item = &Box<dyn BacktestStrategy>> {
        self.strategies.iter()
    }

    /// A fresh backtester with the same timeframe and range and no
    /// strategies; the template for per-permutation clones.
    pub fn clone_empty(&self) -> BackTester {
        BackTester::new(self.timeframe, self.range)
    }

    fn in_range_timestamps(&self) -> Vec<NaiveDateTime> {
        let mut timestamps = BTreeSet::new();
        for strategy in &self.strategies {
            for security in strategy.portfolio().iter() {
                for ts in security.series().timestamps() {
                    if self.range.contains(ts) {
                        timestamps.insert(ts);
                    }
                }
            }
        }
        timestamps.into_iter().collect()
    }

    /// Run the simulation over the configured range.
    pub fn backtest(&mut self) -> Result<()> {
        let timestamps = self.in_range_timestamps();
        let n = timestamps.len();
        info!(bars = n, strategies = self.strategies.len(), "backtest start");

        for (i, &ts) in timestamps.iter().enumerate() {
            for strategy in &mut self.strategies {
                let symbols: Vec<String> = strategy
                    .portfolio()
                    .iter()
                    .filter(|s| s.series().contains(ts))
                    .map(|s| s.symbol().to_string())
                    .collect();
                if symbols.is_empty() {
                    continue;
                }

                if i > 0 {
                    let prev_ts = timestamps[i - 1];
                    for symbol in &symbols {
                        strategy.event_exit_orders(symbol, prev_ts)?;
                    }
                    strategy.event_process_pending_orders(ts)?;
                }
                if i + 1 < n {
                    for symbol in &symbols {
                        strategy.event_entry_orders(symbol, ts)?;
                    }
                }
                strategy.event_add_bar_to_positions(ts)?;
            }
            debug!(ts = %ts, "bar processed");
        }
        Ok(())
    }

    /// Closed round-trip trades across all strategies.
    pub fn num_trades(&self) -> usize {
        self.strategies.iter().map(|s| s.broker().num_trades()).sum()
    }

    /// Units still open across all strategies.
    pub fn num_open_positions(&self) -> usize {
        self.strategies
            .iter()
            .map(|s| s.broker().num_open_positions())
            .sum()
    }

    /// All closed positions across strategies, merged into one history.
    pub fn combined_history(&self) -> ClosedPositionHistory {
        let mut combined = ClosedPositionHistory::new();
        for strategy in &self.strategies {
            for position in strategy.broker().history().positions() {
                combined
                    .add_closed_position(position.clone())
                    .expect("closed position");
            }
        }
        combined
    }

    pub fn profit_factor(&self) -> Decimal {
        self.combined_history().profit_factor()
    }

    pub fn cumulative_return(&self) -> Decimal {
        self.combined_history().cumulative_return()
    }
}

/// Builds the right backtester variant for a timeframe tag, rejecting
/// mismatched time domains.
pub struct BackTesterFactory;

impl BackTesterFactory {
    pub fn make(timeframe: TimeFrame, range: BacktestRange) -> Result<BackTester> {
        match (timeframe, range) {
            (TimeFrame::Daily, BacktestRange::Dates(r)) => Ok(BackTester::daily(r)),
            (TimeFrame::Weekly, BacktestRange::Dates(r)) => Ok(BackTester::weekly(r)),
            (TimeFrame::Monthly, BacktestRange::Dates(r)) => Ok(BackTester::monthly(r)),
            (TimeFrame::Intraday, BacktestRange::DateTimes(r)) => Ok(BackTester::intraday(r)),
            (TimeFrame::Intraday, BacktestRange::Dates(_)) => Err(TradingError::InvalidArgument(
                "intraday backtester requires a datetime range".to_string(),
            )),
            (_, BacktestRange::DateTimes(_)) => Err(TradingError::InvalidArgument(format!(
                "{timeframe} backtester requires a date range"
            ))),
        }
    }

    /// Tag-driven construction; unknown tags fail with
    /// `UnsupportedTimeframe`.
    pub fn from_tag(tag: &str, range: BacktestRange) -> Result<BackTester> {
        let timeframe: TimeFrame = tag.parse()?;
        Self::make(timeframe, range)
    }
}
