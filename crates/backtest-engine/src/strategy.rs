use std::sync::Arc;

use chrono::NaiveDateTime;
use market_data::{Portfolio, Security};
use pattern_catalog::PricePattern;
use tracing::debug;
use trading_core::{Result, TradingVolume};

use crate::broker::{ExitBarriers, StrategyBroker};

/// A strategy driven by the backtester's event hooks. Each strategy owns
/// its broker; the pattern (when there is one) is shared read-only.
pub trait BacktestStrategy: Send {
    fn name(&self) -> &str;

    fn portfolio(&self) -> &Arc<Portfolio>;

    fn broker(&self) -> &StrategyBroker;

    /// Emit one-shot exit orders for open positions, dated `order_ts` (the
    /// previous processing timestamp) so they are eligible this cycle.
    fn event_exit_orders(&mut self, symbol: &str, order_ts: NaiveDateTime) -> Result<()>;

    /// Advance the order book against the bars at `ts`.
    fn event_process_pending_orders(&mut self, ts: NaiveDateTime) -> Result<()>;

    /// Evaluate the signal on the bar at `ts` and possibly queue an entry
    /// for the next bar's open.
    fn event_entry_orders(&mut self, symbol: &str, ts: NaiveDateTime) -> Result<()>;

    /// Observe the bar at `ts` in every open position.
    fn event_add_bar_to_positions(&mut self, ts: NaiveDateTime) -> Result<()>;

    /// A fresh instance over a different portfolio (permutation runs).
    fn clone_with_portfolio(&self, portfolio: Arc<Portfolio>) -> Box<dyn BacktestStrategy>;

    /// A fresh instance over the same portfolio with clean broker state.
    fn clone_for_backtesting(&self) -> Box<dyn BacktestStrategy>;
}

/// Pattern-driven strategy: enters at the next open when flat and the
/// pattern holds; exits via the pattern's percent target/stop.
#[derive(Debug)]
pub struct PatternStrategy {
    name: String,
    pattern: Arc<PricePattern>,
    portfolio: Arc<Portfolio>,
    broker: StrategyBroker,
}

impl PatternStrategy {
    pub fn new(name: &str, pattern: Arc<PricePattern>, portfolio: Arc<Portfolio>) -> Self {
        Self {
            name: name.to_string(),
            pattern,
            portfolio: portfolio.clone(),
            broker: StrategyBroker::new(portfolio),
        }
    }

    pub fn pattern(&self) -> &Arc<PricePattern> {
        &self.pattern
    }

    /// One share for equities, one contract for futures.
    fn order_size(security: &Security) -> TradingVolume {
        if security.is_equity() {
            TradingVolume::shares(1)
        } else {
            TradingVolume::contracts(1)
        }
    }
}

impl BacktestStrategy for PatternStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn portfolio(&self) -> &Arc<Portfolio> {
        &self.portfolio
    }

    fn broker(&self) -> &StrategyBroker {
        &self.broker
    }

    fn event_exit_orders(&mut self, symbol: &str, order_ts: NaiveDateTime) -> Result<()> {
        self.broker.submit_barrier_exits(symbol, order_ts)
    }

    fn event_process_pending_orders(&mut self, ts: NaiveDateTime) -> Result<()> {
        self.broker.process_pending_orders(ts)
    }

    fn event_entry_orders(&mut self, symbol: &str, ts: NaiveDateTime) -> Result<()> {
        if !self.broker.is_flat(symbol) {
            return Ok(());
        }
        let security = self.portfolio.security(symbol)?.clone();
        if self.pattern.evaluate(security.series(), ts)? {
            debug!(strategy = self.name, symbol, ts = %ts, "pattern signal");
            self.broker.submit_market_entry(
                symbol,
                self.pattern.direction(),
                Self::order_size(&security),
                ts,
                ExitBarriers {
                    profit_target: self.pattern.profit_target(),
                    stop_loss: self.pattern.stop_loss(),
                },
            )?;
        }
        Ok(())
    }

    fn event_add_bar_to_positions(&mut self, ts: NaiveDateTime) -> Result<()> {
        self.broker.add_bar_to_open_positions(ts)
    }

    fn clone_with_portfolio(&self, portfolio: Arc<Portfolio>) -> Box<dyn BacktestStrategy> {
        Box::new(PatternStrategy::new(
            &self.name,
            self.pattern.clone(),
            portfolio,
        ))
    }

    fn clone_for_backtesting(&self) -> Box<dyn BacktestStrategy> {
        Box::new(PatternStrategy::new(
            &self.name,
            self.pattern.clone(),
            self.portfolio.clone(),
        ))
    }
}
