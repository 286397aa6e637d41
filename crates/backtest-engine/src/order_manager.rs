use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use market_data::{OhlcEntry, Portfolio};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use trading_core::{Result, TradingError};

use crate::order::{OrderId, OrderKind, TradingOrder};

/// Receives synchronous notifications from the order manager during a
/// processing cycle.
///
/// `order_executed` may return follow-up orders (a freshly-filled entry
/// typically answers with its stop and profit-target); the manager enqueues
/// them and they get their chance against the same processing bar.
pub trait OrderObserver {
    fn order_executed(&mut self, order: &TradingOrder) -> Result<Vec<TradingOrder>>;
    fn order_canceled(&mut self, order: &TradingOrder) -> Result<()>;
    fn is_symbol_flat(&self, symbol: &str) -> bool;
}

/// Holds pending orders keyed by (priority, id) and advances them against
/// the bar at each processing timestamp.
#[derive(Debug)]
pub struct TradingOrderManager {
    portfolio: Arc<Portfolio>,
    pending: BTreeMap<(u8, OrderId), TradingOrder>,
    executed: Vec<TradingOrder>,
    canceled: Vec<TradingOrder>,
}

impl TradingOrderManager {
    pub fn new(portfolio: Arc<Portfolio>) -> Self {
        Self {
            portfolio,
            pending: BTreeMap::new(),
            executed: Vec::new(),
            canceled: Vec::new(),
        }
    }

    /// Submit a pending order. Non-pending orders and unknown symbols are
    /// rejected.
    pub fn add_order(&mut self, order: TradingOrder) -> Result<()> {
        if !order.is_pending() {
            return Err(TradingError::OrderNotExecutable(format!(
                "order {} is not pending and cannot be submitted",
                order.id()
            )));
        }
        self.portfolio.security(order.symbol())?;
        debug!(id = order.id(), symbol = order.symbol(), kind = ?order.kind(), "order submitted");
        self.pending.insert((order.priority(), order.id()), order);
        Ok(())
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn num_market_entry_orders(&self) -> usize {
        self.pending
            .values()
            .filter(|o| o.is_market_order() && o.is_entry_order())
            .count()
    }

    pub fn num_market_exit_orders(&self) -> usize {
        self.pending
            .values()
            .filter(|o| o.is_market_order() && o.is_exit_order())
            .count()
    }

    pub fn num_limit_exit_orders(&self) -> usize {
        self.pending
            .values()
            .filter(|o| o.is_limit_order() && o.is_exit_order())
            .count()
    }

    pub fn num_stop_exit_orders(&self) -> usize {
        self.pending
            .values()
            .filter(|o| o.is_stop_order() && o.is_exit_order())
            .count()
    }

    /// Pending orders in processing order (priority, then submission).
    pub fn pending_orders(&self) -> impl Iterator<Item = &TradingOrder> {
        self.pending.values()
    }

    pub fn executed_orders(&self) -> &[TradingOrder] {
        &self.executed
    }

    pub fn canceled_orders(&self) -> &[TradingOrder] {
        &self.canceled
    }

    /// Fill price for `order` against `bar`, or `None` when the bar does
    /// not satisfy the order's trigger.
    fn fill_price(order: &TradingOrder, bar: &OhlcEntry) -> Option<Decimal> {
        match order.kind() {
            OrderKind::MarketOnOpen => Some(bar.open()),
            OrderKind::SellAtLimit => {
                let limit = order.limit_price()?;
                (bar.high() >= limit).then(|| bar.open().max(limit))
            }
            OrderKind::CoverAtLimit => {
                let limit = order.limit_price()?;
                (bar.low() <= limit).then(|| bar.open().min(limit))
            }
            OrderKind::SellAtStop => {
                let stop = order.stop_price()?;
                (bar.low() <= stop).then(|| bar.open().min(stop))
            }
            OrderKind::CoverAtStop => {
                let stop = order.stop_price()?;
                (bar.high() >= stop).then(|| bar.open().max(stop))
            }
        }
    }

    /// One processing cycle against the bars at `processing_ts`.
    ///
    /// Orders submitted before `processing_ts` are examined in priority
    /// order; fills notify the observer, whose follow-up orders join the
    /// same cycle. After the scan, unfilled exit orders are canceled (they
    /// are one-shot; strategies re-emit them every bar), while market entry
    /// orders persist until their symbol trades.
    pub fn process_pending_orders(
        &mut self,
        processing_ts: NaiveDateTime,
        observer: &mut dyn OrderObserver,
    ) -> Result<()> {
        let mut visited: Vec<(u8, OrderId)> = Vec::new();

        loop {
            let next_key = self
                .pending
                .iter()
                .find(|(key, order)| {
                    !visited.contains(key) && order.order_ts() < processing_ts
                })
                .map(|(key, _)| *key);
            let Some(key) = next_key else { break };
            visited.push(key);

            let order = self.pending.get(&key).expect("key just found").clone();
            let security = self.portfolio.security(order.symbol())?;
            let Ok(bar) = security.series().entry(processing_ts) else {
                // No bar for this symbol at the processing timestamp; the
                // order keeps waiting.
                continue;
            };

            if let Some(price) = Self::fill_price(&order, bar) {
                let mut order = self.pending.remove(&key).expect("pending order");
                order.mark_executed(processing_ts, price)?;
                debug!(id = order.id(), price = %price, ts = %processing_ts, "order executed");
                let follow_ups = observer.order_executed(&order)?;
                self.executed.push(order);
                for follow_up in follow_ups {
                    self.add_order(follow_up)?;
                }
                self.cancel_exits_for_flat_symbols(observer)?;
            }
        }

        // One-shot exit semantics: anything left that is an exit and was
        // eligible this cycle is canceled.
        let stale: Vec<(u8, OrderId)> = self
            .pending
            .iter()
            .filter(|(_, o)| o.is_exit_order() && o.order_ts() < processing_ts)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            self.cancel_order(key, observer)?;
        }
        Ok(())
    }

    fn cancel_exits_for_flat_symbols(&mut self, observer: &mut dyn OrderObserver) -> Result<()> {
        let flat: Vec<(u8, OrderId)> = self
            .pending
            .iter()
            .filter(|(_, o)| o.is_exit_order() && observer.is_symbol_flat(o.symbol()))
            .map(|(k, _)| *k)
            .collect();
        for key in flat {
            self.cancel_order(key, observer)?;
        }
        Ok(())
    }

    fn cancel_order(&mut self, key: (u8, OrderId), observer: &mut dyn OrderObserver) -> Result<()> {
        if let Some(mut order) = self.pending.remove(&key) {
            order.mark_canceled()?;
            warn!(id = order.id(), symbol = order.symbol(), "order canceled");
            observer.order_canceled(&order)?;
            self.canceled.push(order);
        }
        Ok(())
    }
}
