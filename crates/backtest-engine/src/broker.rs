use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use market_data::Portfolio;
use pattern_catalog::TradeDirection;
use rust_decimal::Decimal;
use tracing::debug;
use trading_core::{ceil_to_tick, floor_to_tick, PercentNumber, Result, TradingError};

use crate::history::ClosedPositionHistory;
use crate::instrument_position::InstrumentPosition;
use crate::order::{OrderId, TradingOrder};
use crate::order_manager::{OrderObserver, TradingOrderManager};
use crate::position::TradingPosition;
use crate::transaction::{StrategyTransaction, StrategyTransactionManager};

/// Percent-based barrier specification attached to an entry order; the
/// broker turns it into tick-rounded limit/stop prices at fill time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitBarriers {
    pub profit_target: Option<PercentNumber>,
    pub stop_loss: Option<PercentNumber>,
}

/// Mutable trading state behind the order manager: instrument positions,
/// transactions, closed history and the barrier specs of in-flight entries.
#[derive(Debug)]
struct BrokerCore {
    portfolio: Arc<Portfolio>,
    positions: HashMap<String, InstrumentPosition>,
    transactions: StrategyTransactionManager,
    history: ClosedPositionHistory,
    entry_barriers: HashMap<OrderId, ExitBarriers>,
    next_order_id: OrderId,
    next_position_id: u64,
}

impl BrokerCore {
    fn next_order_id(&mut self) -> OrderId {
        self.next_order_id += 1;
        self.next_order_id
    }

    fn position_entry(&mut self, symbol: &str) -> &mut InstrumentPosition {
        self.positions
            .entry(symbol.to_string())
            .or_insert_with(|| InstrumentPosition::new(symbol))
    }

    fn is_flat(&self, symbol: &str) -> bool {
        self.positions
            .get(symbol)
            .map(|p| p.is_flat())
            .unwrap_or(true)
    }

    /// Tick-rounded barrier prices for a fill. Targets round away from the
    /// fill on the profitable side, stops away on the losing side, so a
    /// barrier is never reported hit by a price that would not satisfy it.
    fn barrier_prices(
        &self,
        symbol: &str,
        direction: TradeDirection,
        fill_price: Decimal,
        barriers: ExitBarriers,
    ) -> Result<(Option<Decimal>, Option<Decimal>)> {
        let tick = self.portfolio.security(symbol)?.tick_size();
        let target = match barriers.profit_target {
            Some(percent) => Some(match direction {
                TradeDirection::Long => {
                    ceil_to_tick(fill_price * (Decimal::ONE + percent.as_fraction()), tick)?
                }
                TradeDirection::Short => {
                    floor_to_tick(fill_price * (Decimal::ONE - percent.as_fraction()), tick)?
                }
            }),
            None => None,
        };
        let stop = match barriers.stop_loss {
            Some(percent) => Some(match direction {
                TradeDirection::Long => {
                    floor_to_tick(fill_price * (Decimal::ONE - percent.as_fraction()), tick)?
                }
                TradeDirection::Short => {
                    ceil_to_tick(fill_price * (Decimal::ONE + percent.as_fraction()), tick)?
                }
            }),
            None => None,
        };
        Ok((target, stop))
    }

    fn handle_entry_fill(&mut self, order: &TradingOrder) -> Result<Vec<TradingOrder>> {
        let fill_ts = order.fill_ts()?;
        let fill_price = order.fill_price()?;
        let direction = if order.is_long_order() {
            TradeDirection::Long
        } else {
            TradeDirection::Short
        };

        let entry_bar = self
            .portfolio
            .security(order.symbol())?
            .series()
            .entry(fill_ts)?
            .clone();

        self.next_position_id += 1;
        let mut position = TradingPosition::new(
            self.next_position_id,
            order.symbol(),
            direction,
            fill_price,
            entry_bar,
            order.volume(),
        )?;

        let barriers = self.entry_barriers.remove(&order.id()).unwrap_or_default();
        let (target, stop) = self.barrier_prices(order.symbol(), direction, fill_price, barriers)?;
        position.set_barriers(target, stop);

        // Check the aggregate can accept the unit before recording the
        // transaction, so a rejected fill leaves no dangling ledger entry.
        if let Some(existing) = self.positions.get(order.symbol()) {
            if !existing.is_flat() && existing.direction() != Some(direction) {
                return Err(TradingError::PositionStateViolation(format!(
                    "{}: entry fill opposes the open position",
                    order.symbol()
                )));
            }
        }

        let transaction = StrategyTransaction::new(order, &position)?;
        self.transactions.add_transaction(transaction)?;

        debug!(
            symbol = order.symbol(),
            position = position.id(),
            price = %fill_price,
            ?direction,
            "position opened"
        );
        self.position_entry(order.symbol()).add_unit(position)?;

        // Barrier exits get their shot against the entry bar itself; the
        // order timestamp predates the fill bar so they are eligible in the
        // current processing cycle.
        let volume = order.volume();
        let mut follow_ups = Vec::new();
        if let Some(stop_price) = stop {
            let id = self.next_order_id();
            follow_ups.push(match direction {
                TradeDirection::Long => TradingOrder::sell_at_stop(
                    id,
                    order.symbol(),
                    volume,
                    order.order_ts(),
                    stop_price,
                ),
                TradeDirection::Short => TradingOrder::cover_at_stop(
                    id,
                    order.symbol(),
                    volume,
                    order.order_ts(),
                    stop_price,
                ),
            });
        }
        if let Some(target_price) = target {
            let id = self.next_order_id();
            follow_ups.push(match direction {
                TradeDirection::Long => TradingOrder::sell_at_limit(
                    id,
                    order.symbol(),
                    volume,
                    order.order_ts(),
                    target_price,
                ),
                TradeDirection::Short => TradingOrder::cover_at_limit(
                    id,
                    order.symbol(),
                    volume,
                    order.order_ts(),
                    target_price,
                ),
            });
        }
        Ok(follow_ups)
    }

    fn handle_exit_fill(&mut self, order: &TradingOrder) -> Result<()> {
        let fill_ts = order.fill_ts()?;
        let fill_price = order.fill_price()?;
        let exit_bar = self
            .portfolio
            .security(order.symbol())?
            .series()
            .entry(fill_ts)?
            .clone();
        let position = self.positions.get_mut(order.symbol()).ok_or_else(|| {
            TradingError::PositionStateViolation(format!(
                "exit fill for {} with no instrument position",
                order.symbol()
            ))
        })?;
        // The exit bar is the last one the trade observes.
        position.add_bar(&exit_bar)?;
        let closed = position.close_all(fill_ts, fill_price)?;
        for unit in closed {
            debug!(
                symbol = order.symbol(),
                position = unit.id(),
                price = %fill_price,
                "position closed"
            );
            self.transactions.complete_transaction(unit.id(), order.id())?;
            self.history.add_closed_position(unit)?;
        }
        Ok(())
    }
}

impl OrderObserver for BrokerCore {
    fn order_executed(&mut self, order: &TradingOrder) -> Result<Vec<TradingOrder>> {
        if order.is_entry_order() {
            self.handle_entry_fill(order)
        } else {
            self.handle_exit_fill(order)?;
            Ok(Vec::new())
        }
    }

    fn order_canceled(&mut self, order: &TradingOrder) -> Result<()> {
        self.entry_barriers.remove(&order.id());
        Ok(())
    }

    fn is_symbol_flat(&self, symbol: &str) -> bool {
        self.is_flat(symbol)
    }
}

/// Per-strategy broker: owns the order book, instrument positions, the
/// transaction ledger and the closed-position history.
#[derive(Debug)]
pub struct StrategyBroker {
    order_manager: TradingOrderManager,
    core: BrokerCore,
}

impl StrategyBroker {
    pub fn new(portfolio: Arc<Portfolio>) -> Self {
        Self {
            order_manager: TradingOrderManager::new(portfolio.clone()),
            core: BrokerCore {
                portfolio,
                positions: HashMap::new(),
                transactions: StrategyTransactionManager::new(),
                history: ClosedPositionHistory::new(),
                entry_barriers: HashMap::new(),
                next_order_id: 0,
                next_position_id: 0,
            },
        }
    }

    pub fn portfolio(&self) -> &Arc<Portfolio> {
        &self.core.portfolio
    }

    /// Queue a market-on-open entry for the next bar, remembering the
    /// percent barriers to attach at fill time.
    pub fn submit_market_entry(
        &mut self,
        symbol: &str,
        direction: TradeDirection,
        volume: trading_core::TradingVolume,
        order_ts: NaiveDateTime,
        barriers: ExitBarriers,
    ) -> Result<OrderId> {
        let id = self.core.next_order_id();
        let order = match direction {
            TradeDirection::Long => TradingOrder::market_entry_long(id, symbol, volume, order_ts),
            TradeDirection::Short => TradingOrder::market_entry_short(id, symbol, volume, order_ts),
        };
        self.core.entry_barriers.insert(id, barriers);
        self.order_manager.add_order(order)?;
        Ok(id)
    }

    /// Re-emit the one-shot stop/target exits for an open position using
    /// the barrier prices fixed at entry. A flat symbol emits nothing.
    pub fn submit_barrier_exits(&mut self, symbol: &str, order_ts: NaiveDateTime) -> Result<()> {
        let Some(position) = self.core.positions.get(symbol) else {
            return Ok(());
        };
        if position.is_flat() {
            return Ok(());
        }
        let direction = position.direction().expect("non-flat position");
        let first_unit = position.unit(1)?;
        let stop = first_unit.stop_loss();
        let target = first_unit.profit_target();
        let volume = position.volume_in_all_units()?;

        if let Some(stop_price) = stop {
            let id = self.core.next_order_id();
            let order = match direction {
                TradeDirection::Long => {
                    TradingOrder::sell_at_stop(id, symbol, volume, order_ts, stop_price)
                }
                TradeDirection::Short => {
                    TradingOrder::cover_at_stop(id, symbol, volume, order_ts, stop_price)
                }
            };
            self.order_manager.add_order(order)?;
        }
        if let Some(target_price) = target {
            let id = self.core.next_order_id();
            let order = match direction {
                TradeDirection::Long => {
                    TradingOrder::sell_at_limit(id, symbol, volume, order_ts, target_price)
                }
                TradeDirection::Short => {
                    TradingOrder::cover_at_limit(id, symbol, volume, order_ts, target_price)
                }
            };
            self.order_manager.add_order(order)?;
        }
        Ok(())
    }

    /// Queue a market-on-open exit of every unit for the next bar.
    pub fn submit_market_exit(&mut self, symbol: &str, order_ts: NaiveDateTime) -> Result<()> {
        let Some(position) = self.core.positions.get(symbol) else {
            return Ok(());
        };
        if position.is_flat() {
            return Ok(());
        }
        let direction = position.direction().expect("non-flat position");
        let volume = position.volume_in_all_units()?;
        let id = self.core.next_order_id();
        let order = match direction {
            TradeDirection::Long => TradingOrder::market_exit_long(id, symbol, volume, order_ts),
            TradeDirection::Short => TradingOrder::market_exit_short(id, symbol, volume, order_ts),
        };
        self.order_manager.add_order(order)
    }

    /// Advance the order book against the bars at `ts`.
    pub fn process_pending_orders(&mut self, ts: NaiveDateTime) -> Result<()> {
        self.order_manager.process_pending_orders(ts, &mut self.core)
    }

    /// Append the bar at `ts` to every open position that has one.
    pub fn add_bar_to_open_positions(&mut self, ts: NaiveDateTime) -> Result<()> {
        for position in self.core.positions.values_mut() {
            if position.is_flat() {
                continue;
            }
            let security = self.core.portfolio.security(position.symbol())?;
            if let Ok(bar) = security.series().entry(ts) {
                position.add_bar(bar)?;
            }
        }
        Ok(())
    }

    pub fn is_flat(&self, symbol: &str) -> bool {
        self.core.is_flat(symbol)
    }

    pub fn instrument_position(&self, symbol: &str) -> Option<&InstrumentPosition> {
        self.core.positions.get(symbol)
    }

    pub fn history(&self) -> &ClosedPositionHistory {
        &self.core.history
    }

    pub fn transactions(&self) -> &StrategyTransactionManager {
        &self.core.transactions
    }

    pub fn order_manager(&self) -> &TradingOrderManager {
        &self.order_manager
    }

    /// Closed round-trip trades so far.
    pub fn num_trades(&self) -> usize {
        self.core.history.num_positions()
    }

    /// Units currently open across all symbols.
    pub fn num_open_positions(&self) -> usize {
        self.core
            .positions
            .values()
            .map(|p| p.num_units() as usize)
            .sum()
    }
}
