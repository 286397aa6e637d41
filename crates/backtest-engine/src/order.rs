use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trading_core::{Result, TradingError, TradingVolume};

pub type OrderId = u64;

/// Processing priority classes. Lower runs first inside one processing
/// cycle, so market entries fill before stops, and stops before targets.
pub const MARKET_ORDER_PRIORITY: u8 = 1;
pub const STOP_ORDER_PRIORITY: u8 = 5;
pub const LIMIT_ORDER_PRIORITY: u8 = 10;

/// The five supported order kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    MarketOnOpen,
    SellAtLimit,
    CoverAtLimit,
    SellAtStop,
    CoverAtStop,
}

/// Lifecycle state; the only transitions are Pending→Executed and
/// Pending→Canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Executed {
        fill_ts: NaiveDateTime,
        fill_price: Decimal,
    },
    Canceled,
}

/// A single trading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingOrder {
    id: OrderId,
    symbol: String,
    volume: TradingVolume,
    order_ts: NaiveDateTime,
    kind: OrderKind,
    is_long: bool,
    is_entry: bool,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    priority: u8,
    state: OrderState,
}

impl TradingOrder {
    fn new(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
        kind: OrderKind,
        is_long: bool,
        is_entry: bool,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
        priority: u8,
    ) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            volume,
            order_ts,
            kind,
            is_long,
            is_entry,
            limit_price,
            stop_price,
            priority,
            state: OrderState::Pending,
        }
    }

    /// Buy at the next open, establishing a long position.
    pub fn market_entry_long(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::MarketOnOpen,
            true,
            true,
            None,
            None,
            MARKET_ORDER_PRIORITY,
        )
    }

    /// Sell short at the next open, establishing a short position.
    pub fn market_entry_short(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::MarketOnOpen,
            false,
            true,
            None,
            None,
            MARKET_ORDER_PRIORITY,
        )
    }

    /// Sell a long position at the next open.
    pub fn market_exit_long(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::MarketOnOpen,
            true,
            false,
            None,
            None,
            MARKET_ORDER_PRIORITY,
        )
    }

    /// Cover a short position at the next open.
    pub fn market_exit_short(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::MarketOnOpen,
            false,
            false,
            None,
            None,
            MARKET_ORDER_PRIORITY,
        )
    }

    /// Long profit target: sell if the next bar trades at or above `limit`.
    pub fn sell_at_limit(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
        limit: Decimal,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::SellAtLimit,
            true,
            false,
            Some(limit),
            None,
            LIMIT_ORDER_PRIORITY,
        )
    }

    /// Short profit target: cover if the next bar trades at or below `limit`.
    pub fn cover_at_limit(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
        limit: Decimal,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::CoverAtLimit,
            false,
            false,
            Some(limit),
            None,
            LIMIT_ORDER_PRIORITY,
        )
    }

    /// Long stop: sell if the next bar trades at or below `stop`.
    pub fn sell_at_stop(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
        stop: Decimal,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::SellAtStop,
            true,
            false,
            None,
            Some(stop),
            STOP_ORDER_PRIORITY,
        )
    }

    /// Short stop: cover if the next bar trades at or above `stop`.
    pub fn cover_at_stop(
        id: OrderId,
        symbol: &str,
        volume: TradingVolume,
        order_ts: NaiveDateTime,
        stop: Decimal,
    ) -> Self {
        Self::new(
            id,
            symbol,
            volume,
            order_ts,
            OrderKind::CoverAtStop,
            false,
            false,
            None,
            Some(stop),
            STOP_ORDER_PRIORITY,
        )
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn volume(&self) -> TradingVolume {
        self.volume
    }

    pub fn order_ts(&self) -> NaiveDateTime {
        self.order_ts
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn is_long_order(&self) -> bool {
        self.is_long
    }

    pub fn is_short_order(&self) -> bool {
        !self.is_long
    }

    pub fn is_entry_order(&self) -> bool {
        self.is_entry
    }

    pub fn is_exit_order(&self) -> bool {
        !self.is_entry
    }

    pub fn is_market_order(&self) -> bool {
        self.kind == OrderKind::MarketOnOpen
    }

    pub fn is_limit_order(&self) -> bool {
        matches!(self.kind, OrderKind::SellAtLimit | OrderKind::CoverAtLimit)
    }

    pub fn is_stop_order(&self) -> bool {
        matches!(self.kind, OrderKind::SellAtStop | OrderKind::CoverAtStop)
    }

    pub fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == OrderState::Pending
    }

    pub fn is_executed(&self) -> bool {
        matches!(self.state, OrderState::Executed { .. })
    }

    pub fn is_canceled(&self) -> bool {
        self.state == OrderState::Canceled
    }

    pub fn fill_price(&self) -> Result<Decimal> {
        match self.state {
            OrderState::Executed { fill_price, .. } => Ok(fill_price),
            _ => Err(TradingError::OrderNotExecutable(format!(
                "order {} has no fill price in state {:?}",
                self.id, self.state
            ))),
        }
    }

    pub fn fill_ts(&self) -> Result<NaiveDateTime> {
        match self.state {
            OrderState::Executed { fill_ts, .. } => Ok(fill_ts),
            _ => Err(TradingError::OrderNotExecutable(format!(
                "order {} has no fill timestamp in state {:?}",
                self.id, self.state
            ))),
        }
    }

    /// Transition Pending→Executed, enforcing kind-specific price validity.
    pub fn mark_executed(&mut self, fill_ts: NaiveDateTime, fill_price: Decimal) -> Result<()> {
        match self.state {
            OrderState::Pending => {}
            OrderState::Executed { .. } => {
                return Err(TradingError::OrderNotExecutable(format!(
                    "order {} already executed",
                    self.id
                )))
            }
            OrderState::Canceled => {
                return Err(TradingError::OrderNotExecutable(format!(
                    "order {} already canceled",
                    self.id
                )))
            }
        }
        if fill_ts < self.order_ts {
            return Err(TradingError::OrderNotExecutable(format!(
                "order {}: fill at {fill_ts} precedes order time {}",
                self.id, self.order_ts
            )));
        }
        self.validate_fill_price(fill_price)?;
        self.state = OrderState::Executed {
            fill_ts,
            fill_price,
        };
        Ok(())
    }

    fn validate_fill_price(&self, fill_price: Decimal) -> Result<()> {
        let valid = match self.kind {
            OrderKind::MarketOnOpen => true,
            OrderKind::SellAtLimit => fill_price >= self.limit_price.unwrap_or(fill_price),
            OrderKind::CoverAtLimit => fill_price <= self.limit_price.unwrap_or(fill_price),
            OrderKind::SellAtStop => fill_price <= self.stop_price.unwrap_or(fill_price),
            OrderKind::CoverAtStop => fill_price >= self.stop_price.unwrap_or(fill_price),
        };
        if valid {
            Ok(())
        } else {
            Err(TradingError::OrderNotExecutable(format!(
                "order {}: fill {fill_price} violates {:?} price rule",
                self.id, self.kind
            )))
        }
    }

    /// Transition Pending→Canceled.
    pub fn mark_canceled(&mut self) -> Result<()> {
        match self.state {
            OrderState::Pending => {
                self.state = OrderState::Canceled;
                Ok(())
            }
            OrderState::Executed { .. } => Err(TradingError::OrderNotExecutable(format!(
                "order {} cannot cancel after execution",
                self.id
            ))),
            OrderState::Canceled => Err(TradingError::OrderNotExecutable(format!(
                "order {} already canceled",
                self.id
            ))),
        }
    }
}
