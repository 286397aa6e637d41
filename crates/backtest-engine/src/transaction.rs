use std::collections::HashMap;

use trading_core::{Result, TradingError};

use crate::order::{OrderId, TradingOrder};
use crate::position::{PositionId, TradingPosition};

/// Links one entry order to the position it opened and, once complete, to
/// the exit order that closed it. Orders and positions stay owned by their
/// managers; the transaction carries ids only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyTransaction {
    entry_order_id: OrderId,
    position_id: PositionId,
    exit_order_id: Option<OrderId>,
}

impl StrategyTransaction {
    /// The entry order and position must agree on symbol and direction.
    pub fn new(entry_order: &TradingOrder, position: &TradingPosition) -> Result<Self> {
        if entry_order.symbol() != position.symbol() {
            return Err(TradingError::InvalidArgument(format!(
                "transaction symbols disagree: order {} vs position {}",
                entry_order.symbol(),
                position.symbol()
            )));
        }
        if entry_order.is_long_order() != position.is_long() {
            return Err(TradingError::InvalidArgument(
                "transaction order and position direction disagree".to_string(),
            ));
        }
        Ok(Self {
            entry_order_id: entry_order.id(),
            position_id: position.id(),
            exit_order_id: None,
        })
    }

    pub fn entry_order_id(&self) -> OrderId {
        self.entry_order_id
    }

    pub fn position_id(&self) -> PositionId {
        self.position_id
    }

    pub fn is_open(&self) -> bool {
        self.exit_order_id.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.exit_order_id.is_some()
    }

    /// The exit order id; fails while the transaction is open.
    pub fn exit_order_id(&self) -> Result<OrderId> {
        self.exit_order_id.ok_or_else(|| {
            TradingError::PositionStateViolation(format!(
                "transaction for position {} has no exit order yet",
                self.position_id
            ))
        })
    }

    /// Terminal transition, allowed exactly once.
    pub fn complete(&mut self, exit_order_id: OrderId) -> Result<()> {
        if self.is_complete() {
            return Err(TradingError::PositionStateViolation(format!(
                "transaction for position {} is already complete",
                self.position_id
            )));
        }
        self.exit_order_id = Some(exit_order_id);
        Ok(())
    }
}

/// Transactions keyed by position id.
#[derive(Debug, Clone, Default)]
pub struct StrategyTransactionManager {
    transactions: HashMap<PositionId, StrategyTransaction>,
    completed: usize,
}

impl StrategyTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transaction(&mut self, transaction: StrategyTransaction) -> Result<()> {
        if self.transactions.contains_key(&transaction.position_id()) {
            return Err(TradingError::InvalidArgument(format!(
                "transaction for position {} already exists",
                transaction.position_id()
            )));
        }
        self.transactions
            .insert(transaction.position_id(), transaction);
        Ok(())
    }

    pub fn transaction(&self, position_id: PositionId) -> Result<&StrategyTransaction> {
        self.transactions
            .get(&position_id)
            .ok_or_else(|| TradingError::NotFound(format!("transaction for position {position_id}")))
    }

    pub fn complete_transaction(
        &mut self,
        position_id: PositionId,
        exit_order_id: OrderId,
    ) -> Result<()> {
        let transaction = self
            .transactions
            .get_mut(&position_id)
            .ok_or_else(|| TradingError::NotFound(format!("transaction for position {position_id}")))?;
        transaction.complete(exit_order_id)?;
        self.completed += 1;
        Ok(())
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn num_completed(&self) -> usize {
        self.completed
    }

    pub fn num_open(&self) -> usize {
        self.transactions.len() - self.completed
    }
}
