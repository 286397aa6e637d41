use chrono::NaiveDateTime;
use market_data::OhlcEntry;
use pattern_catalog::TradeDirection;
use rust_decimal::Decimal;
use trading_core::{Result, TradingError, TradingVolume};

use crate::position::TradingPosition;

/// Aggregate position of one instrument: a tagged sum over Flat, Long and
/// Short, where the directional states carry the ordered open units.
///
/// Units are addressed 1-based. Any operation incompatible with the current
/// state raises `PositionStateViolation`.
#[derive(Debug, Clone)]
pub struct InstrumentPosition {
    symbol: String,
    state: PositionState,
}

#[derive(Debug, Clone)]
enum PositionState {
    Flat,
    Long(Vec<TradingPosition>),
    Short(Vec<TradingPosition>),
}

impl InstrumentPosition {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            state: PositionState::Flat,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, PositionState::Flat)
    }

    pub fn is_long(&self) -> bool {
        matches!(self.state, PositionState::Long(_))
    }

    pub fn is_short(&self) -> bool {
        matches!(self.state, PositionState::Short(_))
    }

    pub fn direction(&self) -> Option<TradeDirection> {
        match self.state {
            PositionState::Flat => None,
            PositionState::Long(_) => Some(TradeDirection::Long),
            PositionState::Short(_) => Some(TradeDirection::Short),
        }
    }

    pub fn num_units(&self) -> u32 {
        match &self.state {
            PositionState::Flat => 0,
            PositionState::Long(units) | PositionState::Short(units) => units.len() as u32,
        }
    }

    fn units_ref(&self) -> Result<&Vec<TradingPosition>> {
        match &self.state {
            PositionState::Flat => Err(TradingError::PositionStateViolation(format!(
                "{}: no units in a flat position",
                self.symbol
            ))),
            PositionState::Long(units) | PositionState::Short(units) => Ok(units),
        }
    }

    fn units_mut(&mut self) -> Result<&mut Vec<TradingPosition>> {
        match &mut self.state {
            PositionState::Flat => Err(TradingError::PositionStateViolation(format!(
                "{}: no units in a flat position",
                self.symbol
            ))),
            PositionState::Long(units) | PositionState::Short(units) => Ok(units),
        }
    }

    /// The open units in entry order. Fails on a flat position.
    pub fn units(&self) -> Result<&[TradingPosition]> {
        self.units_ref().map(|u| u.as_slice())
    }

    /// 1-based unit access.
    pub fn unit(&self, unit_number: u32) -> Result<&TradingPosition> {
        let units = self.units_ref()?;
        if unit_number == 0 || unit_number > units.len() as u32 {
            return Err(TradingError::PositionStateViolation(format!(
                "{}: unit {unit_number} out of range (1..={})",
                self.symbol,
                units.len()
            )));
        }
        Ok(&units[(unit_number - 1) as usize])
    }

    /// Entry price of the requested unit.
    pub fn fill_price(&self, unit_number: u32) -> Result<Decimal> {
        Ok(self.unit(unit_number)?.entry_price())
    }

    /// Add a unit. From Flat the instrument takes the unit's direction;
    /// in a directional state the unit must match side and symbol, and must
    /// still be open.
    pub fn add_unit(&mut self, position: TradingPosition) -> Result<()> {
        if position.symbol() != self.symbol {
            return Err(TradingError::PositionStateViolation(format!(
                "cannot add {} unit to {} position",
                position.symbol(),
                self.symbol
            )));
        }
        if position.is_closed() {
            return Err(TradingError::PositionStateViolation(format!(
                "{}: cannot add an already-closed unit",
                self.symbol
            )));
        }
        if self.is_flat() {
            self.state = match position.direction() {
                TradeDirection::Long => PositionState::Long(vec![position]),
                TradeDirection::Short => PositionState::Short(vec![position]),
            };
            return Ok(());
        }
        match (&mut self.state, position.direction()) {
            (PositionState::Long(units), TradeDirection::Long)
            | (PositionState::Short(units), TradeDirection::Short) => {
                units.push(position);
                Ok(())
            }
            (PositionState::Long(_), TradeDirection::Short) => {
                Err(TradingError::PositionStateViolation(format!(
                    "{}: cannot add a short unit to a long position",
                    self.symbol
                )))
            }
            (PositionState::Short(_), TradeDirection::Long) => {
                Err(TradingError::PositionStateViolation(format!(
                    "{}: cannot add a long unit to a short position",
                    self.symbol
                )))
            }
            (PositionState::Flat, _) => unreachable!("flat handled above"),
        }
    }

    /// Observe a bar in every open unit. Fails on a flat position.
    pub fn add_bar(&mut self, bar: &OhlcEntry) -> Result<()> {
        for unit in self.units_mut()? {
            unit.add_bar(bar.clone())?;
        }
        Ok(())
    }

    /// Close one unit (1-based); the unit leaves the aggregate and the
    /// state returns to Flat when it was the last one.
    pub fn close_unit(
        &mut self,
        unit_number: u32,
        exit_ts: NaiveDateTime,
        exit_price: Decimal,
    ) -> Result<TradingPosition> {
        let symbol = self.symbol.clone();
        let units = self.units_mut()?;
        if unit_number == 0 || unit_number > units.len() as u32 {
            return Err(TradingError::PositionStateViolation(format!(
                "{}: unit {unit_number} out of range (1..={})",
                symbol,
                units.len()
            )));
        }
        // Validate before mutating so a bad exit leaves the aggregate
        // untouched.
        let slot = (unit_number - 1) as usize;
        if exit_ts < units[slot].entry_ts() {
            return Err(TradingError::InvalidArgument(format!(
                "{}: exit {exit_ts} precedes unit {unit_number} entry",
                symbol
            )));
        }
        let mut unit = units.remove(slot);
        unit.close(exit_ts, exit_price)?;
        if units.is_empty() {
            self.state = PositionState::Flat;
        }
        Ok(unit)
    }

    /// Close every unit at one price; the state returns to Flat.
    pub fn close_all(
        &mut self,
        exit_ts: NaiveDateTime,
        exit_price: Decimal,
    ) -> Result<Vec<TradingPosition>> {
        let symbol = self.symbol.clone();
        let units = self.units_mut()?;
        // Validate before mutating so a bad exit leaves the aggregate
        // untouched.
        if let Some(unit) = units.iter().find(|u| exit_ts < u.entry_ts()) {
            return Err(TradingError::InvalidArgument(format!(
                "{}: exit {exit_ts} precedes unit {} entry",
                symbol,
                unit.id()
            )));
        }
        let mut closed = std::mem::take(units);
        for unit in &mut closed {
            unit.close(exit_ts, exit_price)?;
        }
        self.state = PositionState::Flat;
        Ok(closed)
    }

    /// Total volume across units. The first unit's unit kind is kept; mixed
    /// kinds are summed without validation.
    pub fn volume_in_all_units(&self) -> Result<TradingVolume> {
        let units = self.units_ref()?;
        let first_kind = units[0].volume().unit_kind();
        let total: u64 = units.iter().map(|u| u.volume().units()).sum();
        Ok(TradingVolume::new(total, first_kind))
    }
}
