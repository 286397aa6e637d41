use chrono::NaiveDateTime;
use market_data::OhlcEntry;
use pattern_catalog::TradeDirection;
use rust_decimal::Decimal;
use trading_core::{Result, TradingError, TradingVolume};

pub type PositionId = u64;

/// One entry-to-exit trade of a single instrument.
///
/// The entry bar is observed at creation; later bars arrive through
/// [`TradingPosition::add_bar`] in strictly increasing timestamp order.
/// Closing the position is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingPosition {
    id: PositionId,
    symbol: String,
    direction: TradeDirection,
    entry_price: Decimal,
    entry_ts: NaiveDateTime,
    volume: TradingVolume,
    bars: Vec<OhlcEntry>,
    profit_target: Option<Decimal>,
    stop_loss: Option<Decimal>,
    exit: Option<(NaiveDateTime, Decimal)>,
}

impl TradingPosition {
    pub fn new(
        id: PositionId,
        symbol: &str,
        direction: TradeDirection,
        entry_price: Decimal,
        entry_bar: OhlcEntry,
        volume: TradingVolume,
    ) -> Result<Self> {
        if entry_price <= Decimal::ZERO {
            return Err(TradingError::InvalidArgument(format!(
                "entry price {entry_price} must be positive"
            )));
        }
        Ok(Self {
            id,
            symbol: symbol.to_string(),
            direction,
            entry_price,
            entry_ts: entry_bar.timestamp(),
            volume,
            bars: vec![entry_bar],
            profit_target: None,
            stop_loss: None,
            exit: None,
        })
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn direction(&self) -> TradeDirection {
        self.direction
    }

    pub fn is_long(&self) -> bool {
        self.direction.is_long()
    }

    pub fn is_short(&self) -> bool {
        !self.is_long()
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn entry_ts(&self) -> NaiveDateTime {
        self.entry_ts
    }

    pub fn volume(&self) -> TradingVolume {
        self.volume
    }

    pub fn is_open(&self) -> bool {
        self.exit.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.exit.is_some()
    }

    /// Barrier prices derived from the pattern at entry time.
    pub fn set_barriers(&mut self, profit_target: Option<Decimal>, stop_loss: Option<Decimal>) {
        self.profit_target = profit_target;
        self.stop_loss = stop_loss;
    }

    pub fn profit_target(&self) -> Option<Decimal> {
        self.profit_target
    }

    pub fn stop_loss(&self) -> Option<Decimal> {
        self.stop_loss
    }

    /// Observe a bar while the position is open. Bars at or before the
    /// entry timestamp (or at or before the last observed bar) are ignored;
    /// bars on a closed position are a state violation.
    pub fn add_bar(&mut self, bar: OhlcEntry) -> Result<()> {
        if self.is_closed() {
            return Err(TradingError::PositionStateViolation(format!(
                "position {}: cannot add bars after close",
                self.id
            )));
        }
        let last_ts = self
            .bars
            .last()
            .map(|b| b.timestamp())
            .unwrap_or(self.entry_ts);
        if bar.timestamp() <= last_ts {
            return Ok(());
        }
        self.bars.push(bar);
        Ok(())
    }

    /// Bars observed while open, entry bar first.
    pub fn bars(&self) -> &[OhlcEntry] {
        &self.bars
    }

    pub fn num_bars_in_position(&self) -> usize {
        self.bars.len()
    }

    /// Mark-to-market on the most recent observed close.
    pub fn last_close(&self) -> Decimal {
        self.bars.last().expect("entry bar always present").close()
    }

    /// Terminal transition; the exit is set exactly once.
    pub fn close(&mut self, exit_ts: NaiveDateTime, exit_price: Decimal) -> Result<()> {
        if self.is_closed() {
            return Err(TradingError::PositionStateViolation(format!(
                "position {} is already closed",
                self.id
            )));
        }
        if exit_ts < self.entry_ts {
            return Err(TradingError::InvalidArgument(format!(
                "position {}: exit {exit_ts} precedes entry {}",
                self.id, self.entry_ts
            )));
        }
        self.exit = Some((exit_ts, exit_price));
        Ok(())
    }

    pub fn exit_price(&self) -> Result<Decimal> {
        self.exit
            .map(|(_, p)| p)
            .ok_or_else(|| TradingError::PositionStateViolation(format!(
                "position {} is still open",
                self.id
            )))
    }

    pub fn exit_ts(&self) -> Result<NaiveDateTime> {
        self.exit
            .map(|(ts, _)| ts)
            .ok_or_else(|| TradingError::PositionStateViolation(format!(
                "position {} is still open",
                self.id
            )))
    }

    /// Signed percent return of the closed trade.
    pub fn percent_return(&self) -> Result<Decimal> {
        let exit_price = self.exit_price()?;
        let raw = (exit_price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED;
        Ok(if self.is_long() { raw } else { -raw })
    }

    /// `1 + signed fractional return` of the closed trade.
    pub fn trade_return_multiplier(&self) -> Result<Decimal> {
        Ok(Decimal::ONE + self.percent_return()? / Decimal::ONE_HUNDRED)
    }

    pub fn is_winning_position(&self) -> Result<bool> {
        Ok(self.percent_return()? > Decimal::ZERO)
    }

    pub fn is_losing_position(&self) -> Result<bool> {
        Ok(self.percent_return()? < Decimal::ZERO)
    }

    /// Profit expressed in multiples of the initial risk, when a stop was
    /// attached at entry.
    pub fn r_multiple(&self) -> Result<Option<Decimal>> {
        let Some(stop) = self.stop_loss else {
            return Ok(None);
        };
        let risk = (self.entry_price - stop).abs();
        if risk.is_zero() {
            return Ok(None);
        }
        let exit_price = self.exit_price()?;
        let profit = if self.is_long() {
            exit_price - self.entry_price
        } else {
            self.entry_price - exit_price
        };
        Ok(Some(profit / risk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use trading_core::{eod_timestamp, TimeFrame};

    fn bar(day: u32, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> OhlcEntry {
        OhlcEntry::new_eod(
            NaiveDate::from_ymd_opt(2022, 1, day).unwrap(),
            o,
            h,
            l,
            c,
            dec!(0),
            TimeFrame::Daily,
        )
        .unwrap()
    }

    fn ts(day: u32) -> NaiveDateTime {
        eod_timestamp(NaiveDate::from_ymd_opt(2022, 1, day).unwrap())
    }

    fn long_position() -> TradingPosition {
        TradingPosition::new(
            1,
            "QQQ",
            TradeDirection::Long,
            dec!(100.5),
            bar(4, dec!(100.5), dec!(102.0), dec!(100.0), dec!(101.0)),
            TradingVolume::shares(100),
        )
        .unwrap()
    }

    #[test]
    fn entry_bar_is_observed_at_creation() {
        let p = long_position();
        assert!(p.is_open());
        assert_eq!(p.num_bars_in_position(), 1);
        assert_eq!(p.entry_ts(), ts(4));
        assert_eq!(p.last_close(), dec!(101.0));
    }

    #[test]
    fn bars_before_or_at_entry_are_ignored() {
        let mut p = long_position();
        p.add_bar(bar(3, dec!(100.0), dec!(101.0), dec!(99.0), dec!(100.5)))
            .unwrap();
        p.add_bar(bar(4, dec!(100.5), dec!(102.0), dec!(100.0), dec!(101.0)))
            .unwrap();
        assert_eq!(p.num_bars_in_position(), 1);

        p.add_bar(bar(5, dec!(101.0), dec!(103.0), dec!(100.5), dec!(102.0)))
            .unwrap();
        assert_eq!(p.num_bars_in_position(), 2);
    }

    #[test]
    fn bar_timestamps_strictly_increase() {
        let mut p = long_position();
        p.add_bar(bar(5, dec!(101.0), dec!(103.0), dec!(100.5), dec!(102.0)))
            .unwrap();
        p.add_bar(bar(6, dec!(102.0), dec!(104.0), dec!(101.0), dec!(103.0)))
            .unwrap();
        let timestamps: Vec<_> = p.bars().iter().map(|b| b.timestamp()).collect();
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        assert!(timestamps.iter().skip(1).all(|&t| t > p.entry_ts()));
    }

    #[test]
    fn close_is_terminal() {
        let mut p = long_position();
        p.close(ts(5), dec!(101.51)).unwrap();
        assert!(p.is_closed());
        assert!(matches!(
            p.close(ts(6), dec!(102)).unwrap_err(),
            TradingError::PositionStateViolation(_)
        ));
        assert!(matches!(
            p.add_bar(bar(6, dec!(102.0), dec!(104.0), dec!(101.0), dec!(103.0)))
                .unwrap_err(),
            TradingError::PositionStateViolation(_)
        ));
    }

    #[test]
    fn long_returns() {
        let mut p = long_position();
        p.close(ts(5), dec!(102.51)).unwrap();
        assert_eq!(p.percent_return().unwrap(), dec!(2));
        assert_eq!(p.trade_return_multiplier().unwrap(), dec!(1.02));
        assert!(p.is_winning_position().unwrap());
    }

    #[test]
    fn short_returns_are_sign_flipped() {
        let mut p = TradingPosition::new(
            2,
            "QQQ",
            TradeDirection::Short,
            dec!(100),
            bar(4, dec!(100.0), dec!(102.0), dec!(97.0), dec!(98.0)),
            TradingVolume::shares(100),
        )
        .unwrap();
        p.close(ts(5), dec!(98)).unwrap();
        assert_eq!(p.percent_return().unwrap(), dec!(2));
        assert!(p.is_winning_position().unwrap());
    }

    #[test]
    fn open_position_has_no_return() {
        let p = long_position();
        assert!(matches!(
            p.percent_return().unwrap_err(),
            TradingError::PositionStateViolation(_)
        ));
        assert!(p.exit_price().is_err());
        assert!(p.exit_ts().is_err());
    }

    #[test]
    fn r_multiple_uses_stop_distance() {
        let mut p = long_position();
        p.set_barriers(Some(dec!(102.51)), Some(dec!(99.50)));
        p.close(ts(5), dec!(102.50)).unwrap();
        // risk = 100.5 - 99.5 = 1.0; profit = 2.0
        assert_eq!(p.r_multiple().unwrap(), Some(dec!(2)));
    }

    #[test]
    fn r_multiple_absent_without_stop() {
        let mut p = long_position();
        p.close(ts(5), dec!(102.50)).unwrap();
        assert_eq!(p.r_multiple().unwrap(), None);
    }
}
