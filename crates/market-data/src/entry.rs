use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trading_core::{eod_timestamp, Result, TimeFrame, TradingError};

/// The four price fields of a bar, plus volume for offset lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// A single immutable OHLC bar.
///
/// Daily/weekly/monthly bars carry the canonical EOD close time in their
/// timestamp so that every series is datetime-keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcEntry {
    timestamp: NaiveDateTime,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    timeframe: TimeFrame,
}

impl OhlcEntry {
    pub fn new(
        timestamp: NaiveDateTime,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        timeframe: TimeFrame,
    ) -> Result<Self> {
        if high < low {
            return Err(TradingError::InvalidArgument(format!(
                "bar at {timestamp}: high {high} below low {low}"
            )));
        }
        if open < low || open > high {
            return Err(TradingError::InvalidArgument(format!(
                "bar at {timestamp}: open {open} outside [{low}, {high}]"
            )));
        }
        if close < low || close > high {
            return Err(TradingError::InvalidArgument(format!(
                "bar at {timestamp}: close {close} outside [{low}, {high}]"
            )));
        }
        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            timeframe,
        })
    }

    /// Build an end-of-day bar for a calendar date. Rejects the intraday
    /// timeframe, which needs a full datetime.
    pub fn new_eod(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        timeframe: TimeFrame,
    ) -> Result<Self> {
        if !timeframe.is_eod() {
            return Err(TradingError::InvalidArgument(
                "intraday bars require a datetime, not a date".to_string(),
            ));
        }
        Self::new(eod_timestamp(date), open, high, low, close, volume, timeframe)
    }

    /// Build an intraday bar.
    pub fn new_intraday(
        timestamp: NaiveDateTime,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self> {
        Self::new(timestamp, open, high, low, close, volume, TimeFrame::Intraday)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn open(&self) -> Decimal {
        self.open
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn close(&self) -> Decimal {
        self.close
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn field(&self, field: BarField) -> Decimal {
        match field {
            BarField::Open => self.open,
            BarField::High => self.high,
            BarField::Low => self.low,
            BarField::Close => self.close,
            BarField::Volume => self.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn eod_entry_carries_canonical_time() {
        let e = OhlcEntry::new_eod(
            date(2022, 1, 3),
            dec!(100.0),
            dec!(101.0),
            dec!(99.0),
            dec!(100.5),
            dec!(1000),
            TimeFrame::Daily,
        )
        .unwrap();
        assert_eq!(e.date(), date(2022, 1, 3));
        assert_eq!(e.timestamp(), trading_core::eod_timestamp(date(2022, 1, 3)));
        assert_eq!(e.field(BarField::Close), dec!(100.5));
    }

    #[test]
    fn rejects_price_outside_range() {
        // open above high
        assert!(OhlcEntry::new_eod(
            date(2022, 1, 3),
            dec!(102.0),
            dec!(101.0),
            dec!(99.0),
            dec!(100.5),
            dec!(0),
            TimeFrame::Daily,
        )
        .is_err());
        // close below low
        assert!(OhlcEntry::new_eod(
            date(2022, 1, 3),
            dec!(100.0),
            dec!(101.0),
            dec!(99.0),
            dec!(98.0),
            dec!(0),
            TimeFrame::Daily,
        )
        .is_err());
        // inverted high/low
        assert!(OhlcEntry::new_eod(
            date(2022, 1, 3),
            dec!(100.0),
            dec!(99.0),
            dec!(101.0),
            dec!(100.0),
            dec!(0),
            TimeFrame::Daily,
        )
        .is_err());
    }

    #[test]
    fn eod_constructor_rejects_intraday_timeframe() {
        let err = OhlcEntry::new_eod(
            date(2022, 1, 3),
            dec!(100.0),
            dec!(101.0),
            dec!(99.0),
            dec!(100.5),
            dec!(0),
            TimeFrame::Intraday,
        )
        .unwrap_err();
        assert!(matches!(err, TradingError::InvalidArgument(_)));
    }
}
