use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TradingError};

/// Canonical intra-day time attached to EOD bars so that daily and intraday
/// data share one datetime-keyed driver. Matches the exchange close used by
/// the EOD feeds.
pub fn eod_bar_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 0, 0).expect("valid EOD bar time")
}

/// Attach the canonical EOD close time to a calendar date.
pub fn eod_timestamp(date: NaiveDate) -> NaiveDateTime {
    date.and_time(eod_bar_time())
}

/// Inclusive calendar-date range for daily/weekly/monthly backtests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(TradingError::InvalidArgument(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Inclusive datetime range for intraday backtests.
///
/// A bar whose timestamp equals `end` is processed; the effective
/// end-exclusive behavior some callers observe comes from entry emission
/// being suppressed on the final bar, not from the range itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateTimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(TradingError::InvalidArgument(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }
}
