use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::debug;
use trading_core::{eod_timestamp, Result, TimeFrame, TradingError};

use crate::entry::{BarField, OhlcEntry};

/// An ordered OHLC series for a single timeframe.
///
/// Entries are kept sorted by timestamp; exact lookup is a binary search
/// (O(log n)) and historical offset access is O(1) from the found index.
#[derive(Debug, Clone)]
pub struct OhlcSeries {
    timeframe: TimeFrame,
    entries: Vec<OhlcEntry>,
}

impl OhlcSeries {
    pub fn new(timeframe: TimeFrame) -> Self {
        Self {
            timeframe,
            entries: Vec::new(),
        }
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a bar, keeping the series sorted. Fails on timeframe mismatch
    /// or an already-present timestamp.
    pub fn add_entry(&mut self, entry: OhlcEntry) -> Result<()> {
        if entry.timeframe() != self.timeframe {
            return Err(TradingError::InvalidArgument(format!(
                "cannot add {} bar to {} series",
                entry.timeframe(),
                self.timeframe
            )));
        }
        match self.index_of(entry.timestamp()) {
            Ok(_) => Err(TradingError::DuplicateTimestamp(
                entry.timestamp().to_string(),
            )),
            Err(pos) => {
                debug!(ts = %entry.timestamp(), "series insert");
                self.entries.insert(pos, entry);
                Ok(())
            }
        }
    }

    fn index_of(&self, ts: NaiveDateTime) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&ts, |e| e.timestamp())
    }

    /// Exact-timestamp lookup.
    pub fn entry(&self, ts: NaiveDateTime) -> Result<&OhlcEntry> {
        self.index_of(ts)
            .map(|i| &self.entries[i])
            .map_err(|_| TradingError::NotFound(ts.to_string()))
    }

    /// EOD convenience lookup by calendar date.
    pub fn entry_by_date(&self, date: NaiveDate) -> Result<&OhlcEntry> {
        self.entry(eod_timestamp(date))
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.index_of(ts).is_ok()
    }

    /// Bar `offset` positions away from `ts`: positive offsets look back to
    /// older bars, negative offsets forward to newer ones.
    pub fn entry_at_offset(&self, ts: NaiveDateTime, offset: i64) -> Result<&OhlcEntry> {
        let base = self
            .index_of(ts)
            .map_err(|_| TradingError::NotFound(ts.to_string()))?;
        let target = base as i64 - offset;
        if target < 0 || target >= self.entries.len() as i64 {
            return Err(TradingError::OffsetOutOfRange(format!(
                "offset {offset} from {ts} leaves the series"
            )));
        }
        Ok(&self.entries[target as usize])
    }

    /// A single price/volume field at an offset from `ts`.
    pub fn value_at_offset(&self, ts: NaiveDateTime, offset: i64, field: BarField) -> Result<Decimal> {
        Ok(self.entry_at_offset(ts, offset)?.field(field))
    }

    pub fn first(&self) -> Option<&OhlcEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&OhlcEntry> {
        self.entries.last()
    }

    /// Chronological iteration.
    pub fn iter(&self) -> std::slice::Iter<'_, OhlcEntry> {
        self.entries.iter()
    }

    /// All timestamps, in order.
    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.entries.iter().map(|e| e.timestamp())
    }
}

impl PartialEq for OhlcSeries {
    fn eq(&self, other: &Self) -> bool {
        self.timeframe == other.timeframe && self.entries == other.entries
    }
}

impl<'a> IntoIterator for &'a OhlcSeries {
    type Item = &'a OhlcEntry;
    type IntoIter = std::slice::Iter<'a, OhlcEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, day).unwrap()
    }

    fn daily_bar(day: u32, close: Decimal) -> OhlcEntry {
        OhlcEntry::new_eod(
            d(day),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            dec!(1000),
            TimeFrame::Daily,
        )
        .unwrap()
    }

    fn sample_series() -> OhlcSeries {
        let mut s = OhlcSeries::new(TimeFrame::Daily);
        for (day, close) in [(3, dec!(100)), (4, dec!(101)), (5, dec!(102)), (6, dec!(103))] {
            s.add_entry(daily_bar(day, close)).unwrap();
        }
        s
    }

    #[test]
    fn rejects_duplicate_timestamp() {
        let mut s = sample_series();
        let err = s.add_entry(daily_bar(4, dec!(50))).unwrap_err();
        assert!(matches!(err, TradingError::DuplicateTimestamp(_)));
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn rejects_timeframe_mismatch() {
        let mut s = OhlcSeries::new(TimeFrame::Weekly);
        let err = s.add_entry(daily_bar(3, dec!(100))).unwrap_err();
        assert!(matches!(err, TradingError::InvalidArgument(_)));
    }

    #[test]
    fn out_of_order_insert_keeps_sorted() {
        let mut s = OhlcSeries::new(TimeFrame::Daily);
        s.add_entry(daily_bar(5, dec!(102))).unwrap();
        s.add_entry(daily_bar(3, dec!(100))).unwrap();
        s.add_entry(daily_bar(4, dec!(101))).unwrap();
        let closes: Vec<Decimal> = s.iter().map(|e| e.close()).collect();
        assert_eq!(closes, vec![dec!(100), dec!(101), dec!(102)]);
    }

    #[test]
    fn exact_lookup_and_not_found() {
        let s = sample_series();
        assert_eq!(s.entry_by_date(d(4)).unwrap().close(), dec!(101));
        let err = s.entry_by_date(d(10)).unwrap_err();
        assert!(matches!(err, TradingError::NotFound(_)));
    }

    #[test]
    fn offset_lookup_directions() {
        let s = sample_series();
        let ts = eod_timestamp(d(5));
        // positive offset looks back
        assert_eq!(s.entry_at_offset(ts, 1).unwrap().close(), dec!(101));
        assert_eq!(s.entry_at_offset(ts, 2).unwrap().close(), dec!(100));
        // negative offset looks forward
        assert_eq!(s.entry_at_offset(ts, -1).unwrap().close(), dec!(103));
        // zero offset is the bar itself
        assert_eq!(s.entry_at_offset(ts, 0).unwrap().close(), dec!(102));
    }

    #[test]
    fn offset_out_of_range() {
        let s = sample_series();
        let first = eod_timestamp(d(3));
        let last = eod_timestamp(d(6));
        assert!(matches!(
            s.entry_at_offset(first, 1).unwrap_err(),
            TradingError::OffsetOutOfRange(_)
        ));
        assert!(matches!(
            s.entry_at_offset(last, -1).unwrap_err(),
            TradingError::OffsetOutOfRange(_)
        ));
    }

    #[test]
    fn offset_symmetry_round_trip() {
        let s = sample_series();
        for base in s.timestamps().collect::<Vec<_>>() {
            for k in -3i64..=3 {
                if let Ok(e) = s.entry_at_offset(base, k) {
                    let back = s.entry_at_offset(e.timestamp(), -k).unwrap();
                    assert_eq!(back.timestamp(), base);
                }
            }
        }
    }

    #[test]
    fn value_at_offset_selects_field() {
        let s = sample_series();
        let ts = eod_timestamp(d(5));
        assert_eq!(
            s.value_at_offset(ts, 1, BarField::High).unwrap(),
            dec!(102)
        );
        assert_eq!(
            s.value_at_offset(ts, 0, BarField::Volume).unwrap(),
            dec!(1000)
        );
    }

    #[test]
    fn first_last_iteration() {
        let s = sample_series();
        assert_eq!(s.first().unwrap().close(), dec!(100));
        assert_eq!(s.last().unwrap().close(), dec!(103));
        assert_eq!(s.iter().count(), 4);
    }

    #[test]
    fn equality_is_elementwise() {
        let a = sample_series();
        let b = sample_series();
        assert_eq!(a, b);
        let mut c = sample_series();
        c.add_entry(daily_bar(7, dec!(104))).unwrap();
        assert_ne!(a, c);
    }
}
