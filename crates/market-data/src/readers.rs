//! Thin readers for the supported market-data file formats.
//!
//! Each reader parses one format into an [`OhlcSeries`]; validation happens
//! in the entry/series constructors so malformed rows fail loudly.

use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tracing::debug;
use trading_core::{Result, TimeFrame, TradingError};

use crate::entry::OhlcEntry;
use crate::series::OhlcSeries;

fn parse_decimal(s: &str, context: &str) -> Result<Decimal> {
    s.trim()
        .parse()
        .map_err(|_| TradingError::InvalidArgument(format!("{context}: bad number {s:?}")))
}

fn parse_pal_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d")
        .map_err(|_| TradingError::InvalidArgument(format!("bad PAL date {s:?}")))
}

fn parse_ts_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y")
        .map_err(|_| TradingError::InvalidArgument(format!("bad TradeStation date {s:?}")))
}

fn parse_ts_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| TradingError::InvalidArgument(format!("bad TradeStation time {s:?}")))
}

/// PAL end-of-day format: `YYYYMMDD,Open,High,Low,Close`, no header, no
/// volume column.
pub struct PalEodReader {
    timeframe: TimeFrame,
}

impl PalEodReader {
    pub fn new(timeframe: TimeFrame) -> Result<Self> {
        if !timeframe.is_eod() {
            return Err(TradingError::InvalidArgument(
                "PAL EOD reader requires an EOD timeframe".to_string(),
            ));
        }
        Ok(Self { timeframe })
    }

    pub fn read<R: Read>(&self, input: R) -> Result<OhlcSeries> {
        let mut series = OhlcSeries::new(self.timeframe);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(input);
        for record in reader.records() {
            let record = record.map_err(|e| TradingError::Io(e.to_string()))?;
            if record.len() < 5 {
                return Err(TradingError::InvalidArgument(format!(
                    "PAL EOD row needs 5 fields, got {}",
                    record.len()
                )));
            }
            let date = parse_pal_date(&record[0])?;
            let entry = OhlcEntry::new_eod(
                date,
                parse_decimal(&record[1], "open")?,
                parse_decimal(&record[2], "high")?,
                parse_decimal(&record[3], "low")?,
                parse_decimal(&record[4], "close")?,
                Decimal::ZERO,
                self.timeframe,
            )?;
            series.add_entry(entry)?;
        }
        debug!(rows = series.len(), "PAL EOD read complete");
        Ok(series)
    }

    pub fn read_file(&self, path: &Path) -> Result<OhlcSeries> {
        self.read(std::fs::File::open(path)?)
    }
}

/// PAL volume-for-close format: `YYYYMMDD,Open,High,Low,Volume`, where the
/// slot a close would occupy carries the volume figure instead. The reader
/// maps that figure back into the volume field; the close (absent from the
/// file) is set to the open so the bar invariant holds.
pub struct PalVolumeForCloseReader {
    timeframe: TimeFrame,
}

impl PalVolumeForCloseReader {
    pub fn new(timeframe: TimeFrame) -> Result<Self> {
        if !timeframe.is_eod() {
            return Err(TradingError::InvalidArgument(
                "PAL volume-for-close reader requires an EOD timeframe".to_string(),
            ));
        }
        Ok(Self { timeframe })
    }

    pub fn read<R: Read>(&self, input: R) -> Result<OhlcSeries> {
        let mut series = OhlcSeries::new(self.timeframe);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(input);
        for record in reader.records() {
            let record = record.map_err(|e| TradingError::Io(e.to_string()))?;
            if record.len() < 5 {
                return Err(TradingError::InvalidArgument(format!(
                    "PAL volume-for-close row needs 5 fields, got {}",
                    record.len()
                )));
            }
            let date = parse_pal_date(&record[0])?;
            let open = parse_decimal(&record[1], "open")?;
            let high = parse_decimal(&record[2], "high")?;
            let low = parse_decimal(&record[3], "low")?;
            let volume = parse_decimal(&record[4], "volume")?;
            let entry = OhlcEntry::new_eod(date, open, high, low, open, volume, self.timeframe)?;
            series.add_entry(entry)?;
        }
        Ok(series)
    }

    pub fn read_file(&self, path: &Path) -> Result<OhlcSeries> {
        self.read(std::fs::File::open(path)?)
    }
}

/// TradeStation EOD format: quoted header
/// `"Date","Time","Open","High","Low","Close","Vol","OI"`, `MM/dd/yyyy`
/// dates, times always `00:00`.
pub struct TradeStationEodReader {
    timeframe: TimeFrame,
}

impl TradeStationEodReader {
    pub fn new(timeframe: TimeFrame) -> Result<Self> {
        if !timeframe.is_eod() {
            return Err(TradingError::InvalidArgument(
                "TradeStation EOD reader requires an EOD timeframe".to_string(),
            ));
        }
        Ok(Self { timeframe })
    }

    pub fn read<R: Read>(&self, input: R) -> Result<OhlcSeries> {
        let mut series = OhlcSeries::new(self.timeframe);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input);
        for record in reader.records() {
            let record = record.map_err(|e| TradingError::Io(e.to_string()))?;
            if record.len() < 7 {
                return Err(TradingError::InvalidArgument(format!(
                    "TradeStation EOD row needs at least 7 fields, got {}",
                    record.len()
                )));
            }
            let date = parse_ts_date(&record[0])?;
            let entry = OhlcEntry::new_eod(
                date,
                parse_decimal(&record[2], "open")?,
                parse_decimal(&record[3], "high")?,
                parse_decimal(&record[4], "low")?,
                parse_decimal(&record[5], "close")?,
                parse_decimal(&record[6], "volume")?,
                self.timeframe,
            )?;
            series.add_entry(entry)?;
        }
        Ok(series)
    }

    pub fn read_file(&self, path: &Path) -> Result<OhlcSeries> {
        self.read(std::fs::File::open(path)?)
    }
}

/// TradeStation intraday format: header
/// `"Date","Time","Open","High","Low","Close","Up","Down"`.
#[derive(Default)]
pub struct TradeStationIntradayReader;

impl TradeStationIntradayReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read<R: Read>(&self, input: R) -> Result<OhlcSeries> {
        let mut series = OhlcSeries::new(TimeFrame::Intraday);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input);
        for record in reader.records() {
            let record = record.map_err(|e| TradingError::Io(e.to_string()))?;
            if record.len() < 8 {
                return Err(TradingError::InvalidArgument(format!(
                    "TradeStation intraday row needs 8 fields, got {}",
                    record.len()
                )));
            }
            let date = parse_ts_date(&record[0])?;
            let time = parse_ts_time(&record[1])?;
            let up = parse_decimal(&record[6], "up volume")?;
            let down = parse_decimal(&record[7], "down volume")?;
            let entry = OhlcEntry::new_intraday(
                NaiveDateTime::new(date, time),
                parse_decimal(&record[2], "open")?,
                parse_decimal(&record[3], "high")?,
                parse_decimal(&record[4], "low")?,
                parse_decimal(&record[5], "close")?,
                up + down,
            )?;
            series.add_entry(entry)?;
        }
        Ok(series)
    }

    pub fn read_file(&self, path: &Path) -> Result<OhlcSeries> {
        self.read(std::fs::File::open(path)?)
    }
}

/// PAL intraday format: headerless, space-separated `seq O H L C` rows with
/// the sequence starting at `10000001` per file. The sequence number encodes
/// bar order only; timestamps are synthesized as successive minutes so each
/// file maps onto one trading session.
#[derive(Default)]
pub struct PalIntradayReader;

impl PalIntradayReader {
    pub const FIRST_SEQUENCE: u64 = 10_000_001;

    pub fn new() -> Self {
        Self
    }

    pub fn read<R: Read>(&self, input: R) -> Result<OhlcSeries> {
        let mut series = OhlcSeries::new(TimeFrame::Intraday);
        let mut content = String::new();
        let mut input = input;
        input.read_to_string(&mut content)?;

        let session_start = NaiveDate::from_ymd_opt(2000, 1, 3)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid session start");

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(TradingError::InvalidArgument(format!(
                    "PAL intraday line {} needs 5 fields, got {}",
                    line_no + 1,
                    fields.len()
                )));
            }
            let seq: u64 = fields[0].parse().map_err(|_| {
                TradingError::InvalidArgument(format!("bad sequence {:?}", fields[0]))
            })?;
            if seq < Self::FIRST_SEQUENCE {
                return Err(TradingError::InvalidArgument(format!(
                    "sequence {seq} below the per-file base {}",
                    Self::FIRST_SEQUENCE
                )));
            }
            let offset = seq - Self::FIRST_SEQUENCE;
            let ts = session_start + chrono::Duration::minutes(offset as i64);
            let entry = OhlcEntry::new_intraday(
                ts,
                parse_decimal(fields[1], "open")?,
                parse_decimal(fields[2], "high")?,
                parse_decimal(fields[3], "low")?,
                parse_decimal(fields[4], "close")?,
                Decimal::ZERO,
            )?;
            series.add_entry(entry)?;
        }
        Ok(series)
    }

    pub fn read_file(&self, path: &Path) -> Result<OhlcSeries> {
        self.read(std::fs::File::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pal_eod_reads_rows() {
        let data = "20220103,100.0,101.0,99.0,100.5\n20220104,100.5,102.0,100.0,101.0\n";
        let series = PalEodReader::new(TimeFrame::Daily)
            .unwrap()
            .read(data.as_bytes())
            .unwrap();
        assert_eq!(series.len(), 2);
        let first = series.first().unwrap();
        assert_eq!(first.open(), dec!(100.0));
        assert_eq!(first.close(), dec!(100.5));
        assert_eq!(first.volume(), dec!(0));
    }

    #[test]
    fn pal_eod_rejects_intraday() {
        assert!(PalEodReader::new(TimeFrame::Intraday).is_err());
    }

    #[test]
    fn tradestation_eod_skips_header() {
        let data = "\"Date\",\"Time\",\"Open\",\"High\",\"Low\",\"Close\",\"Vol\",\"OI\"\n\
                    01/03/2022,00:00,100.0,101.0,99.0,100.5,1000,0\n";
        let series = TradeStationEodReader::new(TimeFrame::Daily)
            .unwrap()
            .read(data.as_bytes())
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first().unwrap().volume(), dec!(1000));
    }

    #[test]
    fn tradestation_intraday_parses_times() {
        let data = "\"Date\",\"Time\",\"Open\",\"High\",\"Low\",\"Close\",\"Up\",\"Down\"\n\
                    01/03/2022,09:30,100.0,100.5,99.8,100.2,300,200\n\
                    01/03/2022,09:35,100.2,100.8,100.1,100.6,100,50\n";
        let series = TradeStationIntradayReader::new().read(data.as_bytes()).unwrap();
        assert_eq!(series.len(), 2);
        let first = series.first().unwrap();
        assert_eq!(first.timestamp().time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(first.volume(), dec!(500));
    }

    #[test]
    fn pal_intraday_sequence_ordering() {
        let data = "10000001 100.0 100.5 99.8 100.2\n10000002 100.2 100.8 100.1 100.6\n";
        let series = PalIntradayReader::new().read(data.as_bytes()).unwrap();
        assert_eq!(series.len(), 2);
        let ts: Vec<_> = series.timestamps().collect();
        assert!(ts[0] < ts[1]);
    }

    #[test]
    fn pal_intraday_rejects_low_sequence() {
        let data = "999 100.0 100.5 99.8 100.2\n";
        assert!(PalIntradayReader::new().read(data.as_bytes()).is_err());
    }

    #[test]
    fn malformed_rows_fail() {
        let data = "20220103,100.0,101.0\n";
        assert!(PalEodReader::new(TimeFrame::Daily)
            .unwrap()
            .read(data.as_bytes())
            .is_err());
    }
}
