//! Writers mirroring the reader formats, with configurable line endings.

use std::io::Write;
use std::path::Path;

use trading_core::{Result, TimeFrame, TradingError};

use crate::readers::PalIntradayReader;
use crate::series::OhlcSeries;

/// Output line terminator. LF is the default; CRLF for tools that want
/// Windows-style files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

/// PAL end-of-day writer: `YYYYMMDD,Open,High,Low,Close`.
pub struct PalEodWriter {
    line_ending: LineEnding,
}

impl PalEodWriter {
    pub fn new(line_ending: LineEnding) -> Self {
        Self { line_ending }
    }

    pub fn write<W: Write>(&self, series: &OhlcSeries, out: &mut W) -> Result<()> {
        let eol = self.line_ending.as_str();
        for entry in series.iter() {
            write!(
                out,
                "{},{},{},{},{}{eol}",
                entry.date().format("%Y%m%d"),
                entry.open(),
                entry.high(),
                entry.low(),
                entry.close(),
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, series: &OhlcSeries, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write(series, &mut file)
    }
}

/// PAL volume-for-close writer: `YYYYMMDD,Open,High,Low,Volume`.
pub struct PalVolumeForCloseWriter {
    line_ending: LineEnding,
}

impl PalVolumeForCloseWriter {
    pub fn new(line_ending: LineEnding) -> Self {
        Self { line_ending }
    }

    pub fn write<W: Write>(&self, series: &OhlcSeries, out: &mut W) -> Result<()> {
        let eol = self.line_ending.as_str();
        for entry in series.iter() {
            write!(
                out,
                "{},{},{},{},{}{eol}",
                entry.date().format("%Y%m%d"),
                entry.open(),
                entry.high(),
                entry.low(),
                entry.volume(),
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, series: &OhlcSeries, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write(series, &mut file)
    }
}

/// TradeStation EOD writer. Times are always `00:00` for EOD data; the OI
/// column is written as zero.
pub struct TradeStationEodWriter {
    line_ending: LineEnding,
}

impl TradeStationEodWriter {
    pub fn new(line_ending: LineEnding) -> Self {
        Self { line_ending }
    }

    pub fn write<W: Write>(&self, series: &OhlcSeries, out: &mut W) -> Result<()> {
        let eol = self.line_ending.as_str();
        write!(
            out,
            "\"Date\",\"Time\",\"Open\",\"High\",\"Low\",\"Close\",\"Vol\",\"OI\"{eol}"
        )?;
        for entry in series.iter() {
            write!(
                out,
                "{},00:00,{},{},{},{},{},0{eol}",
                entry.date().format("%m/%d/%Y"),
                entry.open(),
                entry.high(),
                entry.low(),
                entry.close(),
                entry.volume(),
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, series: &OhlcSeries, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write(series, &mut file)
    }
}

/// TradeStation intraday writer. The combined bar volume is emitted in the
/// `Up` column; `Down` is written as zero.
pub struct TradeStationIntradayWriter {
    line_ending: LineEnding,
}

impl TradeStationIntradayWriter {
    pub fn new(line_ending: LineEnding) -> Self {
        Self { line_ending }
    }

    pub fn write<W: Write>(&self, series: &OhlcSeries, out: &mut W) -> Result<()> {
        if series.timeframe() != TimeFrame::Intraday {
            return Err(TradingError::InvalidArgument(
                "TradeStation intraday writer requires an intraday series".to_string(),
            ));
        }
        let eol = self.line_ending.as_str();
        write!(
            out,
            "\"Date\",\"Time\",\"Open\",\"High\",\"Low\",\"Close\",\"Up\",\"Down\"{eol}"
        )?;
        for entry in series.iter() {
            write!(
                out,
                "{},{},{},{},{},{},{},0{eol}",
                entry.date().format("%m/%d/%Y"),
                entry.timestamp().format("%H:%M"),
                entry.open(),
                entry.high(),
                entry.low(),
                entry.close(),
                entry.volume(),
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, series: &OhlcSeries, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write(series, &mut file)
    }
}

/// PAL intraday writer: headerless `seq O H L C` rows. The sequence counter
/// restarts at the per-file base for every writer instance.
pub struct PalIntradayWriter {
    line_ending: LineEnding,
    next_sequence: u64,
}

impl PalIntradayWriter {
    pub fn new(line_ending: LineEnding) -> Self {
        Self {
            line_ending,
            next_sequence: PalIntradayReader::FIRST_SEQUENCE,
        }
    }

    pub fn write<W: Write>(&mut self, series: &OhlcSeries, out: &mut W) -> Result<()> {
        if series.timeframe() != TimeFrame::Intraday {
            return Err(TradingError::InvalidArgument(
                "PAL intraday writer requires an intraday series".to_string(),
            ));
        }
        let eol = self.line_ending.as_str();
        for entry in series.iter() {
            write!(
                out,
                "{} {} {} {} {}{eol}",
                self.next_sequence,
                entry.open(),
                entry.high(),
                entry.low(),
                entry.close(),
            )?;
            self.next_sequence += 1;
        }
        Ok(())
    }

    pub fn write_file(&mut self, series: &OhlcSeries, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write(series, &mut file)
    }
}
