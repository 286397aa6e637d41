//! Synthetic price series: bar-level permutations that preserve the return
//! distribution of the original market while destroying its ordering.
//!
//! The daily generator shuffles relative bar factors and replays them from
//! the original first bar. The intraday generator additionally preserves
//! per-day structure: bars permute within days, overnight gaps permute
//! across days, and the day order itself permutes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use tracing::debug;
use trading_core::{round_to_tick, Result, TimeFrame, TradingError};

use crate::entry::OhlcEntry;
use crate::series::OhlcSeries;

/// Relative factors of one bar.
#[derive(Debug, Clone, Copy)]
struct BarFactors {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

/// Permutes a daily/weekly/monthly series.
///
/// For each bar `i ≥ 1` the factors are `rO = O/C_prev`, `rH = H/O`,
/// `rL = L/O`, `rC = C/O`. A permutation shuffles the factor order and
/// replays it from the original first bar, rounding stored prices to the
/// tick while carrying the unrounded close forward.
pub struct DailySyntheticSeries {
    timeframe: TimeFrame,
    tick: Decimal,
    timestamps: Vec<NaiveDateTime>,
    first_bar: OhlcEntry,
    factors: Vec<BarFactors>,
    volumes: Vec<Decimal>,
}

impl DailySyntheticSeries {
    pub fn new(series: &OhlcSeries, tick: Decimal) -> Result<Self> {
        if series.timeframe() == TimeFrame::Intraday {
            return Err(TradingError::InvalidArgument(
                "intraday series require the intraday generator".to_string(),
            ));
        }
        let first_bar = series
            .first()
            .cloned()
            .ok_or_else(|| TradingError::InvalidArgument("empty series".to_string()))?;

        let mut factors = Vec::with_capacity(series.len().saturating_sub(1));
        let mut volumes = Vec::with_capacity(series.len().saturating_sub(1));
        let mut prev_close = first_bar.close();
        for entry in series.iter().skip(1) {
            if prev_close.is_zero() || entry.open().is_zero() {
                return Err(TradingError::InvalidArgument(format!(
                    "non-positive price at {} breaks factor computation",
                    entry.timestamp()
                )));
            }
            factors.push(BarFactors {
                open: entry.open() / prev_close,
                high: entry.high() / entry.open(),
                low: entry.low() / entry.open(),
                close: entry.close() / entry.open(),
            });
            volumes.push(entry.volume());
            prev_close = entry.close();
        }

        Ok(Self {
            timeframe: series.timeframe(),
            tick,
            timestamps: series.timestamps().collect(),
            first_bar,
            factors,
            volumes,
        })
    }

    /// Build one permuted series. The same seed always yields the same
    /// output; distinct seeds yield independent permutations.
    pub fn permute(&self, seed: u64) -> Result<OhlcSeries> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..self.factors.len()).collect();
        order.shuffle(&mut rng);
        debug!(seed, bars = self.timestamps.len(), "daily permutation");

        let mut out = OhlcSeries::new(self.timeframe);
        out.add_entry(self.first_bar.clone())?;

        let mut prev_close = self.first_bar.close();
        for (slot, &src) in order.iter().enumerate() {
            let f = self.factors[src];
            let open = prev_close * f.open;
            let high = open * f.high;
            let low = open * f.low;
            let close = open * f.close;
            let ts = self.timestamps[slot + 1];
            out.add_entry(OhlcEntry::new(
                ts,
                round_to_tick(open, self.tick)?,
                round_to_tick(high, self.tick)?,
                round_to_tick(low, self.tick)?,
                round_to_tick(close, self.tick)?,
                self.volumes[src],
                self.timeframe,
            )?)?;
            prev_close = close;
        }
        Ok(out)
    }
}

/// One permutable day's reusable permutation state.
#[derive(Debug, Clone)]
struct DayState {
    date: NaiveDate,
    times: Vec<NaiveTime>,
    factors: Vec<BarFactors>,
}

/// Permutes an intraday series while preserving per-day structure.
///
/// The first (basis) day is preserved bit-exact. Every other day converts
/// its bars into factors relative to the day open; a permutation shuffles
/// the bars within each day, the overnight gap factors across days, and the
/// order of the days themselves, then rebuilds anchors via
/// `newDayOpen = prevReconstructedClose * gap`.
pub struct IntradaySyntheticSeries {
    tick: Decimal,
    basis: Vec<OhlcEntry>,
    basis_close: Decimal,
    days: Vec<DayState>,
    gap_factors: Vec<Decimal>,
}

impl IntradaySyntheticSeries {
    pub fn new(series: &OhlcSeries, tick: Decimal) -> Result<Self> {
        if series.timeframe() != TimeFrame::Intraday {
            return Err(TradingError::InvalidArgument(
                "intraday generator requires an intraday series".to_string(),
            ));
        }
        if series.is_empty() {
            return Err(TradingError::InvalidArgument("empty series".to_string()));
        }

        // Group bars by calendar day, preserving in-day order.
        let mut grouped: Vec<(NaiveDate, Vec<OhlcEntry>)> = Vec::new();
        for entry in series.iter() {
            match grouped.last_mut() {
                Some((date, bars)) if *date == entry.date() => bars.push(entry.clone()),
                _ => grouped.push((entry.date(), vec![entry.clone()])),
            }
        }

        let (_, basis) = grouped.remove(0);
        let basis_close = basis.last().expect("basis day has bars").close();

        let mut days = Vec::with_capacity(grouped.len());
        let mut gap_factors = Vec::with_capacity(grouped.len());
        let mut prev_close = basis_close;
        for (date, bars) in grouped {
            let day_open = bars.first().expect("day has bars").open();
            if day_open.is_zero() || prev_close.is_zero() {
                return Err(TradingError::InvalidArgument(format!(
                    "non-positive anchor price on {date}"
                )));
            }
            gap_factors.push(day_open / prev_close);
            let mut times = Vec::with_capacity(bars.len());
            let mut factors = Vec::with_capacity(bars.len());
            for bar in &bars {
                times.push(bar.timestamp().time());
                factors.push(BarFactors {
                    open: bar.open() / day_open,
                    high: bar.high() / day_open,
                    low: bar.low() / day_open,
                    close: bar.close() / day_open,
                });
            }
            prev_close = bars.last().expect("day has bars").close();
            days.push(DayState {
                date,
                times,
                factors,
            });
        }

        Ok(Self {
            tick,
            basis,
            basis_close,
            days,
            gap_factors,
        })
    }

    /// Number of permutable (non-basis) days.
    pub fn num_permutable_days(&self) -> usize {
        self.days.len()
    }

    /// Build one permuted series; volumes of reconstructed bars are zero
    /// (volume is not part of the null model).
    pub fn permute(&self, seed: u64) -> Result<OhlcSeries> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut day_order: Vec<usize> = (0..self.days.len()).collect();
        day_order.shuffle(&mut rng);

        let mut gaps = self.gap_factors.clone();
        gaps.shuffle(&mut rng);

        // Per-day intra-day bar permutations, one per source day.
        let mut intra_orders: Vec<Vec<usize>> = Vec::with_capacity(self.days.len());
        for day in &self.days {
            let mut order: Vec<usize> = (0..day.factors.len()).collect();
            order.shuffle(&mut rng);
            intra_orders.push(order);
        }
        debug!(seed, days = self.days.len(), "intraday permutation");

        let mut out = OhlcSeries::new(TimeFrame::Intraday);
        for bar in &self.basis {
            out.add_entry(bar.clone())?;
        }

        let mut prev_close = self.basis_close;
        for (slot, &src_idx) in day_order.iter().enumerate() {
            let src = &self.days[src_idx];
            let slot_date = self.days[slot].date;
            let anchor = prev_close * gaps[slot];

            let mut last_close = prev_close;
            for (bar_pos, &factor_idx) in intra_orders[src_idx].iter().enumerate() {
                let f = src.factors[factor_idx];
                let open = anchor * f.open;
                let high = anchor * f.high;
                let low = anchor * f.low;
                let close = anchor * f.close;
                let ts = NaiveDateTime::new(slot_date, src.times[bar_pos]);
                out.add_entry(OhlcEntry::new_intraday(
                    ts,
                    round_to_tick(open, self.tick)?,
                    round_to_tick(high, self.tick)?,
                    round_to_tick(low, self.tick)?,
                    round_to_tick(close, self.tick)?,
                    Decimal::ZERO,
                )?)?;
                last_close = close;
            }
            prev_close = last_close;
        }
        Ok(out)
    }
}
