use market_data::{BarField, OhlcSeries};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trading_core::{PercentNumber, Result, TradingError};

/// Price field a pattern may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    fn bar_field(self) -> BarField {
        match self {
            PriceField::Open => BarField::Open,
            PriceField::High => BarField::High,
            PriceField::Low => BarField::Low,
            PriceField::Close => BarField::Close,
        }
    }
}

/// A reference to one price field at a bar offset; offset 0 is the signal
/// bar, larger offsets look further back in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarReference {
    pub field: PriceField,
    pub offset: u32,
}

impl BarReference {
    pub fn new(field: PriceField, offset: u32) -> Self {
        Self { field, offset }
    }
}

/// Pattern expression tree: greater-than comparisons composed with AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternExpr {
    GreaterThan(BarReference, BarReference),
    And(Box<PatternExpr>, Box<PatternExpr>),
}

impl PatternExpr {
    pub fn gt(lhs: BarReference, rhs: BarReference) -> Self {
        PatternExpr::GreaterThan(lhs, rhs)
    }

    pub fn and(lhs: PatternExpr, rhs: PatternExpr) -> Self {
        PatternExpr::And(Box::new(lhs), Box::new(rhs))
    }

    /// Flatten to the greater-than leaves, left to right.
    pub fn comparisons(&self) -> Vec<(&BarReference, &BarReference)> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    fn collect_comparisons<'a>(&'a self, out: &mut Vec<(&'a BarReference, &'a BarReference)>) {
        match self {
            PatternExpr::GreaterThan(lhs, rhs) => out.push((lhs, rhs)),
            PatternExpr::And(lhs, rhs) => {
                lhs.collect_comparisons(out);
                rhs.collect_comparisons(out);
            }
        }
    }

    /// The deepest bar offset the expression needs.
    pub fn max_lookback(&self) -> u32 {
        self.comparisons()
            .iter()
            .map(|(l, r)| l.offset.max(r.offset))
            .max()
            .unwrap_or(0)
    }

    /// Evaluate the expression against `series` with offset 0 anchored at
    /// `ts`. Insufficient history (an offset walking off the front of the
    /// series) evaluates to `false`; a missing anchor timestamp is an error.
    pub fn evaluate(&self, series: &OhlcSeries, ts: chrono::NaiveDateTime) -> Result<bool> {
        match self {
            PatternExpr::GreaterThan(lhs, rhs) => {
                let l = match Self::resolve(series, ts, lhs) {
                    Ok(v) => v,
                    Err(TradingError::OffsetOutOfRange(_)) => return Ok(false),
                    Err(e) => return Err(e),
                };
                let r = match Self::resolve(series, ts, rhs) {
                    Ok(v) => v,
                    Err(TradingError::OffsetOutOfRange(_)) => return Ok(false),
                    Err(e) => return Err(e),
                };
                Ok(l > r)
            }
            PatternExpr::And(lhs, rhs) => {
                Ok(lhs.evaluate(series, ts)? && rhs.evaluate(series, ts)?)
            }
        }
    }

    fn resolve(
        series: &OhlcSeries,
        ts: chrono::NaiveDateTime,
        reference: &BarReference,
    ) -> Result<Decimal> {
        series.value_at_offset(ts, reference.offset as i64, reference.field.bar_field())
    }
}

/// Long/short direction of a pattern and its derived strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn is_long(self) -> bool {
        matches!(self, TradeDirection::Long)
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Long => write!(f, "long"),
            TradeDirection::Short => write!(f, "short"),
        }
    }
}

/// Entry style of a pattern. Only market-on-open entries exist today; the
/// enum keeps the wire shape open for limit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntrySpec {
    MarketOnOpen,
}

/// A complete tradeable pattern: a decidable condition over recent bars
/// plus direction, entry style and percent-based profit target / stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePattern {
    name: String,
    expression: PatternExpr,
    direction: TradeDirection,
    entry: EntrySpec,
    profit_target: Option<PercentNumber>,
    stop_loss: Option<PercentNumber>,
}

impl PricePattern {
    pub fn new(
        name: &str,
        expression: PatternExpr,
        direction: TradeDirection,
        profit_target: Option<PercentNumber>,
        stop_loss: Option<PercentNumber>,
    ) -> Self {
        Self {
            name: name.to_string(),
            expression,
            direction,
            entry: EntrySpec::MarketOnOpen,
            profit_target,
            stop_loss,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &PatternExpr {
        &self.expression
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

    pub fn entry(&self) -> EntrySpec {
        self.entry
    }

    pub fn profit_target(&self) -> Option<PercentNumber> {
        self.profit_target
    }

    pub fn stop_loss(&self) -> Option<PercentNumber> {
        self.stop_loss
    }

    /// `target% / stop%`; `None` unless both barriers are present.
    pub fn payoff_ratio(&self) -> Option<Decimal> {
        match (self.profit_target, self.stop_loss) {
            (Some(target), Some(stop)) if !stop.as_percent().is_zero() => {
                Some(target.as_percent() / stop.as_percent())
            }
            _ => None,
        }
    }

    pub fn max_lookback(&self) -> u32 {
        self.expression.max_lookback()
    }

    /// True when the pattern's condition holds on the bar at `ts`.
    pub fn evaluate(&self, series: &OhlcSeries, ts: chrono::NaiveDateTime) -> Result<bool> {
        self.expression.evaluate(series, ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_data::OhlcEntry;
    use rust_decimal_macros::dec;
    use trading_core::{eod_timestamp, TimeFrame};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, day).unwrap()
    }

    fn series() -> OhlcSeries {
        let mut s = OhlcSeries::new(TimeFrame::Daily);
        // day: open, high, low, close
        for (day, o, h, l, c) in [
            (3u32, dec!(100.0), dec!(101.0), dec!(99.0), dec!(100.5)),
            (4, dec!(100.5), dec!(102.0), dec!(100.0), dec!(101.0)),
            (5, dec!(101.0), dec!(103.0), dec!(100.5), dec!(102.0)),
        ] {
            s.add_entry(
                OhlcEntry::new_eod(d(day), o, h, l, c, dec!(0), TimeFrame::Daily).unwrap(),
            )
            .unwrap();
        }
        s
    }

    fn close(offset: u32) -> BarReference {
        BarReference::new(PriceField::Close, offset)
    }

    fn open(offset: u32) -> BarReference {
        BarReference::new(PriceField::Open, offset)
    }

    #[test]
    fn comparisons_flatten_left_to_right() {
        let expr = PatternExpr::and(
            PatternExpr::gt(close(0), open(0)),
            PatternExpr::and(
                PatternExpr::gt(close(0), close(1)),
                PatternExpr::gt(close(1), close(2)),
            ),
        );
        let comps = expr.comparisons();
        assert_eq!(comps.len(), 3);
        assert_eq!(comps[0].0.offset, 0);
        assert_eq!(comps[2].1.offset, 2);
        assert_eq!(expr.max_lookback(), 2);
    }

    #[test]
    fn evaluates_single_comparison() {
        let s = series();
        let expr = PatternExpr::gt(close(0), open(0));
        // day 4: close 101.0 > open 100.5
        assert!(expr.evaluate(&s, eod_timestamp(d(4))).unwrap());
    }

    #[test]
    fn and_composition_requires_both() {
        let s = series();
        let expr = PatternExpr::and(
            PatternExpr::gt(close(0), open(0)),
            PatternExpr::gt(open(0), close(0)),
        );
        assert!(!expr.evaluate(&s, eod_timestamp(d(4))).unwrap());
    }

    #[test]
    fn insufficient_history_is_false() {
        let s = series();
        let expr = PatternExpr::gt(close(0), close(2));
        // day 4 has only one prior bar
        assert!(!expr.evaluate(&s, eod_timestamp(d(4))).unwrap());
        // day 5 has two
        assert!(expr.evaluate(&s, eod_timestamp(d(5))).unwrap());
    }

    #[test]
    fn missing_anchor_is_error() {
        let s = series();
        let expr = PatternExpr::gt(close(0), open(0));
        assert!(expr.evaluate(&s, eod_timestamp(d(10))).is_err());
    }

    #[test]
    fn payoff_ratio_requires_both_barriers() {
        let expr = PatternExpr::gt(close(0), open(0));
        let full = PricePattern::new(
            "p1",
            expr.clone(),
            TradeDirection::Long,
            Some(PercentNumber::new(dec!(2.0)).unwrap()),
            Some(PercentNumber::new(dec!(1.0)).unwrap()),
        );
        assert_eq!(full.payoff_ratio(), Some(dec!(2.0)));

        let no_stop = PricePattern::new(
            "p2",
            expr,
            TradeDirection::Long,
            Some(PercentNumber::new(dec!(2.0)).unwrap()),
            None,
        );
        assert_eq!(no_stop.payoff_ratio(), None);
    }
}
