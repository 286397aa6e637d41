use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// Bar granularity tag carried by every OHLC entry and series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    Daily,
    Weekly,
    Monthly,
    Intraday,
}

impl TimeFrame {
    /// True for granularities keyed by calendar date rather than datetime.
    pub fn is_eod(self) -> bool {
        !matches!(self, TimeFrame::Intraday)
    }
}

impl std::fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeFrame::Daily => "daily",
            TimeFrame::Weekly => "weekly",
            TimeFrame::Monthly => "monthly",
            TimeFrame::Intraday => "intraday",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TimeFrame {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(TimeFrame::Daily),
            "weekly" => Ok(TimeFrame::Weekly),
            "monthly" => Ok(TimeFrame::Monthly),
            "intraday" => Ok(TimeFrame::Intraday),
            other => Err(TradingError::UnsupportedTimeframe(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags() {
        assert_eq!("daily".parse::<TimeFrame>().unwrap(), TimeFrame::Daily);
        assert_eq!("Weekly".parse::<TimeFrame>().unwrap(), TimeFrame::Weekly);
        assert_eq!(
            "INTRADAY".parse::<TimeFrame>().unwrap(),
            TimeFrame::Intraday
        );
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = "hourly".parse::<TimeFrame>().unwrap_err();
        assert!(matches!(err, TradingError::UnsupportedTimeframe(_)));
    }

    #[test]
    fn eod_classification() {
        assert!(TimeFrame::Daily.is_eod());
        assert!(TimeFrame::Monthly.is_eod());
        assert!(!TimeFrame::Intraday.is_eod());
    }
}
