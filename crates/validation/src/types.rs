use std::sync::Arc;

use backtest_engine::PatternStrategy;
use pattern_catalog::TradeDirection;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

/// One candidate strategy with its observed (baseline) performance.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub strategy: Arc<PatternStrategy>,
    pub baseline_stat: Decimal,
    pub num_trades: usize,
}

/// Baseline data for a whole catalog, in preparation order.
pub type StrategyDataContainer = Vec<StrategyContext>;

/// Final verdict for one strategy after multiple-testing adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyVerdict {
    pub strategy_name: String,
    pub direction: TradeDirection,
    pub baseline_stat: Decimal,
    pub num_trades: usize,
    pub adjusted_p_value: Decimal,
    pub survives: bool,
}

/// Result of a validation run: per-strategy adjusted p-values, ordered by
/// descending baseline statistic.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub alpha: Decimal,
    pub num_permutations: u32,
    pub verdicts: Vec<StrategyVerdict>,
}

impl ValidationOutcome {
    pub fn surviving(&self) -> impl Iterator<Item = &StrategyVerdict> {
        self.verdicts.iter().filter(|v| v.survives)
    }

    pub fn num_surviving(&self) -> usize {
        self.surviving().count()
    }

    /// Normal-approximation confidence interval for one Monte-Carlo
    /// p-value estimate, clamped to [0, 1].
    pub fn p_value_confidence_interval(
        p_value: Decimal,
        num_permutations: u32,
        confidence: f64,
    ) -> (f64, f64) {
        let p = p_value.to_f64().unwrap_or(0.0);
        let n = f64::from(num_permutations.max(1));
        let se = (p * (1.0 - p) / n).sqrt();
        let normal = Normal::new(0.0, 1.0).expect("standard normal");
        let z = normal.inverse_cdf(1.0 - (1.0 - confidence) / 2.0);
        ((p - z * se).max(0.0), (p + z * se).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn confidence_interval_brackets_the_estimate() {
        let (lo, hi) = ValidationOutcome::p_value_confidence_interval(dec!(0.10), 1000, 0.95);
        assert!(lo < 0.10 && 0.10 < hi);
        assert!(lo >= 0.0 && hi <= 1.0);
        // tighter with more permutations
        let (lo2, hi2) = ValidationOutcome::p_value_confidence_interval(dec!(0.10), 100_000, 0.95);
        assert!(hi2 - lo2 < hi - lo);
    }

    #[test]
    fn degenerate_p_values_clamp() {
        let (lo, hi) = ValidationOutcome::p_value_confidence_interval(dec!(0), 100, 0.95);
        assert_eq!(lo, 0.0);
        assert!(hi >= 0.0);
    }
}
