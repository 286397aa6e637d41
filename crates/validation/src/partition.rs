use std::collections::BTreeMap;

use pattern_catalog::{PatternClassifier, StrategyCategory, StrategySubType, TradeDirection};
use serde::Serialize;
use tracing::info;

use crate::types::StrategyDataContainer;

/// Identity of one strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StrategyFamilyKey {
    pub direction: TradeDirection,
    /// Absent when partitioning by direction only.
    pub category: Option<StrategyCategory>,
    /// Present only when partitioning down to sub-types.
    pub sub_type: Option<StrategySubType>,
}

impl std::fmt::Display for StrategyFamilyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = match self.direction {
            TradeDirection::Long => "Long",
            TradeDirection::Short => "Short",
        };
        match (self.category, self.sub_type) {
            (Some(category), Some(sub_type)) => write!(f, "{direction} - {category} - {sub_type}"),
            (Some(category), None) => write!(f, "{direction} - {category}"),
            _ => write!(f, "{direction}"),
        }
    }
}

/// How finely strategies split into families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionGranularity {
    DirectionOnly,
    DirectionAndCategory,
    DirectionCategoryAndSubType,
}

impl PartitionGranularity {
    /// Pick a granularity for a catalog size: very large catalogs split
    /// down to sub-types; small ones keep families big enough to test by
    /// splitting on direction only.
    pub fn auto(num_strategies: usize) -> Self {
        if num_strategies >= 1000 {
            PartitionGranularity::DirectionCategoryAndSubType
        } else if num_strategies >= 50 {
            PartitionGranularity::DirectionAndCategory
        } else {
            PartitionGranularity::DirectionOnly
        }
    }
}

/// Per-family composition numbers.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyStatistics {
    pub key: StrategyFamilyKey,
    pub count: usize,
    pub percentage_of_total: f64,
}

/// The family a pattern belongs to at a given granularity.
pub fn family_key(
    pattern: &pattern_catalog::PricePattern,
    granularity: PartitionGranularity,
) -> StrategyFamilyKey {
    let classification = PatternClassifier::classify(pattern);
    match granularity {
        PartitionGranularity::DirectionOnly => StrategyFamilyKey {
            direction: pattern.direction(),
            category: None,
            sub_type: None,
        },
        PartitionGranularity::DirectionAndCategory => StrategyFamilyKey {
            direction: pattern.direction(),
            category: Some(classification.category),
            sub_type: None,
        },
        PartitionGranularity::DirectionCategoryAndSubType => StrategyFamilyKey {
            direction: pattern.direction(),
            category: Some(classification.category),
            sub_type: Some(classification.sub_type),
        },
    }
}

/// Splits a strategy container into classifier-derived families.
pub struct StrategyFamilyPartitioner {
    families: BTreeMap<StrategyFamilyKey, StrategyDataContainer>,
    total: usize,
    granularity: PartitionGranularity,
}

impl StrategyFamilyPartitioner {
    pub fn new(data: StrategyDataContainer, granularity: PartitionGranularity) -> Self {
        let total = data.len();
        let mut families: BTreeMap<StrategyFamilyKey, StrategyDataContainer> = BTreeMap::new();
        for context in data {
            let key = family_key(context.strategy.pattern(), granularity);
            families.entry(key).or_default().push(context);
        }
        info!(families = families.len(), total, "strategies partitioned");
        Self {
            families,
            total,
            granularity,
        }
    }

    pub fn granularity(&self) -> PartitionGranularity {
        self.granularity
    }

    pub fn num_families(&self) -> usize {
        self.families.len()
    }

    pub fn total_strategy_count(&self) -> usize {
        self.total
    }

    pub fn family_count(&self, key: &StrategyFamilyKey) -> usize {
        self.families.get(key).map(Vec::len).unwrap_or(0)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&StrategyFamilyKey, &StrategyDataContainer)> {
        self.families.iter()
    }

    pub fn into_families(self) -> BTreeMap<StrategyFamilyKey, StrategyDataContainer> {
        self.families
    }

    pub fn statistics(&self) -> Vec<FamilyStatistics> {
        if self.total == 0 {
            return Vec::new();
        }
        self.families
            .iter()
            .map(|(key, members)| FamilyStatistics {
                key: *key,
                count: members.len(),
                percentage_of_total: members.len() as f64 / self.total as f64 * 100.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyContext;
    use backtest_engine::PatternStrategy;
    use market_data::{OhlcSeries, Portfolio, Security};
    use pattern_catalog::{BarReference, PatternExpr, PriceField, PricePattern};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use trading_core::{PercentNumber, TimeFrame};

    use PriceField::{Close, High, Open};

    fn reference(field: PriceField, offset: u32) -> BarReference {
        BarReference::new(field, offset)
    }

    fn chain(comparisons: Vec<(BarReference, BarReference)>) -> PatternExpr {
        let mut iter = comparisons.into_iter();
        let (l, r) = iter.next().unwrap();
        let mut expr = PatternExpr::gt(l, r);
        for (l, r) in iter {
            expr = PatternExpr::and(expr, PatternExpr::gt(l, r));
        }
        expr
    }

    fn empty_portfolio() -> Arc<Portfolio> {
        let mut p = Portfolio::new("Test");
        p.add_security(Arc::new(Security::equity(
            "QQQ",
            "QQQ",
            Arc::new(OhlcSeries::new(TimeFrame::Daily)),
        )))
        .unwrap();
        Arc::new(p)
    }

    fn context(name: &str, pattern: PricePattern) -> StrategyContext {
        StrategyContext {
            strategy: Arc::new(PatternStrategy::new(
                name,
                Arc::new(pattern),
                empty_portfolio(),
            )),
            baseline_stat: dec!(1),
            num_trades: 5,
        }
    }

    /// Momentum pullback (long): strong uptrend with a short-term dip.
    fn long_momentum(name: &str) -> StrategyContext {
        context(
            name,
            PricePattern::new(
                name,
                chain(vec![
                    (reference(Close, 0), reference(Open, 0)),
                    (reference(Open, 0), reference(Close, 2)),
                    (reference(Close, 2), reference(Open, 3)),
                    (reference(Open, 3), reference(Open, 2)),
                    (reference(Open, 2), reference(Close, 3)),
                ]),
                TradeDirection::Long,
                Some(PercentNumber::from_str("1.2").unwrap()),
                Some(PercentNumber::from_str("1.2").unwrap()),
            ),
        )
    }

    /// Momentum pullback (short): downtrend with a short-term rally.
    fn short_momentum(name: &str) -> StrategyContext {
        context(
            name,
            PricePattern::new(
                name,
                chain(vec![
                    (reference(High, 1), reference(Close, 0)),
                    (reference(High, 2), reference(Close, 1)),
                    (reference(Close, 0), reference(Open, 2)),
                ]),
                TradeDirection::Short,
                Some(PercentNumber::from_str("1.2").unwrap()),
                Some(PercentNumber::from_str("1.2").unwrap()),
            ),
        )
    }

    /// Trend continuation (long): stacked closes with a generous payoff.
    fn long_trend(name: &str) -> StrategyContext {
        context(
            name,
            PricePattern::new(
                name,
                chain(vec![
                    (reference(Close, 0), reference(Close, 1)),
                    (reference(Close, 1), reference(Close, 2)),
                ]),
                TradeDirection::Long,
                Some(PercentNumber::from_str("4.0").unwrap()),
                Some(PercentNumber::from_str("2.0").unwrap()),
            ),
        )
    }

    fn six_strategy_container() -> StrategyDataContainer {
        vec![
            long_momentum("lm1"),
            long_momentum("lm2"),
            long_momentum("lm3"),
            short_momentum("sm1"),
            short_momentum("sm2"),
            long_trend("lt1"),
        ]
    }

    #[test]
    fn category_partition_produces_three_families() {
        let partitioner = StrategyFamilyPartitioner::new(
            six_strategy_container(),
            PartitionGranularity::DirectionAndCategory,
        );
        assert_eq!(partitioner.num_families(), 3);
        assert_eq!(partitioner.total_strategy_count(), 6);

        let long_momentum_key = StrategyFamilyKey {
            direction: TradeDirection::Long,
            category: Some(StrategyCategory::Momentum),
            sub_type: None,
        };
        let short_momentum_key = StrategyFamilyKey {
            direction: TradeDirection::Short,
            category: Some(StrategyCategory::Momentum),
            sub_type: None,
        };
        let long_trend_key = StrategyFamilyKey {
            direction: TradeDirection::Long,
            category: Some(StrategyCategory::TrendFollowing),
            sub_type: None,
        };
        assert_eq!(partitioner.family_count(&long_momentum_key), 3);
        assert_eq!(partitioner.family_count(&short_momentum_key), 2);
        assert_eq!(partitioner.family_count(&long_trend_key), 1);

        // the families sum back to the whole catalog
        let sum: usize = partitioner.iter().map(|(_, members)| members.len()).sum();
        assert_eq!(sum, 6);
    }

    #[test]
    fn direction_only_partition_gives_two_families() {
        let partitioner = StrategyFamilyPartitioner::new(
            six_strategy_container(),
            PartitionGranularity::DirectionOnly,
        );
        assert_eq!(partitioner.num_families(), 2);
        let long_key = StrategyFamilyKey {
            direction: TradeDirection::Long,
            category: None,
            sub_type: None,
        };
        assert_eq!(partitioner.family_count(&long_key), 4);
    }

    #[test]
    fn sub_type_partition_separates_pullback_from_continuation() {
        let partitioner = StrategyFamilyPartitioner::new(
            six_strategy_container(),
            PartitionGranularity::DirectionCategoryAndSubType,
        );
        let pullback_key = StrategyFamilyKey {
            direction: TradeDirection::Long,
            category: Some(StrategyCategory::Momentum),
            sub_type: Some(StrategySubType::Pullback),
        };
        assert_eq!(partitioner.family_count(&pullback_key), 3);
        assert_eq!(partitioner.num_families(), 3);
    }

    #[test]
    fn statistics_report_percentages() {
        let partitioner = StrategyFamilyPartitioner::new(
            six_strategy_container(),
            PartitionGranularity::DirectionAndCategory,
        );
        let stats = partitioner.statistics();
        assert_eq!(stats.len(), 3);
        let total: f64 = stats.iter().map(|s| s.percentage_of_total).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn auto_granularity_scales_with_catalog_size() {
        assert_eq!(
            PartitionGranularity::auto(10),
            PartitionGranularity::DirectionOnly
        );
        assert_eq!(
            PartitionGranularity::auto(200),
            PartitionGranularity::DirectionAndCategory
        );
        assert_eq!(
            PartitionGranularity::auto(2000),
            PartitionGranularity::DirectionCategoryAndSubType
        );
    }

    #[test]
    fn family_key_display_is_readable() {
        let key = StrategyFamilyKey {
            direction: TradeDirection::Long,
            category: Some(StrategyCategory::Momentum),
            sub_type: Some(StrategySubType::Pullback),
        };
        assert_eq!(key.to_string(), "Long - Momentum - Pullback");
    }
}
