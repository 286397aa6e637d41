use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ast::{PriceField, PricePattern};

/// Primary classification of a trading pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrategyCategory {
    TrendFollowing,
    Momentum,
    MeanReversion,
    Unclassified,
    /// A catalog entry with no pattern to analyze.
    Error,
}

impl std::fmt::Display for StrategyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyCategory::TrendFollowing => "Trend-Following",
            StrategyCategory::Momentum => "Momentum",
            StrategyCategory::MeanReversion => "Mean-Reversion",
            StrategyCategory::Unclassified => "Unclassified",
            StrategyCategory::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// Finer-grained style within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrategySubType {
    Continuation,
    Breakout,
    Pullback,
    TrendExhaustion,
    Ambiguous,
    None,
}

impl std::fmt::Display for StrategySubType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategySubType::Continuation => "Continuation",
            StrategySubType::Breakout => "Breakout",
            StrategySubType::Pullback => "Pullback",
            StrategySubType::TrendExhaustion => "Trend Exhaustion / Fade",
            StrategySubType::Ambiguous => "Ambiguous",
            StrategySubType::None => "None",
        };
        write!(f, "{s}")
    }
}

/// Result of classifying one pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: StrategyCategory,
    pub sub_type: StrategySubType,
    pub rationale: String,
}

/// Heuristic classifier over the pattern's comparison structure.
///
/// Each greater-than comparison contributes bullish or bearish context from
/// its bar offsets; payoff ratio, pullback/breakout signatures and trend
/// alignment then accumulate scores per category, and the winner maps to a
/// sub-type.
pub struct PatternClassifier;

impl PatternClassifier {
    /// Classify a possibly-absent catalog entry. A missing pattern yields
    /// the `Error` category; a missing expression cannot occur, since
    /// [`crate::PatternExpr`] always carries at least one comparison.
    pub fn classify_optional(pattern: Option<&PricePattern>) -> Classification {
        match pattern {
            Some(pattern) => Self::classify(pattern),
            None => Classification {
                category: StrategyCategory::Error,
                sub_type: StrategySubType::None,
                rationale: "- no pattern supplied".to_string(),
            },
        }
    }

    pub fn classify(pattern: &PricePattern) -> Classification {
        let conditions = pattern.expression().comparisons();

        let mut trend_score = 0i32;
        let mut momentum_score = 0i32;
        let mut reversion_score = 0i32;
        let mut rationale: Vec<String> = Vec::new();
        let mut is_breakout = false;
        let mut is_pullback = false;

        let mut bullish = 0i32;
        let mut bearish = 0i32;
        let mut has_short_term_dip = false;
        let mut has_short_term_rally = false;

        for (lhs, rhs) in &conditions {
            let same_bar_close_over_open = lhs.offset == 0
                && rhs.offset == 0
                && lhs.field == PriceField::Close
                && rhs.field == PriceField::Open;
            if lhs.offset < rhs.offset || same_bar_close_over_open {
                bullish += 1;
                if lhs.offset.abs_diff(rhs.offset) <= 2 {
                    has_short_term_rally = true;
                }
            } else if lhs.offset > rhs.offset {
                bearish += 1;
                if lhs.offset.abs_diff(rhs.offset) <= 2 {
                    has_short_term_dip = true;
                }
            }
        }

        let net = bullish - bearish;
        let payoff = pattern.payoff_ratio().unwrap_or(Decimal::ZERO);

        // Payoff ratio is a strong prior on the style of the exit.
        if payoff > Decimal::ZERO {
            if payoff < Decimal::ONE {
                reversion_score += 2;
                rationale.push("payoff ratio below 1.0".to_string());
            } else if payoff > Decimal::new(15, 1) {
                momentum_score += 1;
                trend_score += 1;
            }
        }

        // Specific signatures: a dip bought in an uptrend or a rally sold in
        // a downtrend is a pullback entry.
        if pattern.is_long() && net > 1 && has_short_term_dip {
            is_pullback = true;
            momentum_score += 5;
            rationale.push("pullback within a strong uptrend".to_string());
        } else if pattern.is_short() && net <= -1 && has_short_term_rally {
            is_pullback = true;
            momentum_score += 5;
            rationale.push("pullback within a strong downtrend".to_string());
        } else if net == 0 {
            if pattern.is_long() && has_short_term_dip {
                is_pullback = true;
                momentum_score += 3;
                rationale.push("dip-buy in a balanced context".to_string());
            } else if pattern.is_short() && has_short_term_rally {
                is_pullback = true;
                momentum_score += 3;
                rationale.push("rally-sell in a balanced context".to_string());
            }
        }

        // Close above a multi-bar-old high is a breakout signature.
        for (lhs, rhs) in &conditions {
            if lhs.offset == 0
                && rhs.offset > 1
                && lhs.field == PriceField::Close
                && rhs.field == PriceField::High
            {
                is_breakout = true;
                if pattern.is_long() {
                    momentum_score += 4;
                } else {
                    reversion_score += 3;
                }
            }
        }

        if (net > 1 || net < -1) && payoff < Decimal::ONE {
            reversion_score += 4;
            rationale.push("strong trend context with low payoff suggests exhaustion".to_string());
        }

        // Fall back to trend alignment when no pullback signature fired.
        if !is_pullback {
            if net > 0 {
                if pattern.is_long() {
                    trend_score += 3;
                } else {
                    reversion_score += 3;
                }
            } else if net < 0 {
                if pattern.is_short() {
                    trend_score += 3;
                } else {
                    reversion_score += 3;
                }
            }
        }

        let total = trend_score + momentum_score + reversion_score;
        if total == 0 {
            return Classification {
                category: StrategyCategory::Unclassified,
                sub_type: StrategySubType::Ambiguous,
                rationale: Self::join_rationale(&rationale),
            };
        }

        // First maximum wins, in trend/momentum/reversion order.
        let scored = [
            (StrategyCategory::TrendFollowing, trend_score),
            (StrategyCategory::Momentum, momentum_score),
            (StrategyCategory::MeanReversion, reversion_score),
        ];
        let mut best = scored[0];
        for candidate in &scored[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        let category = best.0;

        let sub_type = if is_pullback && category == StrategyCategory::Momentum {
            StrategySubType::Pullback
        } else if is_breakout && category == StrategyCategory::Momentum {
            StrategySubType::Breakout
        } else {
            match category {
                StrategyCategory::TrendFollowing | StrategyCategory::Momentum => {
                    StrategySubType::Continuation
                }
                StrategyCategory::MeanReversion => StrategySubType::TrendExhaustion,
                _ => StrategySubType::None,
            }
        };

        Classification {
            category,
            sub_type,
            rationale: Self::join_rationale(&rationale),
        }
    }

    fn join_rationale(points: &[String]) -> String {
        points
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
