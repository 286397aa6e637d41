use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use trading_core::{Result, TradingError};

use crate::position::TradingPosition;

fn hundred() -> Decimal {
    Decimal::ONE_HUNDRED
}

/// Append-only history of closed positions with summary statistics.
///
/// All percent statistics are in whole-percent terms; returns are signed by
/// trade direction.
#[derive(Debug, Clone, Default)]
pub struct ClosedPositionHistory {
    positions: Vec<TradingPosition>,
}

impl ClosedPositionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_closed_position(&mut self, position: TradingPosition) -> Result<()> {
        if position.is_open() {
            return Err(TradingError::PositionStateViolation(format!(
                "position {} is still open",
                position.id()
            )));
        }
        self.positions.push(position);
        Ok(())
    }

    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[TradingPosition] {
        &self.positions
    }

    fn returns(&self) -> Vec<Decimal> {
        self.positions
            .iter()
            .map(|p| p.percent_return().expect("closed position"))
            .collect()
    }

    fn winning_returns(&self) -> Vec<Decimal> {
        self.returns().into_iter().filter(|r| *r > Decimal::ZERO).collect()
    }

    fn losing_returns(&self) -> Vec<Decimal> {
        self.returns().into_iter().filter(|r| *r < Decimal::ZERO).collect()
    }

    pub fn num_winning_positions(&self) -> usize {
        self.winning_returns().len()
    }

    pub fn num_losing_positions(&self) -> usize {
        self.losing_returns().len()
    }

    pub fn percent_winners(&self) -> Decimal {
        if self.positions.is_empty() {
            return Decimal::ZERO;
        }
        Decimal::from(self.num_winning_positions()) / Decimal::from(self.positions.len())
            * hundred()
    }

    pub fn percent_losers(&self) -> Decimal {
        if self.positions.is_empty() {
            return Decimal::ZERO;
        }
        hundred() - self.percent_winners()
    }

    /// Gross winning percent over gross losing percent, capped at 100 when
    /// the history has no losers.
    pub fn profit_factor(&self) -> Decimal {
        let wins: Decimal = self.winning_returns().iter().sum();
        let losses: Decimal = self.losing_returns().iter().map(|l| l.abs()).sum();
        if losses.is_zero() {
            if wins > Decimal::ZERO {
                hundred()
            } else {
                Decimal::ZERO
            }
        } else {
            wins / losses
        }
    }

    /// Average win over average loss.
    pub fn payoff_ratio(&self) -> Decimal {
        let wins = self.winning_returns();
        let losses = self.losing_returns();
        if wins.is_empty() || losses.is_empty() {
            return Decimal::ZERO;
        }
        let avg_win: Decimal = wins.iter().sum::<Decimal>() / Decimal::from(wins.len());
        let avg_loss: Decimal =
            losses.iter().map(|l| l.abs()).sum::<Decimal>() / Decimal::from(losses.len());
        if avg_loss.is_zero() {
            Decimal::ZERO
        } else {
            avg_win / avg_loss
        }
    }

    /// Median win over median loss.
    pub fn median_payoff_ratio(&self) -> Decimal {
        let mut wins = self.winning_returns();
        let mut losses: Vec<Decimal> = self.losing_returns().iter().map(|l| l.abs()).collect();
        if wins.is_empty() || losses.is_empty() {
            return Decimal::ZERO;
        }
        let median_win = Self::median(&mut wins);
        let median_loss = Self::median(&mut losses);
        if median_loss.is_zero() {
            Decimal::ZERO
        } else {
            median_win / median_loss
        }
    }

    /// Geometric-mean win over geometric-mean loss.
    pub fn geometric_payoff_ratio(&self) -> Decimal {
        let wins = self.winning_returns();
        let losses: Vec<Decimal> = self.losing_returns().iter().map(|l| l.abs()).collect();
        if wins.is_empty() || losses.is_empty() {
            return Decimal::ZERO;
        }
        let geo_win = Self::geometric_mean(&wins);
        let geo_loss = Self::geometric_mean(&losses);
        if geo_loss == 0.0 {
            Decimal::ZERO
        } else {
            Decimal::from_f64(geo_win / geo_loss).unwrap_or(Decimal::ZERO)
        }
    }

    /// PAL profitability: `100 * PF / (PF + payoff ratio)`.
    pub fn pal_profitability(&self) -> Decimal {
        self.profitability_for(self.payoff_ratio())
    }

    pub fn median_pal_profitability(&self) -> Decimal {
        self.profitability_for(self.median_payoff_ratio())
    }

    pub fn geometric_pal_profitability(&self) -> Decimal {
        self.profitability_for(self.geometric_payoff_ratio())
    }

    fn profitability_for(&self, payoff_ratio: Decimal) -> Decimal {
        if self.num_losing_positions() == 0 {
            return if self.num_winning_positions() > 0 {
                hundred()
            } else {
                Decimal::ZERO
            };
        }
        if self.num_winning_positions() == 0 {
            return Decimal::ZERO;
        }
        let pf = self.profit_factor();
        if (pf + payoff_ratio).is_zero() {
            Decimal::ZERO
        } else {
            hundred() * pf / (pf + payoff_ratio)
        }
    }

    /// Compounded return across the trade sequence: `Π(1 + r) − 1`.
    pub fn cumulative_return(&self) -> Decimal {
        let mut cumulative = Decimal::ONE;
        for position in &self.positions {
            cumulative *= position
                .trade_return_multiplier()
                .expect("closed position");
        }
        cumulative - Decimal::ONE
    }

    /// Bars held, per position, in entry order.
    pub fn bars_per_position(&self) -> Vec<usize> {
        self.positions
            .iter()
            .map(|p| p.num_bars_in_position())
            .collect()
    }

    fn median(values: &mut [Decimal]) -> Decimal {
        values.sort_unstable();
        let n = values.len();
        if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / Decimal::TWO
        }
    }

    fn geometric_mean(values: &[Decimal]) -> f64 {
        let log_sum: f64 = values
            .iter()
            .map(|v| v.to_f64().unwrap_or(f64::MIN_POSITIVE).max(f64::MIN_POSITIVE).ln())
            .sum();
        (log_sum / values.len() as f64).exp()
    }
}
