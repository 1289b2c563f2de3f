use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::MarketError;
use crate::minimizer::SolverConfig;

/// Heuristic that ends a game early when buyers look like they are cycling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStop {
    /// Stop when exactly two buyers were not adjusting in this and the previous round
    #[default]
    StablePair,
    /// Stop when exactly two buyers were still adjusting in this and the previous round
    AdjustingPair,
    /// Only the iteration cap and a round without adjustments end the game
    Disabled,
}

impl fmt::Display for EarlyStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EarlyStop::StablePair => "stable-pair",
            EarlyStop::AdjustingPair => "adjusting-pair",
            EarlyStop::Disabled => "disabled",
        };
        write!(f, "{}", name)
    }
}

/// Knobs of the decentralized game
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Cap on best-response rounds
    pub max_iterations: usize,
    /// A buyer whose new row is within this absolute distance of the old one keeps the old row
    pub closeness_tolerance: f64,
    pub early_stop: EarlyStop,
    pub solver: SolverConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            closeness_tolerance: 0.5,
            early_stop: EarlyStop::default(),
            solver: SolverConfig::default(),
        }
    }
}

/// Parameters of a randomly generated market
///
/// Integer quantities are drawn from half-open ranges `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    pub nr_users: usize,
    /// Share of users that become sellers (rounded down)
    pub sellers_percentage: f64,
    pub supply_low: u32,
    pub supply_high: u32,
    pub demand_low: u32,
    pub demand_high: u32,
    pub price_low: f64,
    pub price_high: f64,
    pub grid_price: f64,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            nr_users: 10,
            sellers_percentage: 0.3,
            supply_low: 10,
            supply_high: 100,
            demand_low: 10,
            demand_high: 50,
            price_low: 0.05,
            price_high: 0.09,
            grid_price: 0.14,
        }
    }
}

impl MarketParams {
    pub fn nr_sellers(&self) -> usize {
        (self.nr_users as f64 * self.sellers_percentage).floor() as usize
    }

    pub fn nr_buyers(&self) -> usize {
        self.nr_users - self.nr_sellers()
    }

    /// Reject parameter sets the generator cannot draw from
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(0.0..1.0).contains(&self.sellers_percentage) {
            return Err(MarketError::invalid(format!(
                "sellers_percentage must be in [0, 1), got {}",
                self.sellers_percentage
            )));
        }
        if self.nr_buyers() == 0 {
            return Err(MarketError::invalid(format!("{} users leave no buyers", self.nr_users)));
        }
        if self.supply_low == 0 || self.supply_low >= self.supply_high {
            return Err(MarketError::invalid(format!(
                "supply range [{}, {}) must be non-empty and start above 0",
                self.supply_low, self.supply_high
            )));
        }
        if self.demand_low >= self.demand_high {
            return Err(MarketError::invalid(format!(
                "demand range [{}, {}) is empty",
                self.demand_low, self.demand_high
            )));
        }
        if !(self.price_low.is_finite() && self.price_high.is_finite()) || self.price_low < 0.0 || self.price_low >= self.price_high {
            return Err(MarketError::invalid(format!(
                "price range [{}, {}) must be non-empty and non-negative",
                self.price_low, self.price_high
            )));
        }
        if !self.grid_price.is_finite() || self.grid_price < 0.0 {
            return Err(MarketError::invalid(format!("grid_price must be non-negative, got {}", self.grid_price)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let game = GameConfig::default();
        assert_eq!(game.max_iterations, 50);
        assert_eq!(game.closeness_tolerance, 0.5);
        assert_eq!(game.early_stop, EarlyStop::StablePair);
        assert_eq!(game.solver.max_iterations, 200);

        let params = MarketParams::default();
        assert_eq!(params.nr_sellers(), 3);
        assert_eq!(params.nr_buyers(), 7);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_ranges() {
        let params = MarketParams { demand_low: 50, demand_high: 50, ..MarketParams::default() };
        assert!(matches!(params.validate(), Err(MarketError::InvalidInput(msg)) if msg.contains("demand")));

        let params = MarketParams { nr_users: 1, sellers_percentage: 0.0, supply_low: 0, ..MarketParams::default() };
        assert!(matches!(params.validate(), Err(MarketError::InvalidInput(msg)) if msg.contains("supply")));
    }

    #[test]
    fn test_validate_requires_a_buyer() {
        let params = MarketParams { nr_users: 2, sellers_percentage: 0.99, ..MarketParams::default() };
        // floor(2 * 0.99) = 1 seller, 1 buyer: fine
        assert!(params.validate().is_ok());
        let params = MarketParams { nr_users: 0, ..MarketParams::default() };
        assert!(matches!(params.validate(), Err(MarketError::InvalidInput(msg)) if msg.contains("no buyers")));
    }

    #[test]
    fn test_early_stop_serializes_snake_case() {
        let json = serde_json::to_string(&EarlyStop::AdjustingPair).unwrap();
        assert_eq!(json, "\"adjusting_pair\"");
        assert_eq!(EarlyStop::AdjustingPair.to_string(), "adjusting-pair");
    }
}
