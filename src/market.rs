use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::MarketError;
use crate::logger::{LogEvent, Logger};
use crate::logln;

/// Surcharge per hop added to the unit price of every purchase
pub const TRANSMISSION_COST_PER_HOP: f64 = 0.02;

/// Remaining capacity at or below this value is treated as no capacity at all
pub const DEGENERATE_CAPACITY: f64 = 1.0e-3;

/// Immutable description of one market instance
///
/// Sellers are indexed `0..nr_sellers`; the grid is the extra seller at index `nr_sellers`,
/// so every per-seller vector and every hop row has `nr_sellers + 1` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketModel {
    pub nr_buyers: usize,
    pub nr_sellers: usize,
    pub seller_capacity: Vec<f64>,
    pub seller_price: Vec<f64>,
    pub buyer_demand: Vec<f64>,
    /// Row per buyer, column per seller (grid last)
    pub hop_distance: Vec<Vec<f64>>,
    #[serde(default = "default_transmission_cost")]
    pub transmission_cost_per_hop: f64,
}

fn default_transmission_cost() -> f64 {
    TRANSMISSION_COST_PER_HOP
}

impl MarketModel {
    /// Build a market and check it before any optimizer sees it
    pub fn new(
        seller_capacity: Vec<f64>,
        seller_price: Vec<f64>,
        buyer_demand: Vec<f64>,
        hop_distance: Vec<Vec<f64>>,
    ) -> Result<Self, MarketError> {
        let nr_sellers = seller_capacity.len().saturating_sub(1);
        let market = Self {
            nr_buyers: buyer_demand.len(),
            nr_sellers,
            seller_capacity,
            seller_price,
            buyer_demand,
            hop_distance,
            transmission_cost_per_hop: TRANSMISSION_COST_PER_HOP,
        };
        market.validate()?;
        Ok(market)
    }

    /// Load a market from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self, MarketError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MarketError::invalid(format!("cannot read {}: {}", path.display(), e)))?;
        let market: MarketModel = serde_json::from_str(&text)
            .map_err(|e| MarketError::invalid(format!("cannot parse {}: {}", path.display(), e)))?;
        market.validate()?;
        Ok(market)
    }

    /// Number of seller columns, grid included
    pub fn nr_columns(&self) -> usize {
        self.nr_sellers + 1
    }

    /// Column index of the grid seller
    pub fn grid_index(&self) -> usize {
        self.nr_sellers
    }

    pub fn total_demand(&self) -> f64 {
        self.buyer_demand.iter().sum()
    }

    /// Dump the market to the game log, one line per seller and buyer
    pub fn printout(&self, logger: &mut Logger) {
        for seller in 0..self.nr_columns() {
            let name = if seller == self.grid_index() { "grid".to_string() } else { format!("seller {}", seller) };
            logln!(
                logger,
                LogEvent::Game,
                "{:>10}: price {:.4}, capacity {:.1}",
                name,
                self.seller_price[seller],
                self.seller_capacity[seller]
            );
        }
        for buyer in 0..self.nr_buyers {
            logln!(
                logger,
                LogEvent::Game,
                "{:>10}: demand {:.1}, hops {:?}",
                format!("buyer {}", buyer),
                self.buyer_demand[buyer],
                self.hop_distance[buyer]
            );
        }
    }

    /// Reject malformed markets: wrong shapes, negative or non-finite quantities,
    /// and a grid too small to cover total demand on its own
    pub fn validate(&self) -> Result<(), MarketError> {
        let columns = self.nr_columns();
        if self.nr_buyers == 0 {
            return Err(MarketError::invalid("market has no buyers"));
        }
        if self.buyer_demand.len() != self.nr_buyers {
            return Err(MarketError::invalid(format!(
                "buyer_demand has {} entries, expected {}",
                self.buyer_demand.len(),
                self.nr_buyers
            )));
        }
        check_len("seller_capacity", &self.seller_capacity, columns)?;
        check_len("seller_price", &self.seller_price, columns)?;
        if self.hop_distance.len() != self.nr_buyers {
            return Err(MarketError::invalid(format!(
                "hop_distance has {} rows, expected {}",
                self.hop_distance.len(),
                self.nr_buyers
            )));
        }
        for (buyer, row) in self.hop_distance.iter().enumerate() {
            check_len(&format!("hop_distance[{}]", buyer), row, columns)?;
            check_non_negative(&format!("hop_distance[{}]", buyer), row)?;
        }
        check_non_negative("buyer_demand", &self.buyer_demand)?;
        check_non_negative("seller_price", &self.seller_price)?;
        check_positive("seller_capacity", &self.seller_capacity)?;
        if !self.transmission_cost_per_hop.is_finite() || self.transmission_cost_per_hop < 0.0 {
            return Err(MarketError::invalid(format!(
                "transmission_cost_per_hop must be a non-negative number, got {}",
                self.transmission_cost_per_hop
            )));
        }

        let grid_capacity = self.seller_capacity[self.grid_index()];
        let total_demand = self.total_demand();
        if grid_capacity < total_demand {
            return Err(MarketError::invalid(format!(
                "grid capacity {} does not cover total demand {}",
                grid_capacity, total_demand
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_len(name: &str, values: &[f64], expected: usize) -> Result<(), MarketError> {
    if values.len() != expected {
        return Err(MarketError::invalid(format!(
            "{} has {} entries, expected {}",
            name,
            values.len(),
            expected
        )));
    }
    Ok(())
}

pub(crate) fn check_non_negative(name: &str, values: &[f64]) -> Result<(), MarketError> {
    if let Some((index, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite() || **v < 0.0) {
        return Err(MarketError::invalid(format!(
            "{}[{}] must be a non-negative number, got {}",
            name, index, value
        )));
    }
    Ok(())
}

pub(crate) fn check_positive(name: &str, values: &[f64]) -> Result<(), MarketError> {
    if let Some((index, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite() || **v <= 0.0) {
        return Err(MarketError::invalid(format!(
            "{}[{}] must be a positive number, got {}",
            name, index, value
        )));
    }
    Ok(())
}
