use serde::{Deserialize, Serialize};
use crate::allocation::AllocationMatrix;
use crate::market::MarketModel;

/// Unit price of a seller under load: price grows linearly with the used fraction of capacity
/// Not capped; only the optimizers' bounds keep load below capacity
pub fn unit_price(price: f64, capacity: f64, load: f64) -> f64 {
    price * (1.0 + load / capacity)
}

/// Price and capacity columns of a set of sellers plus the per-hop surcharge
#[derive(Debug, Clone, Copy)]
pub struct SellerPricing<'a> {
    pub price: &'a [f64],
    pub capacity: &'a [f64],
    pub transmission_cost_per_hop: f64,
}

impl<'a> SellerPricing<'a> {
    pub fn from_market(market: &'a MarketModel) -> Self {
        Self {
            price: &market.seller_price,
            capacity: &market.seller_capacity,
            transmission_cost_per_hop: market.transmission_cost_per_hop,
        }
    }

    /// Delivered cost of one unit from every seller, for fixed aggregate loads
    pub fn delivered_unit_costs(&self, loads: &[f64], hops: &[f64]) -> Vec<f64> {
        self.price
            .iter()
            .zip(self.capacity)
            .zip(loads)
            .zip(hops)
            .map(|(((&price, &capacity), &load), &hop)| {
                unit_price(price, capacity, load) + self.transmission_cost_per_hop * hop
            })
            .collect()
    }

    /// Cost of `row` when the sellers already carry `loads` (which include `row`)
    pub fn cost(&self, loads: &[f64], hops: &[f64], row: &[f64]) -> f64 {
        self.delivered_unit_costs(loads, hops)
            .iter()
            .zip(row)
            .map(|(unit, amount)| unit * amount)
            .sum()
    }

    /// Cost of `row` when it is priced against its own load on top of `other_loads`
    /// This is the objective of a buyer's best response: quadratic in `row`
    pub fn best_response_cost(&self, other_loads: &[f64], hops: &[f64], row: &[f64]) -> f64 {
        let loads: Vec<f64> = other_loads.iter().zip(row).map(|(other, own)| other + own).collect();
        self.cost(&loads, hops, row)
    }
}

/// System cost and its split across buyers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub system_cost: f64,
    pub individual_costs: Vec<f64>,
}

/// Price every buyer's row against the aggregate load of the whole allocation
pub fn evaluate(market: &MarketModel, allocation: &AllocationMatrix) -> CostBreakdown {
    let pricing = SellerPricing::from_market(market);
    let loads = allocation.loads();
    let individual_costs: Vec<f64> = (0..market.nr_buyers)
        .map(|buyer| pricing.cost(&loads, &market.hop_distance[buyer], allocation.row(buyer)))
        .collect();
    CostBreakdown {
        system_cost: individual_costs.iter().sum(),
        individual_costs,
    }
}

/// Costs of the starting point where every buyer buys its whole demand from the grid
///
/// The grid load is total demand, so each buyer pays the same unit cost plus its own
/// transmission surcharge.
pub fn all_on_grid(market: &MarketModel) -> CostBreakdown {
    let grid = market.grid_index();
    let grid_unit_price = unit_price(
        market.seller_price[grid],
        market.seller_capacity[grid],
        market.total_demand(),
    );
    let individual_costs: Vec<f64> = market
        .buyer_demand
        .iter()
        .zip(&market.hop_distance)
        .map(|(demand, hops)| (grid_unit_price + market.transmission_cost_per_hop * hops[grid]) * demand)
        .collect();
    CostBreakdown {
        system_cost: individual_costs.iter().sum(),
        individual_costs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::small_market;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_price_grows_with_load() {
        assert_relative_eq!(unit_price(0.05, 100.0, 0.0), 0.05, epsilon = 1e-12);
        assert_relative_eq!(unit_price(0.05, 100.0, 50.0), 0.075, epsilon = 1e-12);
        // Over-subscription is not capped
        assert_relative_eq!(unit_price(0.05, 100.0, 200.0), 0.15, epsilon = 1e-12);
    }

    #[test]
    fn test_best_response_cost_includes_own_load() {
        let price = [0.05, 0.14];
        let capacity = [100.0, 1000.0];
        let pricing = SellerPricing { price: &price, capacity: &capacity, transmission_cost_per_hop: 0.02 };
        let hops = [1.0, 1.0];
        let row = [50.0, 0.0];

        // 0.05 * (1 + 50/100) + 0.02 = 0.095 per unit
        assert_relative_eq!(pricing.best_response_cost(&[0.0, 0.0], &hops, &row), 4.75, epsilon = 1e-12);
        // Priced against a load that already contains the row gives the same number
        assert_relative_eq!(pricing.cost(&[50.0, 0.0], &hops, &row), 4.75, epsilon = 1e-12);
        // Another buyer's 30 units push the unit price up
        assert_relative_eq!(pricing.best_response_cost(&[30.0, 0.0], &hops, &row), 50.0 * (0.05 * 1.8 + 0.02), epsilon = 1e-12);
    }

    #[test]
    fn test_all_on_grid_matches_evaluate() {
        let market = small_market();
        let mut allocation = AllocationMatrix::zeros(market.nr_buyers, market.nr_columns());
        for buyer in 0..market.nr_buyers {
            allocation.set(buyer, market.grid_index(), market.buyer_demand[buyer]);
        }

        let analytic = all_on_grid(&market);
        let evaluated = evaluate(&market, &allocation);

        assert_relative_eq!(analytic.system_cost, evaluated.system_cost, epsilon = 1e-12);
        for (a, b) in analytic.individual_costs.iter().zip(&evaluated.individual_costs) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_relative_eq!(
            evaluated.system_cost,
            evaluated.individual_costs.iter().sum::<f64>(),
            epsilon = 1e-12
        );
    }
}
