use crate::cost::SellerPricing;
use crate::error::{MarketError, MinimizerError};
use crate::market::{check_len, check_non_negative, check_positive, DEGENERATE_CAPACITY, TRANSMISSION_COST_PER_HOP};
use crate::minimizer::{ConstrainedMinimizer, LinearConstraint, MinimizerOutcome, QuadraticProgram, SolverConfig};
use crate::utils::{round_to, SOLUTION_DECIMALS};

/// One buyer's cost minimization with every other buyer's purchases held fixed
///
/// ```text
/// minimize    sum_s [ p_s (1 + (u_s + x_s) / c_s) + t h_s ] x_s
/// subject to  sum_s x_s = d
///             0 <= x_s <= c_s - u_s     (0 <= x_s <= 0 when the slack is degenerate)
/// ```
///
/// where `u_s` is the load the other buyers put on seller `s`.
#[derive(Debug, Clone, Copy)]
pub struct BestResponseProblem<'a> {
    pub demand: f64,
    pub pricing: SellerPricing<'a>,
    pub other_loads: &'a [f64],
    pub hops: &'a [f64],
}

impl<'a> BestResponseProblem<'a> {
    /// Capacity left on each seller once the other buyers are served
    pub fn remaining_capacity(&self) -> Vec<f64> {
        self.pricing
            .capacity
            .iter()
            .zip(self.other_loads)
            .map(|(capacity, used)| capacity - used)
            .collect()
    }

    /// Upper bound of each variable; sellers with (almost) nothing left are pinned to zero
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.remaining_capacity()
            .into_iter()
            .map(|remaining| if remaining > DEGENERATE_CAPACITY { remaining } else { 0.0 })
            .collect()
    }

    /// Cost of a candidate row priced against its own load
    pub fn cost(&self, row: &[f64]) -> f64 {
        self.pricing.best_response_cost(self.other_loads, self.hops, row)
    }

    /// The separable quadratic program behind `cost`
    ///
    /// Expanding `p (1 + (u + x) / c) x` gives `(p / c) x^2 + p (1 + u / c) x`, so the
    /// diagonal of P holds `2 p / c`.
    pub fn to_program(&self) -> QuadraticProgram {
        let columns = self.pricing.price.len();
        let mut quadratic = Vec::with_capacity(columns);
        let mut linear = Vec::with_capacity(columns);
        for s in 0..columns {
            let price = self.pricing.price[s];
            let capacity = self.pricing.capacity[s];
            quadratic.push((s, s, 2.0 * price / capacity));
            linear.push(
                price * (1.0 + self.other_loads[s] / capacity)
                    + self.pricing.transmission_cost_per_hop * self.hops[s],
            );
        }
        QuadraticProgram {
            quadratic,
            linear,
            constraints: vec![LinearConstraint::sum_equals(0..columns, self.demand)],
            lower: vec![0.0; columns],
            upper: self.upper_bounds(),
        }
    }

    /// Solve from an all-zero starting point
    pub fn solve(&self, minimizer: &dyn ConstrainedMinimizer, config: &SolverConfig) -> Result<MinimizerOutcome, MinimizerError> {
        let program = self.to_program();
        let initial_guess = vec![0.0; program.nr_variables()];
        minimizer.minimize(&program, &initial_guess, config)
    }
}

/// Inputs of a stand-alone best response, as handed over by an external caller
///
/// All sequences have one entry per seller; a grid is only present if the caller lists it.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleBuyerInput<'a> {
    pub nr_sellers: usize,
    pub buyer_demand: f64,
    pub sellers_price: &'a [f64],
    pub sellers_capacity: &'a [f64],
    pub used_capacities: &'a [f64],
    pub hop_distances: &'a [f64],
}

impl<'a> SingleBuyerInput<'a> {
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.nr_sellers == 0 {
            return Err(MarketError::invalid("nr_sellers must be at least 1"));
        }
        if !self.buyer_demand.is_finite() || self.buyer_demand < 0.0 {
            return Err(MarketError::invalid(format!(
                "buyer_demand must be a non-negative number, got {}",
                self.buyer_demand
            )));
        }
        check_len("sellers_price", self.sellers_price, self.nr_sellers)?;
        check_len("sellers_capacity", self.sellers_capacity, self.nr_sellers)?;
        check_len("used_capacities", self.used_capacities, self.nr_sellers)?;
        check_len("hop_distances", self.hop_distances, self.nr_sellers)?;
        check_non_negative("sellers_price", self.sellers_price)?;
        check_positive("sellers_capacity", self.sellers_capacity)?;
        check_non_negative("used_capacities", self.used_capacities)?;
        check_non_negative("hop_distances", self.hop_distances)?;
        Ok(())
    }
}

/// Stand-alone best response: validated, solved, and rounded for the caller
///
/// Unlike inside the game, a solve that does not reach the solver's success criterion is fatal.
pub fn solve_single_buyer(
    input: &SingleBuyerInput<'_>,
    minimizer: &dyn ConstrainedMinimizer,
    config: &SolverConfig,
) -> Result<Vec<f64>, MarketError> {
    input.validate()?;

    let problem = BestResponseProblem {
        demand: input.buyer_demand,
        pricing: SellerPricing {
            price: input.sellers_price,
            capacity: input.sellers_capacity,
            transmission_cost_per_hop: TRANSMISSION_COST_PER_HOP,
        },
        other_loads: input.used_capacities,
        hops: input.hop_distances,
    };

    let available: f64 = problem.upper_bounds().iter().sum();
    if available < input.buyer_demand {
        return Err(MarketError::OptimizationUnsuccessful {
            message: format!("remaining capacity {:.4} is below demand {:.4}", available, input.buyer_demand),
            iterations: 0,
        });
    }

    let outcome = problem.solve(minimizer, config)?;
    if !outcome.success || !outcome.is_finite() {
        return Err(MarketError::OptimizationUnsuccessful {
            message: outcome.message,
            iterations: outcome.iterations,
        });
    }

    Ok(outcome
        .point
        .iter()
        .map(|&x| round_to(x, SOLUTION_DECIMALS))
        .collect())
}
